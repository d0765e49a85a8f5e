use std::io::{self, Read, Write};
use std::time::Duration;

use tokio_serial::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::trace;

use crate::transport::Transport;
use crate::EngineError;

/// Line settings for [`SerialTransport`].
#[derive(Debug, Clone)]
pub struct SerialConfig {
    pub baud_rate: u32,
    pub parity: Parity,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
    /// Drive the RS-485 transmitter enable through RTS around every write.
    pub rts_direction: bool,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: 19_200,
            parity: Parity::None,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
            rts_direction: false,
        }
    }
}

/// Serial port transport over the blocking `serialport` API.
///
/// Reads never wait: the engines only ask for bytes the driver already
/// reports as buffered.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    rts_direction: bool,
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("port", &self.port.name())
            .field("rts_direction", &self.rts_direction)
            .finish()
    }
}

impl SerialTransport {
    pub fn open(path: &str, config: &SerialConfig) -> Result<Self, EngineError> {
        let port = tokio_serial::new(path, config.baud_rate)
            .parity(config.parity)
            .data_bits(config.data_bits)
            .stop_bits(config.stop_bits)
            .flow_control(config.flow_control)
            .timeout(Duration::from_millis(10))
            .open()
            .map_err(|err| {
                EngineError::Io(io::Error::other(format!(
                    "failed to open serial port '{path}': {err}"
                )))
            })?;
        let mut transport = Self {
            port,
            rts_direction: config.rts_direction,
        };
        if transport.rts_direction {
            transport.set_rts(false)?;
        }
        Ok(transport)
    }

    pub fn from_port(port: Box<dyn SerialPort>, rts_direction: bool) -> Self {
        Self {
            port,
            rts_direction,
        }
    }

    fn set_rts(&mut self, level: bool) -> io::Result<()> {
        self.port.write_request_to_send(level).map_err(io::Error::from)
    }
}

impl Transport for SerialTransport {
    fn bytes_available(&mut self) -> io::Result<usize> {
        let count = self.port.bytes_to_read().map_err(io::Error::from)?;
        Ok(count as usize)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        if self.rts_direction {
            self.set_rts(true)?;
        }
        let sent = self
            .port
            .write_all(bytes)
            .and_then(|()| self.port.flush());
        if self.rts_direction {
            self.set_rts(false)?;
        }
        trace!(len = bytes.len(), "serial write");
        sent
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}
