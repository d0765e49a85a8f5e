//! Polling Modbus RTU master and slave engines.
//!
//! Both engines are driven by repeated calls to `poll` with the current time
//! and a [`Transport`]. No call blocks or sleeps; end of frame is detected by
//! inter-character silence in [`FrameAssembler`].

#![forbid(unsafe_code)]

use rtumod_core::pdu::{ExceptionCode, NO_REPLY};
use rtumod_core::{DecodeError, EncodeError, RegisterError, MAX_FRAME_LEN};
use thiserror::Error;

pub mod assembler;
pub mod config;
pub mod master;
pub mod slave;
pub mod transport;

#[cfg(feature = "serial")]
pub mod serial;

pub use assembler::{Assembly, FrameAssembler};
pub use config::EngineConfig;
pub use master::{CommState, MasterEngine, MasterEvent, Telegram};
pub use slave::{SlaveEngine, SlaveEvent};
pub use transport::{DirectionControl, MemoryTransport, Rs485, Transport};

#[cfg(feature = "serial")]
pub use serial::{SerialConfig, SerialTransport};

/// Bus-level failures. Stored as an engine's `last_error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("frame exceeds {MAX_FRAME_LEN} bytes")]
    FrameOverflow,
    #[error("frame too short ({len} bytes)")]
    FrameTooShort { len: usize },
    #[error("crc mismatch")]
    BadCrc,
    #[error("exception {code:?} for function {function:#04x}")]
    Exception { function: u8, code: ExceptionCode },
    #[error("unsupported function {0:#04x}")]
    UnsupportedFunction(u8),
    #[error("answer function {got:#04x} does not match query {expected:#04x}")]
    UnexpectedFunction { expected: u8, got: u8 },
    #[error("answer from unit {got} while waiting for unit {expected}")]
    UnexpectedUnit { expected: u8, got: u8 },
    #[error("malformed answer: {0}")]
    MalformedAnswer(DecodeError),
    #[error("no answer within response timeout")]
    Timeout,
}

impl ProtocolError {
    /// Single-byte status code: the exception code for exceptions,
    /// [`NO_REPLY`] when nothing usable came back.
    pub fn code(&self) -> u8 {
        match self {
            Self::Exception { code, .. } => code.as_u8(),
            Self::UnsupportedFunction(_) => ExceptionCode::IllegalFunction.as_u8(),
            Self::FrameOverflow
            | Self::FrameTooShort { .. }
            | Self::BadCrc
            | Self::UnexpectedFunction { .. }
            | Self::UnexpectedUnit { .. }
            | Self::MalformedAnswer(_)
            | Self::Timeout => NO_REPLY,
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("register error: {0}")]
    Register(#[from] RegisterError),
    #[error("a query is already waiting for its answer")]
    Busy,
    #[error("invalid unit id {0}")]
    InvalidUnitId(u8),
    #[error("invalid telegram: {0}")]
    InvalidTelegram(&'static str),
    #[error("register buffer too small (needed {needed}, available {available})")]
    RegisterBufferTooSmall { needed: usize, available: usize },
}

/// Frame and error counters. Only reset with the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub received: u16,
    pub sent: u16,
    pub errors: u16,
}

impl Counters {
    pub(crate) fn record_received(&mut self) {
        self.received = self.received.wrapping_add(1);
    }

    pub(crate) fn record_sent(&mut self) {
        self.sent = self.sent.wrapping_add(1);
    }

    pub(crate) fn record_error(&mut self) {
        self.errors = self.errors.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::{EngineError, ProtocolError};
    use rtumod_core::pdu::{ExceptionCode, NO_REPLY};

    #[test]
    fn protocol_error_codes() {
        assert_eq!(ProtocolError::Timeout.code(), NO_REPLY);
        assert_eq!(ProtocolError::BadCrc.code(), NO_REPLY);
        assert_eq!(ProtocolError::UnsupportedFunction(0x07).code(), 1);
        assert_eq!(
            ProtocolError::Exception {
                function: 0x03,
                code: ExceptionCode::IllegalDataAddress
            }
            .code(),
            2
        );
    }

    #[test]
    fn engine_error_wraps_protocol_error() {
        let err = EngineError::from(ProtocolError::Timeout);
        assert_eq!(err.to_string(), "no answer within response timeout");
        assert!(matches!(err, EngineError::Protocol(ProtocolError::Timeout)));
    }
}
