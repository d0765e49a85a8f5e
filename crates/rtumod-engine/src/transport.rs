//! Byte-channel abstraction the engines poll.

use std::collections::VecDeque;
use std::io;

use tracing::trace;

/// Duplex byte channel with a non-blocking "bytes available" query.
///
/// `read` must only return bytes that are already buffered; the engines never
/// ask for more than `bytes_available` reported.
pub trait Transport {
    fn bytes_available(&mut self) -> io::Result<usize>;
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;
    /// Returns once every written byte has left the wire.
    fn flush(&mut self) -> io::Result<()>;
}

impl<T> Transport for &mut T
where
    T: Transport + ?Sized,
{
    fn bytes_available(&mut self) -> io::Result<usize> {
        (**self).bytes_available()
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        (**self).write(bytes)
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }
}

/// Half-duplex line driver control (RS-485 DE/RE pin).
pub trait DirectionControl {
    fn assert_transmit_direction(&mut self) -> io::Result<()>;
    fn release_transmit_direction(&mut self) -> io::Result<()>;
}

/// Brackets every write with transmit-direction control.
///
/// The driver is released after the bytes have been flushed, even when the
/// write itself fails.
#[derive(Debug)]
pub struct Rs485<T, D> {
    inner: T,
    direction: D,
}

impl<T, D> Rs485<T, D> {
    pub fn new(inner: T, direction: D) -> Self {
        Self { inner, direction }
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    pub fn direction(&self) -> &D {
        &self.direction
    }

    pub fn into_parts(self) -> (T, D) {
        (self.inner, self.direction)
    }
}

impl<T: Transport, D: DirectionControl> Transport for Rs485<T, D> {
    fn bytes_available(&mut self) -> io::Result<usize> {
        self.inner.bytes_available()
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.direction.assert_transmit_direction()?;
        let sent = self
            .inner
            .write(bytes)
            .and_then(|()| self.inner.flush());
        let released = self.direction.release_transmit_direction();
        sent?;
        released
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// In-memory transport for tests and simulation.
///
/// Bytes queued with [`MemoryTransport::feed`] become readable; everything the
/// engine writes is collected and can be taken with [`MemoryTransport::take_written`].
#[derive(Debug, Default, Clone)]
pub struct MemoryTransport {
    rx: VecDeque<u8>,
    tx: Vec<u8>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes);
    }

    pub fn pending_rx(&self) -> usize {
        self.rx.len()
    }

    pub fn written(&self) -> &[u8] {
        &self.tx
    }

    pub fn take_written(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.tx)
    }
}

impl Transport for MemoryTransport {
    fn bytes_available(&mut self) -> io::Result<usize> {
        Ok(self.rx.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.rx.len());
        for (slot, byte) in buf.iter_mut().zip(self.rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        trace!(len = bytes.len(), "memory transport write");
        self.tx.extend_from_slice(bytes);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
