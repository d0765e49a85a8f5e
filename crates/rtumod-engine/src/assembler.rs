use std::io;
use std::time::{Duration, Instant};

use rtumod_core::{Frame, MAX_FRAME_LEN};
use tracing::trace;

use crate::transport::Transport;

/// Outcome of one assembler tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assembly {
    /// Nothing buffered on the line.
    Idle,
    /// Bytes are still arriving or the silence window has not elapsed.
    Accumulating,
    /// A complete frame of `n` bytes was drained into the frame buffer.
    Ready(usize),
    /// More than [`MAX_FRAME_LEN`] bytes arrived; they were drained and dropped.
    Overflow { discarded: usize },
}

/// End-of-frame detection by inter-character silence.
///
/// Each tick compares the transport's buffered byte count with the previous
/// tick. A change re-arms the silence deadline; an unchanged count past the
/// deadline closes the frame.
#[derive(Debug, Clone)]
pub struct FrameAssembler {
    inter_char_timeout: Duration,
    last_count: usize,
    deadline: Option<Instant>,
}

impl FrameAssembler {
    pub fn new(inter_char_timeout: Duration) -> Self {
        Self {
            inter_char_timeout,
            last_count: 0,
            deadline: None,
        }
    }

    pub fn inter_char_timeout(&self) -> Duration {
        self.inter_char_timeout
    }

    pub fn reset(&mut self) {
        self.last_count = 0;
        self.deadline = None;
    }

    pub fn poll<T>(&mut self, now: Instant, transport: &mut T, frame: &mut Frame) -> io::Result<Assembly>
    where
        T: Transport + ?Sized,
    {
        let available = transport.bytes_available()?;
        if available == 0 {
            self.reset();
            return Ok(Assembly::Idle);
        }

        if available != self.last_count {
            self.last_count = available;
            self.deadline = Some(now + self.inter_char_timeout);
            return Ok(Assembly::Accumulating);
        }

        if matches!(self.deadline, Some(deadline) if now < deadline) {
            return Ok(Assembly::Accumulating);
        }
        self.reset();

        frame.clear();
        if available > MAX_FRAME_LEN {
            let discarded = discard(transport, available)?;
            trace!(discarded, "dropped oversized frame");
            return Ok(Assembly::Overflow { discarded });
        }

        let storage = frame.storage_mut();
        let mut len = 0;
        while len < available {
            let n = transport.read(&mut storage[len..available])?;
            if n == 0 {
                break;
            }
            len += n;
        }
        // `len <= MAX_FRAME_LEN` holds here.
        if frame.set_len(len).is_err() {
            return Ok(Assembly::Overflow { discarded: len });
        }
        trace!(len, "frame assembled");
        Ok(Assembly::Ready(len))
    }
}

fn discard<T>(transport: &mut T, count: usize) -> io::Result<usize>
where
    T: Transport + ?Sized,
{
    let mut scratch = [0u8; MAX_FRAME_LEN];
    let mut remaining = count;
    while remaining > 0 {
        let chunk = remaining.min(scratch.len());
        let n = transport.read(&mut scratch[..chunk])?;
        if n == 0 {
            break;
        }
        remaining -= n;
    }
    Ok(count - remaining)
}
