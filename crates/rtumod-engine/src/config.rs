use std::time::Duration;

/// Inter-character silence that closes a frame (T3.5 at 9600-19200 baud).
pub const DEFAULT_INTER_CHAR_TIMEOUT: Duration = Duration::from_millis(5);
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_millis(1000);

const BITS_PER_CHAR: u64 = 11;
const FAST_BAUD_THRESHOLD: u32 = 19_200;
const FAST_BAUD_SILENCE: Duration = Duration::from_micros(1_750);

/// Timing shared by the master and slave engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Silence after the last byte before a frame is considered complete.
    pub inter_char_timeout: Duration,
    /// Master: how long to wait for an answer. Slave: communication watchdog.
    pub response_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            inter_char_timeout: DEFAULT_INTER_CHAR_TIMEOUT,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
        }
    }
}

impl EngineConfig {
    /// Derives the 3.5 character silence window from the line speed.
    ///
    /// Above 19200 baud the window is fixed at 1.75 ms.
    pub fn for_baud_rate(baud_rate: u32) -> Self {
        let inter_char_timeout = if baud_rate == 0 {
            DEFAULT_INTER_CHAR_TIMEOUT
        } else if baud_rate > FAST_BAUD_THRESHOLD {
            FAST_BAUD_SILENCE
        } else {
            let micros = (BITS_PER_CHAR * 1_000_000 * 7).div_ceil(2 * u64::from(baud_rate));
            Duration::from_micros(micros)
        };
        Self {
            inter_char_timeout,
            ..Self::default()
        }
    }

    pub fn with_inter_char_timeout(mut self, timeout: Duration) -> Self {
        self.inter_char_timeout = timeout;
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }
}
