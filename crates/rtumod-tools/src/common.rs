use clap::Args;
use rtumod_engine::{
    EngineConfig, EngineError, MasterEngine, MasterEvent, SerialConfig, SerialTransport,
    Telegram, Transport,
};
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tokio_serial::Parity;

/// Engine tick cadence.
pub const TICK: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Args)]
pub struct SerialArgs {
    #[arg(long)]
    pub port: String,
    #[arg(long, default_value_t = 19_200)]
    pub baud: u32,
    #[arg(long, default_value = "none", value_parser = parse_parity)]
    pub parity: Parity,
    /// Response timeout (master) or watchdog (slave), in milliseconds.
    #[arg(long, default_value_t = 1000)]
    pub timeout: u64,
    /// Toggle RTS around writes for RS-485 direction control.
    #[arg(long)]
    pub rts: bool,
}

impl SerialArgs {
    pub fn serial_config(&self) -> SerialConfig {
        SerialConfig {
            baud_rate: self.baud,
            parity: self.parity,
            rts_direction: self.rts,
            ..SerialConfig::default()
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::for_baud_rate(self.baud)
            .with_response_timeout(Duration::from_millis(self.timeout))
    }

    pub fn open(&self) -> Result<SerialTransport, EngineError> {
        SerialTransport::open(&self.port, &self.serial_config())
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .try_init();
}

pub fn parse_bool(input: &str) -> Result<bool, String> {
    match input.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        _ => Err(format!("invalid bool value: {input}")),
    }
}

pub fn parse_parity(input: &str) -> Result<Parity, String> {
    match input.trim().to_ascii_lowercase().as_str() {
        "none" | "n" => Ok(Parity::None),
        "even" | "e" => Ok(Parity::Even),
        "odd" | "o" => Ok(Parity::Odd),
        _ => Err(format!("invalid parity: {input}")),
    }
}

/// Sends `telegram` and ticks the master until the answer is in or it fails.
///
/// Returns the number of words written into `registers`.
pub async fn run_query<T>(
    master: &mut MasterEngine,
    transport: &mut T,
    telegram: &Telegram<'_>,
    registers: &mut [u16],
) -> Result<usize, EngineError>
where
    T: Transport + ?Sized,
{
    let mut ticker = tokio::time::interval(TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    master.query(Instant::now(), transport, telegram)?;
    loop {
        ticker.tick().await;
        match master.poll(Instant::now(), transport, registers)? {
            MasterEvent::Completed { words, .. } => return Ok(words),
            MasterEvent::Waiting => {}
            MasterEvent::Idle => {
                return Err(EngineError::InvalidTelegram("query is no longer pending"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_bool, parse_parity, run_query};
    use rtumod_core::frame::rtu;
    use rtumod_core::pdu::FunctionCode;
    use rtumod_engine::{MasterEngine, MemoryTransport, Telegram};
    use tokio_serial::Parity;

    #[test]
    fn bool_and_parity_parsing() {
        assert_eq!(parse_bool(" On "), Ok(true));
        assert_eq!(parse_bool("0"), Ok(false));
        assert!(parse_bool("maybe").is_err());
        assert_eq!(parse_parity("even"), Ok(Parity::Even));
        assert_eq!(parse_parity("N"), Ok(Parity::None));
        assert!(parse_parity("mark").is_err());
    }

    #[tokio::test]
    async fn run_query_completes_on_answer() {
        let mut answer = vec![0x05, 0x04, 0x04, 0x00, 0x07, 0x01, 0x00];
        let crc = rtu::compute(&answer).to_be_bytes();
        answer.extend_from_slice(&crc);

        let mut transport = MemoryTransport::new();
        transport.feed(&answer);

        let mut master = MasterEngine::new();
        let telegram = Telegram::read(5, FunctionCode::ReadInputRegisters, 2, 2);
        let mut registers = [0u16; 2];
        let words = run_query(&mut master, &mut transport, &telegram, &mut registers)
            .await
            .unwrap();

        assert_eq!(words, 2);
        assert_eq!(registers, [0x0007, 0x0100]);
    }
}
