use clap::Parser;
use rtumod_core::RegisterMap;
use rtumod_engine::{EngineError, SlaveEngine, SlaveEvent};
use rtumod_tools::common::{init_tracing, SerialArgs, TICK};
use std::time::Instant;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

#[derive(Debug, Parser)]
#[command(name = "rtuslave", about = "Serve a register map as a Modbus RTU slave")]
struct Args {
    #[command(flatten)]
    serial: SerialArgs,
    #[arg(long, default_value_t = 1)]
    unit_id: u8,
    /// Initial holding register values, starting at address 0.
    #[arg(long, value_delimiter = ',')]
    holding: Vec<u16>,
    /// Initial input register values, starting at address 0.
    #[arg(long, value_delimiter = ',')]
    input: Vec<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let args = Args::parse();

    let mut registers = RegisterMap::new();
    if !args.holding.is_empty() {
        registers.holding_registers_mut().write(0, &args.holding)?;
    }
    if !args.input.is_empty() {
        registers.input_registers_mut().write(0, &args.input)?;
    }

    let mut transport = args.serial.open()?;
    let mut slave = SlaveEngine::with_config(args.unit_id, args.serial.engine_config())?;
    info!(unit_id = slave.id(), port = %args.serial.port, "serving");

    let mut ticker = tokio::time::interval(TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                match slave.poll(Instant::now(), &mut transport, &mut registers) {
                    Ok(SlaveEvent::Replied { function, len }) => {
                        debug!(function = function.as_u8(), len, "replied");
                    }
                    Ok(SlaveEvent::Exception { function, code }) => {
                        warn!(function, code = code.as_u8(), "sent exception");
                    }
                    Ok(SlaveEvent::Idle | SlaveEvent::NotAddressed { .. }) => {}
                    Err(EngineError::Protocol(err)) => debug!(error = %err, "dropped frame"),
                    Err(err) => return Err(err.into()),
                }
            }
        }
    }

    let counters = slave.counters();
    println!(
        "frames received={} sent={} errors={}",
        counters.received, counters.sent, counters.errors
    );
    Ok(())
}
