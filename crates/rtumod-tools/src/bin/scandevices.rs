use clap::Parser;
use rtumod_core::pdu::FunctionCode;
use rtumod_engine::{EngineError, MasterEngine, ProtocolError, Telegram};
use rtumod_tools::common::{init_tracing, run_query, SerialArgs};
use tracing::debug;

#[derive(Debug, Parser)]
#[command(name = "scandevices", about = "Scan Modbus RTU unit IDs on a serial line")]
struct Args {
    #[command(flatten)]
    serial: SerialArgs,
    #[arg(long, default_value_t = 1)]
    unit_start: u8,
    #[arg(long, default_value_t = 247)]
    unit_end: u8,
    #[arg(long, default_value_t = 0)]
    probe_start: u16,
    #[arg(long, default_value_t = 1)]
    probe_quantity: u16,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let args = Args::parse();

    if args.unit_start == 0 || args.unit_start > args.unit_end || args.unit_end > 247 {
        return Err("invalid unit id range".into());
    }

    let mut transport = args.serial.open()?;
    let mut master = MasterEngine::with_config(args.serial.engine_config());
    let mut found = Vec::new();

    for unit_id in args.unit_start..=args.unit_end {
        let telegram = Telegram::read(
            unit_id,
            FunctionCode::ReadHoldingRegisters,
            args.probe_start,
            args.probe_quantity,
        );
        let mut values = vec![0u16; telegram.answer_words()];
        match run_query(&mut master, &mut transport, &telegram, &mut values).await {
            // An exception still proves a device answered at this id.
            Ok(_) | Err(EngineError::Protocol(ProtocolError::Exception { .. })) => {
                println!("unit {} responded", unit_id);
                found.push(unit_id);
            }
            Err(err) => debug!(unit_id, error = %err, "no usable answer"),
        }
    }

    if found.is_empty() {
        println!("no responding units found");
    } else {
        println!("found {} unit(s): {:?}", found.len(), found);
    }

    let counters = master.counters();
    println!(
        "frames sent={} received={} errors={}",
        counters.sent, counters.received, counters.errors
    );
    Ok(())
}
