use clap::Parser;
use rtumod_core::pdu::{word_bit, FunctionCode};
use rtumod_engine::{MasterEngine, Telegram};
use rtumod_tools::common::{init_tracing, run_query, SerialArgs};

#[derive(Debug, Parser)]
#[command(name = "readcoils", about = "Read coils (FC01)")]
struct Args {
    #[command(flatten)]
    serial: SerialArgs,
    #[arg(long, default_value_t = 1)]
    unit_id: u8,
    #[arg(long)]
    start: u16,
    #[arg(long)]
    quantity: u16,
    /// Read discrete inputs (FC02) instead of coils.
    #[arg(long)]
    inputs: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let args = Args::parse();
    let mut transport = args.serial.open()?;
    let mut master = MasterEngine::with_config(args.serial.engine_config());

    let function = if args.inputs {
        FunctionCode::ReadDiscreteInputs
    } else {
        FunctionCode::ReadCoils
    };
    let telegram = Telegram::read(args.unit_id, function, args.start, args.quantity);
    let mut words = vec![0u16; telegram.answer_words()];
    run_query(&mut master, &mut transport, &telegram, &mut words).await?;

    for idx in 0..args.quantity {
        let value = word_bit(&words, usize::from(idx)).unwrap_or(false);
        println!("coil={} value={}", args.start.wrapping_add(idx), value);
    }
    Ok(())
}
