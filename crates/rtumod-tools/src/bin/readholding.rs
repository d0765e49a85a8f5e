use clap::Parser;
use rtumod_core::pdu::FunctionCode;
use rtumod_engine::{MasterEngine, Telegram};
use rtumod_tools::common::{init_tracing, run_query, SerialArgs};

#[derive(Debug, Parser)]
#[command(name = "readholding", about = "Read holding registers (FC03)")]
struct Args {
    #[command(flatten)]
    serial: SerialArgs,
    #[arg(long, default_value_t = 1)]
    unit_id: u8,
    #[arg(long)]
    start: u16,
    #[arg(long)]
    quantity: u16,
    /// Read input registers (FC04) instead.
    #[arg(long)]
    input: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let args = Args::parse();
    let mut transport = args.serial.open()?;
    let mut master = MasterEngine::with_config(args.serial.engine_config());

    let function = if args.input {
        FunctionCode::ReadInputRegisters
    } else {
        FunctionCode::ReadHoldingRegisters
    };
    let telegram = Telegram::read(args.unit_id, function, args.start, args.quantity);
    let mut values = vec![0u16; telegram.answer_words()];
    run_query(&mut master, &mut transport, &telegram, &mut values).await?;

    for (idx, value) in values.iter().enumerate() {
        println!(
            "addr={} value={} (0x{:04X})",
            args.start.wrapping_add(idx as u16),
            value,
            value
        );
    }
    Ok(())
}
