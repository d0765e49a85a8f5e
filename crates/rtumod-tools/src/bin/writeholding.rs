use clap::Parser;
use rtumod_core::pdu::FunctionCode;
use rtumod_engine::{MasterEngine, Telegram};
use rtumod_tools::common::{init_tracing, run_query, SerialArgs};

#[derive(Debug, Parser)]
#[command(
    name = "writeholding",
    about = "Write one or more holding registers (FC06/FC16)"
)]
struct Args {
    #[command(flatten)]
    serial: SerialArgs,
    #[arg(long, default_value_t = 1)]
    unit_id: u8,
    #[arg(long)]
    start: u16,
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    values: Vec<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let args = Args::parse();
    let mut transport = args.serial.open()?;
    let mut master = MasterEngine::with_config(args.serial.engine_config());

    let quantity = u16::try_from(args.values.len())?;
    let function = if quantity == 1 {
        FunctionCode::WriteSingleRegister
    } else {
        FunctionCode::WriteMultipleRegisters
    };
    let telegram = Telegram::write(args.unit_id, function, args.start, quantity, &args.values);
    run_query(&mut master, &mut transport, &telegram, &mut []).await?;

    println!("wrote {} register(s) starting at {}", quantity, args.start);
    Ok(())
}
