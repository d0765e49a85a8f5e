use clap::Parser;
use rtumod_core::pdu::FunctionCode;
use rtumod_engine::{MasterEngine, Telegram};
use rtumod_tools::common::{init_tracing, parse_bool, run_query, SerialArgs};

#[derive(Debug, Parser)]
#[command(name = "writecoil", about = "Write a single coil (FC05)")]
struct Args {
    #[command(flatten)]
    serial: SerialArgs,
    #[arg(long, default_value_t = 1)]
    unit_id: u8,
    #[arg(long)]
    address: u16,
    #[arg(long, value_parser = parse_bool)]
    value: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let args = Args::parse();
    let mut transport = args.serial.open()?;
    let mut master = MasterEngine::with_config(args.serial.engine_config());

    let source = [u16::from(args.value)];
    let telegram = Telegram::write(
        args.unit_id,
        FunctionCode::WriteSingleCoil,
        args.address,
        1,
        &source,
    );
    run_query(&mut master, &mut transport, &telegram, &mut []).await?;

    println!("wrote coil {} => {}", args.address, args.value);
    Ok(())
}
