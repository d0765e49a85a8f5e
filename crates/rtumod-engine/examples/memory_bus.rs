use rtumod_core::pdu::FunctionCode;
use rtumod_core::RegisterMap;
use rtumod_engine::{MasterEngine, MasterEvent, MemoryTransport, SlaveEngine, Telegram};
use std::time::{Duration, Instant};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut master = MasterEngine::new();
    let mut slave = SlaveEngine::new(1)?;
    let mut registers = RegisterMap::new();
    registers.input_registers_mut().write(0, &[230, 231, 229])?;

    let mut master_port = MemoryTransport::new();
    let mut slave_port = MemoryTransport::new();
    let mut now = Instant::now();

    let telegram = Telegram::read(1, FunctionCode::ReadInputRegisters, 0, 3);
    master.query(now, &mut master_port, &telegram)?;

    let mut values = [0u16; 3];
    loop {
        slave_port.feed(&master_port.take_written());
        slave.poll(now, &mut slave_port, &mut registers)?;
        master_port.feed(&slave_port.take_written());
        if let MasterEvent::Completed { .. } = master.poll(now, &mut master_port, &mut values)? {
            break;
        }
        now += Duration::from_millis(1);
    }

    println!("input registers: {values:?}");
    println!("slave counters: {:?}", slave.counters());
    Ok(())
}
