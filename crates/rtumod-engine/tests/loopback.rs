use rtumod_core::pdu::{ExceptionCode, FunctionCode};
use rtumod_core::RegisterMap;
use rtumod_engine::{
    CommState, EngineError, MasterEngine, MasterEvent, MemoryTransport, ProtocolError,
    SlaveEngine, Telegram,
};
use std::time::{Duration, Instant};

const TICK: Duration = Duration::from_millis(1);

/// Master and slave joined by two in-memory half lines.
struct Bus {
    master: MasterEngine,
    slave: SlaveEngine,
    master_port: MemoryTransport,
    slave_port: MemoryTransport,
    registers: RegisterMap,
    now: Instant,
}

impl Bus {
    fn new(slave_id: u8) -> Self {
        Self {
            master: MasterEngine::new(),
            slave: SlaveEngine::new(slave_id).unwrap(),
            master_port: MemoryTransport::new(),
            slave_port: MemoryTransport::new(),
            registers: RegisterMap::new(),
            now: Instant::now(),
        }
    }

    fn transact(&mut self, telegram: &Telegram<'_>, dst: &mut [u16]) -> Result<usize, EngineError> {
        self.master
            .query(self.now, &mut self.master_port, telegram)
            .unwrap();
        loop {
            let request = self.master_port.take_written();
            self.slave_port.feed(&request);
            let _ = self
                .slave
                .poll(self.now, &mut self.slave_port, &mut self.registers);

            let answer = self.slave_port.take_written();
            self.master_port.feed(&answer);
            match self.master.poll(self.now, &mut self.master_port, dst)? {
                MasterEvent::Completed { words, .. } => return Ok(words),
                MasterEvent::Waiting => {}
                MasterEvent::Idle => panic!("query vanished"),
            }
            self.now += TICK;
        }
    }
}

#[test]
fn write_then_read_holding_register() {
    let mut bus = Bus::new(1);

    let source = [0x1234];
    let write = Telegram::write(1, FunctionCode::WriteSingleRegister, 5, 1, &source);
    assert_eq!(bus.transact(&write, &mut []).unwrap(), 0);
    assert_eq!(bus.registers.holding_registers().get(5).unwrap(), 0x1234);

    let read = Telegram::read(1, FunctionCode::ReadHoldingRegisters, 5, 1);
    let mut dst = [0u16; 1];
    assert_eq!(bus.transact(&read, &mut dst).unwrap(), 1);
    assert_eq!(dst, [0x1234]);

    assert_eq!(bus.slave.counters().received, 2);
    assert_eq!(bus.master.counters().received, 2);
}

#[test]
fn coils_round_trip_through_word_image() {
    let mut bus = Bus::new(9);

    let image = [0b1010_0000_0000_0011u16];
    let write = Telegram::write(9, FunctionCode::WriteMultipleCoils, 0, 16, &image);
    bus.transact(&write, &mut []).unwrap();
    assert_eq!(bus.registers.coils().words(), &image);

    let read = Telegram::read(9, FunctionCode::ReadCoils, 0, 16);
    let mut dst = [0u16; 1];
    bus.transact(&read, &mut dst).unwrap();
    assert_eq!(dst, image);
}

#[test]
fn discrete_inputs_and_input_registers_are_read_only_regions() {
    let mut bus = Bus::new(3);
    bus.registers.discrete_inputs_mut().set(2, true).unwrap();
    bus.registers.input_registers_mut().write(0, &[10, 20, 30]).unwrap();

    let mut bits = [0u16; 1];
    bus.transact(&Telegram::read(3, FunctionCode::ReadDiscreteInputs, 0, 4), &mut bits)
        .unwrap();
    assert_eq!(bits, [0b0100]);

    let mut words = [0u16; 3];
    bus.transact(&Telegram::read(3, FunctionCode::ReadInputRegisters, 0, 3), &mut words)
        .unwrap();
    assert_eq!(words, [10, 20, 30]);
}

#[test]
fn out_of_range_request_surfaces_as_exception() {
    let mut bus = Bus::new(1);
    let read = Telegram::read(1, FunctionCode::ReadHoldingRegisters, 10, 10);
    let mut dst = [0u16; 10];
    let err = bus.transact(&read, &mut dst).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Protocol(ProtocolError::Exception {
            function: 0x03,
            code: ExceptionCode::IllegalDataAddress
        })
    ));
    assert_eq!(bus.master.state(), CommState::Idle);
    assert_eq!(bus.slave.counters().errors, 1);
}

#[test]
fn query_to_absent_unit_times_out() {
    let mut bus = Bus::new(1);
    let read = Telegram::read(2, FunctionCode::ReadHoldingRegisters, 0, 1);
    let mut dst = [0u16; 1];
    let err = bus.transact(&read, &mut dst).unwrap_err();
    assert!(matches!(err, EngineError::Protocol(ProtocolError::Timeout)));
    assert_eq!(bus.slave.counters().sent, 0);
    assert_eq!(bus.master.counters().errors, 1);
    assert_eq!(bus.master.state(), CommState::Idle);

    for _ in 0..200 {
        bus.now += TICK;
        let event = bus
            .master
            .poll(bus.now, &mut bus.master_port, &mut dst)
            .unwrap();
        assert_eq!(event, MasterEvent::Idle);
    }
    assert_eq!(bus.master.counters().errors, 1);

    bus.registers.holding_registers_mut().set(0, 0x0042).unwrap();
    let retry = Telegram::read(1, FunctionCode::ReadHoldingRegisters, 0, 1);
    assert_eq!(bus.transact(&retry, &mut dst).unwrap(), 1);
    assert_eq!(dst, [0x0042]);
    assert_eq!(bus.master.counters().errors, 1);
}
