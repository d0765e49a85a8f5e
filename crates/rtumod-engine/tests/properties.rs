use proptest::prelude::*;
use rtumod_core::frame::rtu;
use rtumod_core::RegisterMap;
use rtumod_engine::{MemoryTransport, SlaveEngine, SlaveEvent};
use std::time::{Duration, Instant};

fn deliver(slave: &mut SlaveEngine, registers: &mut RegisterMap, bytes: &[u8]) -> Vec<u8> {
    let mut transport = MemoryTransport::new();
    transport.feed(bytes);
    let now = Instant::now();
    let _ = slave.poll(now, &mut transport, registers);
    let _ = slave.poll(now + Duration::from_millis(5), &mut transport, registers);
    transport.take_written()
}

fn framed(bytes: &[u8]) -> Vec<u8> {
    let mut out = bytes.to_vec();
    out.extend_from_slice(&rtu::compute(bytes).to_be_bytes());
    out
}

proptest! {
    #[test]
    fn random_bytes_never_panic_the_slave(data in proptest::collection::vec(any::<u8>(), 0..100)) {
        let mut slave = SlaveEngine::new(1).unwrap();
        let mut registers = RegisterMap::new();
        let answer = deliver(&mut slave, &mut registers, &data);
        prop_assert!(answer.len() <= rtu::MAX_FRAME_LEN);
    }

    #[test]
    fn reads_respect_bounds_and_leave_the_map_alone(
        function in 1u8..=4,
        start in any::<u16>(),
        quantity in 1u16..=40,
    ) {
        let mut slave = SlaveEngine::new(1).unwrap();
        let mut registers = RegisterMap::new();
        registers.holding_registers_mut().write(0, &[7; 16]).unwrap();
        let before = registers.clone();

        let [start_hi, start_lo] = start.to_be_bytes();
        let [qty_hi, qty_lo] = quantity.to_be_bytes();
        let request = framed(&[1, function, start_hi, start_lo, qty_hi, qty_lo]);
        let answer = deliver(&mut slave, &mut registers, &request);

        prop_assert_eq!(&registers, &before);
        let fits = usize::from(start) + usize::from(quantity) <= 16;
        if fits {
            prop_assert_eq!(answer[1], function);
        } else {
            prop_assert_eq!(&answer[1..3], &[function | 0x80, 0x02]);
        }
    }

    #[test]
    fn repeated_reads_are_identical(start in 0u16..16) {
        let mut slave = SlaveEngine::new(1).unwrap();
        let mut registers = RegisterMap::new();
        registers.input_registers_mut().set(start, 0xA5A5).unwrap();

        let [start_hi, start_lo] = start.to_be_bytes();
        let request = framed(&[1, 4, start_hi, start_lo, 0, 1]);
        let first = deliver(&mut slave, &mut registers, &request);
        let second = deliver(&mut slave, &mut registers, &request);
        prop_assert_eq!(first, second);
    }
}

#[test]
fn unaddressed_frame_produces_nothing() {
    let mut slave = SlaveEngine::new(1).unwrap();
    let mut registers = RegisterMap::new();
    let mut transport = MemoryTransport::new();
    transport.feed(&framed(&[2, 3, 0, 0, 0, 1]));
    let now = Instant::now();
    slave.poll(now, &mut transport, &mut registers).unwrap();
    let event = slave
        .poll(now + Duration::from_millis(5), &mut transport, &mut registers)
        .unwrap();
    assert_eq!(event, SlaveEvent::NotAddressed { unit_id: 2 });
    assert!(transport.written().is_empty());
}
