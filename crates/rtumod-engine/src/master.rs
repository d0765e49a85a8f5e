use std::time::Instant;

use rtumod_core::encoding::Reader;
use rtumod_core::pdu::{
    ExceptionResponse, FunctionCode, ReadBitsResponse, ReadRegistersResponse, ReadRequest,
    Request, Response, WriteMultipleCoilsRequest, WriteMultipleRegistersRequest,
    WriteSingleCoilRequest, WriteSingleRegisterRequest, COIL_OFF, COIL_ON, MAX_READ_BITS,
    MAX_READ_REGISTERS, MAX_WRITE_COILS, MAX_WRITE_REGISTERS,
};
use rtumod_core::{DecodeError, Frame};
use tracing::{debug, trace, warn};

use crate::assembler::{Assembly, FrameAssembler};
use crate::config::EngineConfig;
use crate::transport::Transport;
use crate::{Counters, EngineError, ProtocolError};

/// Exception answers (5 bytes) and one-byte bit reads (6 bytes) are valid,
/// so the floor sits below the 7-byte request minimum.
const MIN_ANSWER_LEN: usize = 5;
const MAX_UNIT_ID: u8 = 247;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CommState {
    #[default]
    Idle,
    WaitingForAnswer,
}

/// One master query, owned by the caller.
///
/// `registers` is the write source. Coils are packed 16 per word, LSB first;
/// FC5 switches the coil on when `registers[0] != 0`. Reads ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Telegram<'a> {
    pub unit_id: u8,
    pub function: FunctionCode,
    pub start_address: u16,
    pub quantity: u16,
    pub registers: &'a [u16],
}

impl<'a> Telegram<'a> {
    pub fn read(unit_id: u8, function: FunctionCode, start_address: u16, quantity: u16) -> Self {
        Self {
            unit_id,
            function,
            start_address,
            quantity,
            registers: &[],
        }
    }

    pub fn write(
        unit_id: u8,
        function: FunctionCode,
        start_address: u16,
        quantity: u16,
        registers: &'a [u16],
    ) -> Self {
        Self {
            unit_id,
            function,
            start_address,
            quantity,
            registers,
        }
    }

    /// Number of destination words a read answer fills.
    pub fn answer_words(&self) -> usize {
        match self.function {
            FunctionCode::ReadCoils | FunctionCode::ReadDiscreteInputs => {
                usize::from(self.quantity).div_ceil(16)
            }
            FunctionCode::ReadHoldingRegisters | FunctionCode::ReadInputRegisters => {
                usize::from(self.quantity)
            }
            _ => 0,
        }
    }

    fn source(&self, words: usize) -> Result<&'a [u16], EngineError> {
        self.registers
            .get(..words)
            .ok_or(EngineError::InvalidTelegram("write source holds too few words"))
    }

    pub fn to_request(&self) -> Result<Request<'a>, EngineError> {
        if self.quantity == 0 {
            return Err(EngineError::InvalidTelegram("quantity must be at least 1"));
        }
        let limit = match self.function {
            FunctionCode::ReadCoils | FunctionCode::ReadDiscreteInputs => MAX_READ_BITS,
            FunctionCode::ReadHoldingRegisters | FunctionCode::ReadInputRegisters => {
                MAX_READ_REGISTERS
            }
            FunctionCode::WriteMultipleCoils => MAX_WRITE_COILS,
            FunctionCode::WriteMultipleRegisters => MAX_WRITE_REGISTERS,
            FunctionCode::WriteSingleCoil | FunctionCode::WriteSingleRegister => 1,
        };
        if self.quantity > limit {
            return Err(EngineError::InvalidTelegram("quantity does not fit in one frame"));
        }

        let read = ReadRequest {
            start_address: self.start_address,
            quantity: self.quantity,
        };
        let request = match self.function {
            FunctionCode::ReadCoils => Request::ReadCoils(read),
            FunctionCode::ReadDiscreteInputs => Request::ReadDiscreteInputs(read),
            FunctionCode::ReadHoldingRegisters => Request::ReadHoldingRegisters(read),
            FunctionCode::ReadInputRegisters => Request::ReadInputRegisters(read),
            FunctionCode::WriteSingleCoil => {
                let on = self.source(1)?[0] != 0;
                Request::WriteSingleCoil(WriteSingleCoilRequest {
                    address: self.start_address,
                    value: if on { COIL_ON } else { COIL_OFF },
                })
            }
            FunctionCode::WriteSingleRegister => {
                Request::WriteSingleRegister(WriteSingleRegisterRequest {
                    address: self.start_address,
                    value: self.source(1)?[0],
                })
            }
            FunctionCode::WriteMultipleCoils => {
                Request::WriteMultipleCoils(WriteMultipleCoilsRequest {
                    start_address: self.start_address,
                    quantity: self.quantity,
                    coils: self.source(usize::from(self.quantity).div_ceil(16))?,
                })
            }
            FunctionCode::WriteMultipleRegisters => {
                Request::WriteMultipleRegisters(WriteMultipleRegistersRequest {
                    start_address: self.start_address,
                    values: self.source(usize::from(self.quantity))?,
                })
            }
        };
        Ok(request)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Pending {
    unit_id: u8,
    function: FunctionCode,
    quantity: u16,
    deadline: Instant,
}

/// What one master tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasterEvent {
    /// No query outstanding.
    Idle,
    /// Still waiting for the answer.
    Waiting,
    /// The answer arrived. Reads have been copied into the destination.
    Completed { function: FunctionCode, words: usize },
}

/// Modbus RTU master: one outstanding query at a time.
#[derive(Debug, Clone)]
pub struct MasterEngine {
    config: EngineConfig,
    assembler: FrameAssembler,
    frame: Frame,
    pending: Option<Pending>,
    counters: Counters,
    last_error: Option<ProtocolError>,
}

impl Default for MasterEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MasterEngine {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            config,
            assembler: FrameAssembler::new(config.inter_char_timeout),
            frame: Frame::new(),
            pending: None,
            counters: Counters::default(),
            last_error: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> CommState {
        if self.pending.is_some() {
            CommState::WaitingForAnswer
        } else {
            CommState::Idle
        }
    }

    pub fn counters(&self) -> Counters {
        self.counters
    }

    pub fn last_error(&self) -> Option<ProtocolError> {
        self.last_error
    }

    /// `true` while a query is outstanding and its answer deadline has passed.
    pub fn timed_out(&self, now: Instant) -> bool {
        matches!(self.pending, Some(pending) if now > pending.deadline)
    }

    pub fn reset(&mut self) {
        self.assembler.reset();
        self.frame.clear();
        self.pending = None;
        self.counters = Counters::default();
        self.last_error = None;
    }

    /// Encodes `telegram`, sends it and arms the answer deadline.
    pub fn query<T>(
        &mut self,
        now: Instant,
        transport: &mut T,
        telegram: &Telegram<'_>,
    ) -> Result<(), EngineError>
    where
        T: Transport + ?Sized,
    {
        if self.pending.is_some() {
            return Err(EngineError::Busy);
        }
        if telegram.unit_id == 0 || telegram.unit_id > MAX_UNIT_ID {
            return Err(EngineError::InvalidUnitId(telegram.unit_id));
        }

        let request = telegram.to_request()?;
        let len = self.frame.build(telegram.unit_id, |w| request.encode(w))?;
        self.assembler.reset();
        transport.write(self.frame.as_bytes())?;
        transport.flush()?;

        self.counters.record_sent();
        self.pending = Some(Pending {
            unit_id: telegram.unit_id,
            function: telegram.function,
            quantity: telegram.quantity,
            deadline: now + self.config.response_timeout,
        });
        debug!(
            unit_id = telegram.unit_id,
            function = telegram.function.as_u8(),
            len,
            "sent query"
        );
        Ok(())
    }

    /// Checks for the answer to the outstanding query.
    ///
    /// Read answers are copied into `registers` (coils packed 16 per word).
    /// Every outcome other than `Waiting` returns the engine to idle.
    pub fn poll<T>(
        &mut self,
        now: Instant,
        transport: &mut T,
        registers: &mut [u16],
    ) -> Result<MasterEvent, EngineError>
    where
        T: Transport + ?Sized,
    {
        let Some(pending) = self.pending else {
            return Ok(MasterEvent::Idle);
        };

        if now > pending.deadline {
            warn!(unit_id = pending.unit_id, "no answer before response timeout");
            return Err(self.fail(ProtocolError::Timeout));
        }

        let len = match self.assembler.poll(now, transport, &mut self.frame)? {
            Assembly::Idle | Assembly::Accumulating => return Ok(MasterEvent::Waiting),
            Assembly::Overflow { discarded } => {
                self.counters.record_received();
                warn!(discarded, "dropped oversized answer");
                return Err(self.fail(ProtocolError::FrameOverflow));
            }
            Assembly::Ready(len) => len,
        };
        self.counters.record_received();
        trace!(unit_id = pending.unit_id, len, "answer assembled");

        if len < MIN_ANSWER_LEN {
            return Err(self.fail(ProtocolError::FrameTooShort { len }));
        }

        match self.accept(&pending, registers) {
            Ok(words) => {
                self.pending = None;
                self.last_error = None;
                debug!(
                    unit_id = pending.unit_id,
                    function = pending.function.as_u8(),
                    words,
                    "answer accepted"
                );
                Ok(MasterEvent::Completed {
                    function: pending.function,
                    words,
                })
            }
            Err(EngineError::Protocol(err)) => Err(self.fail(err)),
            Err(err) => {
                self.pending = None;
                self.counters.record_error();
                Err(err)
            }
        }
    }

    fn fail(&mut self, err: ProtocolError) -> EngineError {
        self.pending = None;
        self.counters.record_error();
        self.last_error = Some(err);
        EngineError::Protocol(err)
    }

    /// Validates the frame buffer against `pending` and copies read data.
    fn accept(&self, pending: &Pending, registers: &mut [u16]) -> Result<usize, EngineError> {
        if !self.frame.crc_ok() {
            return Err(ProtocolError::BadCrc.into());
        }
        let (Some(unit_id), Some(function)) = (self.frame.unit_id(), self.frame.function()) else {
            return Err(ProtocolError::FrameTooShort { len: self.frame.len() }.into());
        };
        if unit_id != pending.unit_id {
            return Err(ProtocolError::UnexpectedUnit {
                expected: pending.unit_id,
                got: unit_id,
            }
            .into());
        }

        let mut r = Reader::new(self.frame.pdu());
        if FunctionCode::is_exception(function) {
            let exception = r
                .read_u8()
                .and_then(|byte| ExceptionResponse::decode(byte, &mut r))
                .map_err(ProtocolError::MalformedAnswer)?;
            return Err(ProtocolError::Exception {
                function: exception.function_code,
                code: exception.exception_code,
            }
            .into());
        }
        if FunctionCode::from_u8(function).is_err() {
            return Err(ProtocolError::UnsupportedFunction(function).into());
        }
        if function != pending.function.as_u8() {
            return Err(ProtocolError::UnexpectedFunction {
                expected: pending.function.as_u8(),
                got: function,
            }
            .into());
        }

        let response = Response::decode(&mut r).map_err(ProtocolError::MalformedAnswer)?;
        let quantity = usize::from(pending.quantity);
        match response {
            Response::ReadBits(resp) => copy_bits(&resp, quantity, registers),
            Response::ReadRegisters(resp) => copy_registers(&resp, quantity, registers),
            Response::WriteEcho(_) => Ok(0),
            Response::Exception(_) => {
                Err(ProtocolError::MalformedAnswer(DecodeError::InvalidFunctionCode).into())
            }
        }
    }
}

fn copy_bits(
    resp: &ReadBitsResponse<'_>,
    quantity: usize,
    registers: &mut [u16],
) -> Result<usize, EngineError> {
    if resp.packed.len() < quantity.div_ceil(8) {
        return Err(ProtocolError::MalformedAnswer(DecodeError::InvalidLength).into());
    }
    let words = quantity.div_ceil(16);
    let available = registers.len();
    let dst = registers
        .get_mut(..words)
        .ok_or(EngineError::RegisterBufferTooSmall {
            needed: words,
            available,
        })?;
    dst.fill(0);
    for index in 0..quantity {
        if resp.bit(index).unwrap_or(false) {
            dst[index / 16] |= 1 << (index % 16);
        }
    }
    Ok(words)
}

fn copy_registers(
    resp: &ReadRegistersResponse<'_>,
    quantity: usize,
    registers: &mut [u16],
) -> Result<usize, EngineError> {
    if resp.register_count() != quantity {
        return Err(ProtocolError::MalformedAnswer(DecodeError::InvalidLength).into());
    }
    let available = registers.len();
    let dst = registers
        .get_mut(..quantity)
        .ok_or(EngineError::RegisterBufferTooSmall {
            needed: quantity,
            available,
        })?;
    for (index, slot) in dst.iter_mut().enumerate() {
        *slot = resp.register(index).unwrap_or_default();
    }
    Ok(quantity)
}

#[cfg(test)]
mod tests {
    use super::{CommState, MasterEngine, MasterEvent, Telegram};
    use crate::transport::MemoryTransport;
    use crate::{EngineError, ProtocolError};
    use rtumod_core::frame::rtu;
    use rtumod_core::pdu::{ExceptionCode, FunctionCode};
    use std::time::{Duration, Instant};

    const T35: Duration = Duration::from_millis(5);

    fn raw_frame(bytes: &[u8]) -> Vec<u8> {
        let mut out = bytes.to_vec();
        out.extend_from_slice(&rtu::compute(bytes).to_be_bytes());
        out
    }

    fn answer(
        master: &mut MasterEngine,
        transport: &mut MemoryTransport,
        now: Instant,
        bytes: &[u8],
        registers: &mut [u16],
    ) -> Result<MasterEvent, EngineError> {
        transport.feed(bytes);
        assert_eq!(
            master.poll(now, transport, registers).unwrap(),
            MasterEvent::Waiting
        );
        master.poll(now + T35, transport, registers)
    }

    #[test]
    fn read_holding_registers_round_trip() {
        let mut master = MasterEngine::new();
        let mut transport = MemoryTransport::new();
        let t0 = Instant::now();

        let telegram = Telegram::read(0x11, FunctionCode::ReadHoldingRegisters, 0x006B, 3);
        master.query(t0, &mut transport, &telegram).unwrap();
        assert_eq!(
            transport.take_written(),
            &[0x11, 0x03, 0x00, 0x6B, 0x00, 0x03, 0x76, 0x87]
        );
        assert_eq!(master.state(), CommState::WaitingForAnswer);

        let mut registers = [0u16; 4];
        let event = answer(
            &mut master,
            &mut transport,
            t0,
            &raw_frame(&[0x11, 0x03, 0x06, 0x02, 0x2B, 0x00, 0x00, 0x00, 0x64]),
            &mut registers,
        )
        .unwrap();
        assert_eq!(
            event,
            MasterEvent::Completed {
                function: FunctionCode::ReadHoldingRegisters,
                words: 3
            }
        );
        assert_eq!(registers, [0x022B, 0x0000, 0x0064, 0]);
        assert_eq!(master.state(), CommState::Idle);
        assert_eq!(master.counters().sent, 1);
        assert_eq!(master.counters().received, 1);
    }

    #[test]
    fn read_coils_pack_into_words() {
        let mut master = MasterEngine::new();
        let mut transport = MemoryTransport::new();
        let t0 = Instant::now();

        let telegram = Telegram::read(1, FunctionCode::ReadCoils, 0, 18);
        master.query(t0, &mut transport, &telegram).unwrap();
        transport.take_written();

        let mut registers = [0xFFFFu16; 2];
        answer(
            &mut master,
            &mut transport,
            t0,
            &raw_frame(&[0x01, 0x01, 0x03, 0b0000_0101, 0b1000_0000, 0b0000_0010]),
            &mut registers,
        )
        .unwrap();
        assert_eq!(registers, [0b1000_0000_0000_0101, 0b10]);
    }

    #[test]
    fn single_coil_answer_is_accepted() {
        let mut master = MasterEngine::new();
        let mut transport = MemoryTransport::new();
        let t0 = Instant::now();

        master
            .query(t0, &mut transport, &Telegram::read(1, FunctionCode::ReadCoils, 0, 1))
            .unwrap();
        let mut registers = [0u16; 1];
        answer(
            &mut master,
            &mut transport,
            t0,
            &raw_frame(&[0x01, 0x01, 0x01, 0x01]),
            &mut registers,
        )
        .unwrap();
        assert_eq!(registers, [1]);
    }

    #[test]
    fn write_coil_uses_nonzero_source() {
        let mut master = MasterEngine::new();
        let mut transport = MemoryTransport::new();
        let t0 = Instant::now();

        let source = [7u16];
        let telegram = Telegram::write(1, FunctionCode::WriteSingleCoil, 4, 1, &source);
        master.query(t0, &mut transport, &telegram).unwrap();
        let sent = transport.take_written();
        assert_eq!(sent, raw_frame(&[0x01, 0x05, 0x00, 0x04, 0xFF, 0x00]));

        let event = answer(&mut master, &mut transport, t0, &sent, &mut []).unwrap();
        assert_eq!(
            event,
            MasterEvent::Completed {
                function: FunctionCode::WriteSingleCoil,
                words: 0
            }
        );
    }

    #[test]
    fn write_multiple_registers_encodes_source() {
        let mut master = MasterEngine::new();
        let mut transport = MemoryTransport::new();
        let t0 = Instant::now();

        let source = [0x000A, 0x0102, 0xFFFF];
        let telegram = Telegram::write(1, FunctionCode::WriteMultipleRegisters, 1, 2, &source);
        master.query(t0, &mut transport, &telegram).unwrap();
        assert_eq!(
            transport.take_written(),
            raw_frame(&[0x01, 0x10, 0x00, 0x01, 0x00, 0x02, 0x04, 0x00, 0x0A, 0x01, 0x02])
        );
    }

    #[test]
    fn timeout_returns_to_idle() {
        let mut master = MasterEngine::new();
        let mut transport = MemoryTransport::new();
        let t0 = Instant::now();

        master
            .query(t0, &mut transport, &Telegram::read(1, FunctionCode::ReadInputRegisters, 0, 1))
            .unwrap();
        let mut registers = [0u16; 1];
        assert_eq!(
            master.poll(t0 + Duration::from_millis(999), &mut transport, &mut registers).unwrap(),
            MasterEvent::Waiting
        );
        assert!(!master.timed_out(t0 + Duration::from_millis(1000)));
        assert!(master.timed_out(t0 + Duration::from_millis(1001)));

        let err = master
            .poll(t0 + Duration::from_millis(1001), &mut transport, &mut registers)
            .unwrap_err();
        assert!(matches!(err, EngineError::Protocol(ProtocolError::Timeout)));
        assert_eq!(master.state(), CommState::Idle);
        assert_eq!(master.counters().errors, 1);
        assert_eq!(master.last_error(), Some(ProtocolError::Timeout));
        assert_eq!(master.last_error().map(|err| err.code()), Some(255));

        let mut now = t0 + Duration::from_millis(1001);
        for _ in 0..100 {
            now += Duration::from_millis(1);
            assert_eq!(
                master.poll(now, &mut transport, &mut registers).unwrap(),
                MasterEvent::Idle
            );
        }
        assert_eq!(master.counters().errors, 1);

        transport.take_written();
        master
            .query(now, &mut transport, &Telegram::read(1, FunctionCode::ReadInputRegisters, 0, 1))
            .unwrap();
        assert_eq!(master.state(), CommState::WaitingForAnswer);
        assert!(!master.timed_out(now));
        assert_eq!(master.counters().sent, 2);
    }

    #[test]
    fn answer_length_floor() {
        let mut master = MasterEngine::new();
        let mut transport = MemoryTransport::new();
        let t0 = Instant::now();
        let telegram = Telegram::read(1, FunctionCode::ReadCoils, 0, 3);

        master.query(t0, &mut transport, &telegram).unwrap();
        let mut registers = [0u16; 1];
        let err = answer(&mut master, &mut transport, t0, &[0x01, 0x01, 0x01, 0x05], &mut registers)
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Protocol(ProtocolError::FrameTooShort { len: 4 })
        ));
        assert_eq!(master.state(), CommState::Idle);

        master.query(t0, &mut transport, &telegram).unwrap();
        let six_bytes = raw_frame(&[0x01, 0x01, 0x01, 0b101]);
        assert_eq!(six_bytes.len(), 6);
        let event = answer(&mut master, &mut transport, t0, &six_bytes, &mut registers).unwrap();
        assert_eq!(
            event,
            MasterEvent::Completed {
                function: FunctionCode::ReadCoils,
                words: 1
            }
        );
        assert_eq!(registers, [0b101]);
    }

    #[test]
    fn busy_while_waiting() {
        let mut master = MasterEngine::new();
        let mut transport = MemoryTransport::new();
        let t0 = Instant::now();
        let telegram = Telegram::read(1, FunctionCode::ReadCoils, 0, 1);
        master.query(t0, &mut transport, &telegram).unwrap();
        assert!(matches!(
            master.query(t0, &mut transport, &telegram),
            Err(EngineError::Busy)
        ));
    }

    #[test]
    fn rejects_bad_telegrams() {
        let mut master = MasterEngine::new();
        let mut transport = MemoryTransport::new();
        let t0 = Instant::now();

        for unit_id in [0u8, 248] {
            let telegram = Telegram::read(unit_id, FunctionCode::ReadCoils, 0, 1);
            assert!(matches!(
                master.query(t0, &mut transport, &telegram),
                Err(EngineError::InvalidUnitId(_))
            ));
        }

        let telegram = Telegram::read(1, FunctionCode::ReadHoldingRegisters, 0, 0);
        assert!(matches!(
            master.query(t0, &mut transport, &telegram),
            Err(EngineError::InvalidTelegram(_))
        ));

        let telegram = Telegram::read(1, FunctionCode::ReadHoldingRegisters, 0, 30);
        assert!(matches!(
            master.query(t0, &mut transport, &telegram),
            Err(EngineError::InvalidTelegram(_))
        ));

        let telegram = Telegram::write(1, FunctionCode::WriteMultipleRegisters, 0, 3, &[1, 2]);
        assert!(matches!(
            master.query(t0, &mut transport, &telegram),
            Err(EngineError::InvalidTelegram(_))
        ));

        assert!(transport.written().is_empty());
        assert_eq!(master.state(), CommState::Idle);
    }

    #[test]
    fn exception_answer_is_reported() {
        let mut master = MasterEngine::new();
        let mut transport = MemoryTransport::new();
        let t0 = Instant::now();
        master
            .query(t0, &mut transport, &Telegram::read(1, FunctionCode::ReadHoldingRegisters, 20, 1))
            .unwrap();

        let err = answer(
            &mut master,
            &mut transport,
            t0,
            &raw_frame(&[0x01, 0x83, 0x02]),
            &mut [0u16; 1],
        )
        .unwrap_err();
        let expected = ProtocolError::Exception {
            function: 0x03,
            code: ExceptionCode::IllegalDataAddress,
        };
        assert!(matches!(err, EngineError::Protocol(e) if e == expected));
        assert_eq!(master.last_error().map(|err| err.code()), Some(2));
        assert_eq!(master.state(), CommState::Idle);
    }

    #[test]
    fn corrupted_answer_is_bad_crc() {
        let mut master = MasterEngine::new();
        let mut transport = MemoryTransport::new();
        let t0 = Instant::now();
        master
            .query(t0, &mut transport, &Telegram::read(1, FunctionCode::ReadHoldingRegisters, 0, 1))
            .unwrap();

        let mut bytes = raw_frame(&[0x01, 0x03, 0x02, 0x00, 0x2A]);
        bytes[4] ^= 0xFF;
        let err = answer(&mut master, &mut transport, t0, &bytes, &mut [0u16; 1]).unwrap_err();
        assert!(matches!(err, EngineError::Protocol(ProtocolError::BadCrc)));
        assert_eq!(master.counters().errors, 1);
    }

    #[test]
    fn mismatched_function_is_rejected() {
        let mut master = MasterEngine::new();
        let mut transport = MemoryTransport::new();
        let t0 = Instant::now();
        master
            .query(t0, &mut transport, &Telegram::read(1, FunctionCode::ReadHoldingRegisters, 0, 1))
            .unwrap();

        let err = answer(
            &mut master,
            &mut transport,
            t0,
            &raw_frame(&[0x01, 0x04, 0x02, 0x00, 0x2A]),
            &mut [0u16; 1],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Protocol(ProtocolError::UnexpectedFunction {
                expected: 0x03,
                got: 0x04
            })
        ));
    }

    #[test]
    fn short_destination_is_reported() {
        let mut master = MasterEngine::new();
        let mut transport = MemoryTransport::new();
        let t0 = Instant::now();
        master
            .query(t0, &mut transport, &Telegram::read(1, FunctionCode::ReadHoldingRegisters, 0, 2))
            .unwrap();

        let err = answer(
            &mut master,
            &mut transport,
            t0,
            &raw_frame(&[0x01, 0x03, 0x04, 0x00, 0x01, 0x00, 0x02]),
            &mut [0u16; 1],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            EngineError::RegisterBufferTooSmall {
                needed: 2,
                available: 1
            }
        ));
        assert_eq!(master.state(), CommState::Idle);
    }

    #[test]
    fn poll_without_query_is_idle() {
        let mut master = MasterEngine::new();
        let mut transport = MemoryTransport::new();
        transport.feed(&[0x01, 0x02]);
        assert_eq!(
            master.poll(Instant::now(), &mut transport, &mut []).unwrap(),
            MasterEvent::Idle
        );
    }
}
