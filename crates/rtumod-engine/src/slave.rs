use std::time::Instant;

use rtumod_core::encoding::{Reader, Writer};
use rtumod_core::pdu::{
    DecodedRequest, ExceptionCode, ExceptionResponse, FunctionCode, ReadBitsResponse,
    ReadRegistersResponse, Response, WriteEchoResponse,
};
use rtumod_core::registers::{BitBank, RegisterBank, COIL_COUNT, HOLDING_REGISTER_COUNT};
use rtumod_core::{DecodeError, EncodeError, Frame, RegisterError, RegisterMap, MAX_FRAME_LEN};
use tracing::{debug, trace, warn};

use crate::assembler::{Assembly, FrameAssembler};
use crate::config::EngineConfig;
use crate::transport::Transport;
use crate::{Counters, EngineError, ProtocolError};

/// Shortest request a slave will look at: id, function, two words, CRC.
const MIN_REQUEST_LEN: usize = 7;
const MAX_UNIT_ID: u8 = 247;

/// What one slave tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlaveEvent {
    /// No complete frame yet.
    Idle,
    /// A frame for another unit was discarded.
    NotAddressed { unit_id: u8 },
    /// A request was served and `len` answer bytes were sent.
    Replied { function: FunctionCode, len: usize },
    /// An exception answer was sent.
    Exception { function: u8, code: ExceptionCode },
}

/// Answer to build once the request has been applied.
#[derive(Debug, Clone, Copy)]
enum Reply {
    Bits {
        function: FunctionCode,
        start: u16,
        quantity: u16,
    },
    Registers {
        function: FunctionCode,
        start: u16,
        quantity: u16,
    },
    Echo(WriteEchoResponse),
}

fn validate_unit_id(id: u8) -> Result<u8, EngineError> {
    if id == 0 || id > MAX_UNIT_ID {
        return Err(EngineError::InvalidUnitId(id));
    }
    Ok(id)
}

fn map_register_error(err: RegisterError) -> ExceptionCode {
    match err {
        RegisterError::AddressOutOfRange { .. } => ExceptionCode::IllegalDataAddress,
        RegisterError::InvalidReference => ExceptionCode::ServerDeviceFailure,
    }
}

fn map_decode_error(err: DecodeError) -> ExceptionCode {
    match err {
        DecodeError::InvalidFunctionCode => ExceptionCode::IllegalFunction,
        _ => ExceptionCode::IllegalDataValue,
    }
}

/// Range check on the start and quantity words alone, before the payload is
/// decoded. Single writes address one element.
fn check_header_range(
    function: FunctionCode,
    pdu: &[u8],
    registers: &RegisterMap,
) -> Result<(), ExceptionCode> {
    let mut r = Reader::new(pdu.get(1..).unwrap_or_default());
    let start = r.read_be_u16().map_err(map_decode_error)?;
    let count = match function {
        FunctionCode::WriteSingleCoil | FunctionCode::WriteSingleRegister => 1,
        _ => usize::from(r.read_be_u16().map_err(map_decode_error)?),
    };
    let in_range = match function {
        FunctionCode::ReadCoils
        | FunctionCode::WriteSingleCoil
        | FunctionCode::WriteMultipleCoils => registers.coils().check_range(start, count),
        FunctionCode::ReadDiscreteInputs => registers.discrete_inputs().check_range(start, count),
        FunctionCode::ReadHoldingRegisters
        | FunctionCode::WriteSingleRegister
        | FunctionCode::WriteMultipleRegisters => {
            registers.holding_registers().check_range(start, count)
        }
        FunctionCode::ReadInputRegisters => registers.input_registers().check_range(start, count),
    };
    in_range.map_err(map_register_error)
}

fn pack_bits<const WORDS: usize>(
    bank: &BitBank<WORDS>,
    start: u16,
    quantity: u16,
    out: &mut [u8],
) -> Result<usize, EncodeError> {
    let mut w = Writer::new(out);
    w.write_packed_bits((0..quantity).map(|i| bank.get(start.wrapping_add(i)).unwrap_or(false)))
}

fn pack_registers<const N: usize>(
    bank: &RegisterBank<N>,
    start: u16,
    quantity: u16,
    out: &mut [u8],
) -> Result<usize, EncodeError> {
    let mut w = Writer::new(out);
    for i in 0..quantity {
        let value = bank
            .get(start.wrapping_add(i))
            .map_err(|_| EncodeError::ValueOutOfRange)?;
        w.write_be_u16(value)?;
    }
    Ok(w.position())
}

/// Modbus RTU slave serving a [`RegisterMap`].
#[derive(Debug, Clone)]
pub struct SlaveEngine {
    id: u8,
    config: EngineConfig,
    assembler: FrameAssembler,
    frame: Frame,
    counters: Counters,
    last_error: Option<ProtocolError>,
    watchdog: Option<Instant>,
}

impl SlaveEngine {
    pub fn new(id: u8) -> Result<Self, EngineError> {
        Self::with_config(id, EngineConfig::default())
    }

    pub fn with_config(id: u8, config: EngineConfig) -> Result<Self, EngineError> {
        Ok(Self {
            id: validate_unit_id(id)?,
            config,
            assembler: FrameAssembler::new(config.inter_char_timeout),
            frame: Frame::new(),
            counters: Counters::default(),
            last_error: None,
            watchdog: None,
        })
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn set_id(&mut self, id: u8) -> Result<(), EngineError> {
        self.id = validate_unit_id(id)?;
        Ok(())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn counters(&self) -> Counters {
        self.counters
    }

    pub fn last_error(&self) -> Option<ProtocolError> {
        self.last_error
    }

    /// `true` when no valid request arrived within `response_timeout` of the
    /// previous one, or none has arrived yet.
    pub fn timed_out(&self, now: Instant) -> bool {
        match self.watchdog {
            Some(deadline) => now > deadline,
            None => true,
        }
    }

    /// Re-initializes counters, error state and framing. The id is kept.
    pub fn reset(&mut self) {
        self.assembler.reset();
        self.frame.clear();
        self.counters = Counters::default();
        self.last_error = None;
        self.watchdog = None;
    }

    pub fn poll<T>(
        &mut self,
        now: Instant,
        transport: &mut T,
        registers: &mut RegisterMap,
    ) -> Result<SlaveEvent, EngineError>
    where
        T: Transport + ?Sized,
    {
        let len = match self.assembler.poll(now, transport, &mut self.frame)? {
            Assembly::Idle | Assembly::Accumulating => return Ok(SlaveEvent::Idle),
            Assembly::Overflow { discarded } => {
                self.counters.record_received();
                warn!(discarded, "dropped oversized request");
                return Err(self.fail(ProtocolError::FrameOverflow));
            }
            Assembly::Ready(len) => len,
        };
        self.counters.record_received();

        if len < MIN_REQUEST_LEN {
            warn!(len, "dropped short request");
            return Err(self.fail(ProtocolError::FrameTooShort { len }));
        }

        let (Some(unit_id), Some(function)) = (self.frame.unit_id(), self.frame.function()) else {
            return Err(self.fail(ProtocolError::FrameTooShort { len }));
        };
        if unit_id != self.id {
            trace!(unit_id, "ignoring frame for another unit");
            return Ok(SlaveEvent::NotAddressed { unit_id });
        }

        if !self.frame.crc_ok() {
            warn!(unit_id, "dropped request with crc mismatch");
            return Err(self.fail(ProtocolError::BadCrc));
        }

        let reply = match self.apply(now, registers) {
            Ok(reply) => reply,
            Err(code) => return self.send_exception(transport, function, code),
        };

        let len = self.build_reply(reply, registers)?;
        transport.write(self.frame.as_bytes())?;
        transport.flush()?;
        self.counters.record_sent();
        self.last_error = None;

        let function = match reply {
            Reply::Bits { function, .. } | Reply::Registers { function, .. } => function,
            Reply::Echo(echo) => echo.function_code,
        };
        debug!(unit_id, function = function.as_u8(), len, "served request");
        Ok(SlaveEvent::Replied { function, len })
    }

    fn fail(&mut self, err: ProtocolError) -> EngineError {
        self.counters.record_error();
        self.last_error = Some(err);
        EngineError::Protocol(err)
    }

    /// Validates the request in the frame buffer and applies it to `registers`.
    ///
    /// Order: function code, then the address range from the header words,
    /// then the payload.
    fn apply(&mut self, now: Instant, registers: &mut RegisterMap) -> Result<Reply, ExceptionCode> {
        let pdu = self.frame.pdu();
        let function = pdu
            .first()
            .and_then(|byte| FunctionCode::from_u8(*byte).ok())
            .ok_or(ExceptionCode::IllegalFunction)?;
        check_header_range(function, pdu, registers)?;

        let mut r = Reader::new(pdu);
        let request = match DecodedRequest::decode(&mut r) {
            Ok(request) if r.is_empty() => request,
            Ok(_) => return Err(ExceptionCode::IllegalDataValue),
            Err(err) => return Err(map_decode_error(err)),
        };

        self.watchdog = Some(now + self.config.response_timeout);
        let function_code = request.function_code();

        match request {
            DecodedRequest::ReadCoils(req)
            | DecodedRequest::ReadDiscreteInputs(req) => Ok(Reply::Bits {
                function: function_code,
                start: req.start_address,
                quantity: req.quantity,
            }),
            DecodedRequest::ReadHoldingRegisters(req)
            | DecodedRequest::ReadInputRegisters(req) => Ok(Reply::Registers {
                function: function_code,
                start: req.start_address,
                quantity: req.quantity,
            }),
            DecodedRequest::WriteSingleCoil(req) => {
                let state = req.state().ok_or(ExceptionCode::ServerDeviceFailure)?;
                registers
                    .coils_mut()
                    .set(req.address, state)
                    .map_err(map_register_error)?;
                Ok(Reply::Echo(WriteEchoResponse {
                    function_code,
                    address: req.address,
                    field: req.value,
                }))
            }
            DecodedRequest::WriteSingleRegister(req) => {
                registers
                    .holding_registers_mut()
                    .set(req.address, req.value)
                    .map_err(map_register_error)?;
                Ok(Reply::Echo(WriteEchoResponse {
                    function_code,
                    address: req.address,
                    field: req.value,
                }))
            }
            DecodedRequest::WriteMultipleCoils(req) => {
                let mut bits = [false; COIL_COUNT];
                let bits = bits
                    .get_mut(..usize::from(req.quantity))
                    .ok_or(ExceptionCode::IllegalDataAddress)?;
                for (index, slot) in bits.iter_mut().enumerate() {
                    *slot = req.coil(index).unwrap_or(false);
                }
                registers
                    .coils_mut()
                    .write(req.start_address, bits)
                    .map_err(map_register_error)?;
                Ok(Reply::Echo(WriteEchoResponse {
                    function_code,
                    address: req.start_address,
                    field: req.quantity,
                }))
            }
            DecodedRequest::WriteMultipleRegisters(req) => {
                let mut values = [0u16; HOLDING_REGISTER_COUNT];
                let values = values
                    .get_mut(..usize::from(req.quantity))
                    .ok_or(ExceptionCode::IllegalDataAddress)?;
                for (index, slot) in values.iter_mut().enumerate() {
                    *slot = req.register(index).ok_or(ExceptionCode::IllegalDataValue)?;
                }
                registers
                    .holding_registers_mut()
                    .write(req.start_address, values)
                    .map_err(map_register_error)?;
                Ok(Reply::Echo(WriteEchoResponse {
                    function_code,
                    address: req.start_address,
                    field: req.quantity,
                }))
            }
        }
    }

    fn build_reply(&mut self, reply: Reply, registers: &RegisterMap) -> Result<usize, EngineError> {
        let mut data = [0u8; MAX_FRAME_LEN];
        let response = match reply {
            Reply::Bits {
                function,
                start,
                quantity,
            } => {
                let n = if function == FunctionCode::ReadCoils {
                    pack_bits(registers.coils(), start, quantity, &mut data)?
                } else {
                    pack_bits(registers.discrete_inputs(), start, quantity, &mut data)?
                };
                Response::ReadBits(ReadBitsResponse {
                    function_code: function,
                    packed: &data[..n],
                })
            }
            Reply::Registers {
                function,
                start,
                quantity,
            } => {
                let n = if function == FunctionCode::ReadHoldingRegisters {
                    pack_registers(registers.holding_registers(), start, quantity, &mut data)?
                } else {
                    pack_registers(registers.input_registers(), start, quantity, &mut data)?
                };
                Response::ReadRegisters(ReadRegistersResponse {
                    function_code: function,
                    data: &data[..n],
                })
            }
            Reply::Echo(echo) => Response::WriteEcho(echo),
        };
        Ok(self.frame.build(self.id, |w| response.encode(w))?)
    }

    fn send_exception<T>(
        &mut self,
        transport: &mut T,
        function: u8,
        code: ExceptionCode,
    ) -> Result<SlaveEvent, EngineError>
    where
        T: Transport + ?Sized,
    {
        let function = function & 0x7F;
        self.frame.build(self.id, |w| {
            ExceptionResponse {
                function_code: function,
                exception_code: code,
            }
            .encode(w)
        })?;
        transport.write(self.frame.as_bytes())?;
        transport.flush()?;
        self.counters.record_sent();
        self.counters.record_error();
        self.last_error = Some(ProtocolError::Exception { function, code });
        debug!(
            unit_id = self.id,
            function,
            code = code.as_u8(),
            "sent exception"
        );
        Ok(SlaveEvent::Exception { function, code })
    }
}
