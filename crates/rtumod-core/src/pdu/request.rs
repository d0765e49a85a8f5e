use crate::encoding::{packed_bit, Reader, Writer};
use crate::frame::rtu::{CRC_LEN, MAX_FRAME_LEN};
use crate::pdu::FunctionCode;
use crate::{DecodeError, EncodeError};

// Limits derived from MAX_FRAME_LEN: a request or its answer must fit in one
// frame including unit id and CRC.
const ANSWER_OVERHEAD: usize = 1 + 1 + 1 + CRC_LEN;
const WRITE_MULTIPLE_OVERHEAD: usize = 1 + 1 + 2 + 2 + 1 + CRC_LEN;

pub const MAX_READ_BITS: u16 = ((MAX_FRAME_LEN - ANSWER_OVERHEAD) * 8) as u16;
pub const MAX_READ_REGISTERS: u16 = ((MAX_FRAME_LEN - ANSWER_OVERHEAD) / 2) as u16;
pub const MAX_WRITE_COILS: u16 = ((MAX_FRAME_LEN - WRITE_MULTIPLE_OVERHEAD) * 8) as u16;
pub const MAX_WRITE_REGISTERS: u16 = ((MAX_FRAME_LEN - WRITE_MULTIPLE_OVERHEAD) / 2) as u16;

pub const COIL_ON: u16 = 0xFF00;
pub const COIL_OFF: u16 = 0x0000;

fn validate_quantity(quantity: u16, max: u16) -> Result<(), EncodeError> {
    if quantity == 0 || quantity > max {
        return Err(EncodeError::ValueOutOfRange);
    }
    Ok(())
}

fn write_header(
    w: &mut Writer<'_>,
    function: FunctionCode,
    start_address: u16,
    quantity: u16,
) -> Result<(), EncodeError> {
    w.write_u8(function.as_u8())?;
    w.write_be_u16(start_address)?;
    w.write_be_u16(quantity)?;
    Ok(())
}

/// Coil `index` out of a word-packed coil image (16 coils per word, LSB first).
pub fn word_bit(words: &[u16], index: usize) -> Option<bool> {
    let word = words.get(index / 16)?;
    Some((word & (1u16 << (index % 16))) != 0)
}

/// Start address and quantity shared by the four read functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRequest {
    pub start_address: u16,
    pub quantity: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteSingleCoilRequest {
    pub address: u16,
    /// Raw wire value; only [`COIL_ON`] and [`COIL_OFF`] are meaningful.
    pub value: u16,
}

impl WriteSingleCoilRequest {
    pub fn state(&self) -> Option<bool> {
        match self.value {
            COIL_ON => Some(true),
            COIL_OFF => Some(false),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteSingleRegisterRequest {
    pub address: u16,
    pub value: u16,
}

/// FC15 as built by a master: coils come from a word-packed image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteMultipleCoilsRequest<'a> {
    pub start_address: u16,
    pub quantity: u16,
    pub coils: &'a [u16],
}

impl<'a> WriteMultipleCoilsRequest<'a> {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        validate_quantity(self.quantity, MAX_WRITE_COILS)?;
        let quantity = usize::from(self.quantity);
        if self.coils.len() < quantity.div_ceil(16) {
            return Err(EncodeError::InvalidLength);
        }
        let byte_count =
            u8::try_from(quantity.div_ceil(8)).map_err(|_| EncodeError::ValueOutOfRange)?;

        write_header(
            w,
            FunctionCode::WriteMultipleCoils,
            self.start_address,
            self.quantity,
        )?;
        w.write_u8(byte_count)?;
        w.write_packed_bits((0..quantity).map(|i| word_bit(self.coils, i).unwrap_or(false)))?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteMultipleRegistersRequest<'a> {
    pub start_address: u16,
    pub values: &'a [u16],
}

impl<'a> WriteMultipleRegistersRequest<'a> {
    pub fn quantity(&self) -> Result<u16, EncodeError> {
        let quantity: u16 = self
            .values
            .len()
            .try_into()
            .map_err(|_| EncodeError::ValueOutOfRange)?;
        validate_quantity(quantity, MAX_WRITE_REGISTERS)?;
        Ok(quantity)
    }

    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        let quantity = self.quantity()?;
        let byte_count = u8::try_from(self.values.len() * 2)
            .map_err(|_| EncodeError::ValueOutOfRange)?;

        write_header(
            w,
            FunctionCode::WriteMultipleRegisters,
            self.start_address,
            quantity,
        )?;
        w.write_u8(byte_count)?;
        for value in self.values {
            w.write_be_u16(*value)?;
        }
        Ok(())
    }
}

/// A request as a master encodes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request<'a> {
    ReadCoils(ReadRequest),
    ReadDiscreteInputs(ReadRequest),
    ReadHoldingRegisters(ReadRequest),
    ReadInputRegisters(ReadRequest),
    WriteSingleCoil(WriteSingleCoilRequest),
    WriteSingleRegister(WriteSingleRegisterRequest),
    WriteMultipleCoils(WriteMultipleCoilsRequest<'a>),
    WriteMultipleRegisters(WriteMultipleRegistersRequest<'a>),
}

impl<'a> Request<'a> {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        let function = self.function_code();
        match self {
            Self::ReadCoils(req) | Self::ReadDiscreteInputs(req) => {
                validate_quantity(req.quantity, MAX_READ_BITS)?;
                write_header(w, function, req.start_address, req.quantity)
            }
            Self::ReadHoldingRegisters(req) | Self::ReadInputRegisters(req) => {
                validate_quantity(req.quantity, MAX_READ_REGISTERS)?;
                write_header(w, function, req.start_address, req.quantity)
            }
            Self::WriteSingleCoil(req) => {
                if req.state().is_none() {
                    return Err(EncodeError::ValueOutOfRange);
                }
                write_header(w, function, req.address, req.value)
            }
            Self::WriteSingleRegister(req) => write_header(w, function, req.address, req.value),
            Self::WriteMultipleCoils(req) => req.encode(w),
            Self::WriteMultipleRegisters(req) => req.encode(w),
        }
    }

    pub fn function_code(&self) -> FunctionCode {
        match self {
            Self::ReadCoils(_) => FunctionCode::ReadCoils,
            Self::ReadDiscreteInputs(_) => FunctionCode::ReadDiscreteInputs,
            Self::ReadHoldingRegisters(_) => FunctionCode::ReadHoldingRegisters,
            Self::ReadInputRegisters(_) => FunctionCode::ReadInputRegisters,
            Self::WriteSingleCoil(_) => FunctionCode::WriteSingleCoil,
            Self::WriteSingleRegister(_) => FunctionCode::WriteSingleRegister,
            Self::WriteMultipleCoils(_) => FunctionCode::WriteMultipleCoils,
            Self::WriteMultipleRegisters(_) => FunctionCode::WriteMultipleRegisters,
        }
    }
}

/// Borrowed decode representation for FC15 payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteMultipleCoilsRequestData<'a> {
    pub start_address: u16,
    pub quantity: u16,
    pub values_packed: &'a [u8],
}

impl<'a> WriteMultipleCoilsRequestData<'a> {
    pub fn coil(&self, index: usize) -> Option<bool> {
        if index >= usize::from(self.quantity) {
            return None;
        }
        packed_bit(self.values_packed, index)
    }
}

/// Borrowed decode representation for FC16 payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteMultipleRegistersRequestData<'a> {
    pub start_address: u16,
    pub quantity: u16,
    pub values_bytes: &'a [u8],
}

impl<'a> WriteMultipleRegistersRequestData<'a> {
    pub fn register(&self, index: usize) -> Option<u16> {
        if index >= usize::from(self.quantity) {
            return None;
        }
        let offset = index.checked_mul(2)?;
        let bytes = self.values_bytes.get(offset..offset + 2)?;
        Some(u16::from_be_bytes([bytes[0], bytes[1]]))
    }
}

/// A request as a slave decodes it from a received frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodedRequest<'a> {
    ReadCoils(ReadRequest),
    ReadDiscreteInputs(ReadRequest),
    ReadHoldingRegisters(ReadRequest),
    ReadInputRegisters(ReadRequest),
    WriteSingleCoil(WriteSingleCoilRequest),
    WriteSingleRegister(WriteSingleRegisterRequest),
    WriteMultipleCoils(WriteMultipleCoilsRequestData<'a>),
    WriteMultipleRegisters(WriteMultipleRegistersRequestData<'a>),
}

impl<'a> DecodedRequest<'a> {
    pub fn function_code(&self) -> FunctionCode {
        match self {
            Self::ReadCoils(_) => FunctionCode::ReadCoils,
            Self::ReadDiscreteInputs(_) => FunctionCode::ReadDiscreteInputs,
            Self::ReadHoldingRegisters(_) => FunctionCode::ReadHoldingRegisters,
            Self::ReadInputRegisters(_) => FunctionCode::ReadInputRegisters,
            Self::WriteSingleCoil(_) => FunctionCode::WriteSingleCoil,
            Self::WriteSingleRegister(_) => FunctionCode::WriteSingleRegister,
            Self::WriteMultipleCoils(_) => FunctionCode::WriteMultipleCoils,
            Self::WriteMultipleRegisters(_) => FunctionCode::WriteMultipleRegisters,
        }
    }

    pub fn decode(r: &mut Reader<'a>) -> Result<Self, DecodeError> {
        let function = FunctionCode::from_u8(r.read_u8()?)?;
        let address = r.read_be_u16()?;
        let field = r.read_be_u16()?;
        let read = ReadRequest {
            start_address: address,
            quantity: field,
        };
        let nonzero = |quantity: u16| {
            if quantity == 0 {
                Err(DecodeError::InvalidValue)
            } else {
                Ok(())
            }
        };

        match function {
            FunctionCode::ReadCoils => {
                nonzero(field)?;
                Ok(Self::ReadCoils(read))
            }
            FunctionCode::ReadDiscreteInputs => {
                nonzero(field)?;
                Ok(Self::ReadDiscreteInputs(read))
            }
            FunctionCode::ReadHoldingRegisters => {
                nonzero(field)?;
                Ok(Self::ReadHoldingRegisters(read))
            }
            FunctionCode::ReadInputRegisters => {
                nonzero(field)?;
                Ok(Self::ReadInputRegisters(read))
            }
            FunctionCode::WriteSingleCoil => Ok(Self::WriteSingleCoil(WriteSingleCoilRequest {
                address,
                value: field,
            })),
            FunctionCode::WriteSingleRegister => {
                Ok(Self::WriteSingleRegister(WriteSingleRegisterRequest {
                    address,
                    value: field,
                }))
            }
            FunctionCode::WriteMultipleCoils => {
                nonzero(field)?;
                let values_packed = r.read_counted()?;
                if values_packed.len() != usize::from(field).div_ceil(8) {
                    return Err(DecodeError::InvalidLength);
                }
                Ok(Self::WriteMultipleCoils(WriteMultipleCoilsRequestData {
                    start_address: address,
                    quantity: field,
                    values_packed,
                }))
            }
            FunctionCode::WriteMultipleRegisters => {
                nonzero(field)?;
                let values_bytes = r.read_counted()?;
                if values_bytes.len() != usize::from(field) * 2 {
                    return Err(DecodeError::InvalidLength);
                }
                Ok(Self::WriteMultipleRegisters(WriteMultipleRegistersRequestData {
                    start_address: address,
                    quantity: field,
                    values_bytes,
                }))
            }
        }
    }
}
