use crate::encoding::{packed_bit, Reader, Writer};
use crate::pdu::{ExceptionResponse, FunctionCode};
use crate::{DecodeError, EncodeError};

/// FC1/FC2 answer body: packed bit status, LSB first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadBitsResponse<'a> {
    pub function_code: FunctionCode,
    pub packed: &'a [u8],
}

impl<'a> ReadBitsResponse<'a> {
    pub fn bit(&self, index: usize) -> Option<bool> {
        packed_bit(self.packed, index)
    }

    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        let byte_count: u8 = self
            .packed
            .len()
            .try_into()
            .map_err(|_| EncodeError::ValueOutOfRange)?;
        w.write_u8(self.function_code.as_u8())?;
        w.write_u8(byte_count)?;
        w.write_all(self.packed)?;
        Ok(())
    }
}

/// FC3/FC4 answer body: big-endian register words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRegistersResponse<'a> {
    pub function_code: FunctionCode,
    pub data: &'a [u8],
}

impl<'a> ReadRegistersResponse<'a> {
    pub fn register_count(&self) -> usize {
        self.data.len() / 2
    }

    pub fn register(&self, index: usize) -> Option<u16> {
        let offset = index.checked_mul(2)?;
        let bytes = self.data.get(offset..offset + 2)?;
        Some(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        if self.data.len() % 2 != 0 {
            return Err(EncodeError::InvalidLength);
        }
        let byte_count: u8 = self
            .data
            .len()
            .try_into()
            .map_err(|_| EncodeError::ValueOutOfRange)?;
        w.write_u8(self.function_code.as_u8())?;
        w.write_u8(byte_count)?;
        w.write_all(self.data)?;
        Ok(())
    }
}

/// Echo returned by the four write functions.
///
/// `field` is the written value for FC5/FC6 and the quantity for FC15/FC16.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteEchoResponse {
    pub function_code: FunctionCode,
    pub address: u16,
    pub field: u16,
}

impl WriteEchoResponse {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        w.write_u8(self.function_code.as_u8())?;
        w.write_be_u16(self.address)?;
        w.write_be_u16(self.field)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response<'a> {
    ReadBits(ReadBitsResponse<'a>),
    ReadRegisters(ReadRegistersResponse<'a>),
    WriteEcho(WriteEchoResponse),
    Exception(ExceptionResponse),
}

impl<'a> Response<'a> {
    pub fn decode(r: &mut Reader<'a>) -> Result<Self, DecodeError> {
        let function_byte = r.read_u8()?;
        if FunctionCode::is_exception(function_byte) {
            return Ok(Self::Exception(ExceptionResponse::decode(function_byte, r)?));
        }

        let function_code = FunctionCode::from_u8(function_byte)?;
        match function_code {
            FunctionCode::ReadCoils | FunctionCode::ReadDiscreteInputs => {
                let packed = r.read_counted()?;
                if packed.is_empty() {
                    return Err(DecodeError::InvalidLength);
                }
                Ok(Self::ReadBits(ReadBitsResponse {
                    function_code,
                    packed,
                }))
            }
            FunctionCode::ReadHoldingRegisters | FunctionCode::ReadInputRegisters => {
                let data = r.read_counted()?;
                if data.is_empty() || data.len() % 2 != 0 {
                    return Err(DecodeError::InvalidLength);
                }
                Ok(Self::ReadRegisters(ReadRegistersResponse {
                    function_code,
                    data,
                }))
            }
            FunctionCode::WriteSingleCoil
            | FunctionCode::WriteSingleRegister
            | FunctionCode::WriteMultipleCoils
            | FunctionCode::WriteMultipleRegisters => {
                let address = r.read_be_u16()?;
                let field = r.read_be_u16()?;
                Ok(Self::WriteEcho(WriteEchoResponse {
                    function_code,
                    address,
                    field,
                }))
            }
        }
    }

    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        match self {
            Self::ReadBits(resp) => resp.encode(w),
            Self::ReadRegisters(resp) => resp.encode(w),
            Self::WriteEcho(resp) => resp.encode(w),
            Self::Exception(resp) => resp.encode(w),
        }
    }

    /// Function byte of the answer with the exception bit cleared.
    pub fn function_byte(&self) -> u8 {
        match self {
            Self::ReadBits(resp) => resp.function_code.as_u8(),
            Self::ReadRegisters(resp) => resp.function_code.as_u8(),
            Self::WriteEcho(resp) => resp.function_code.as_u8(),
            Self::Exception(resp) => resp.function_code,
        }
    }
}
