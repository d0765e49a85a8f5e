//! RTU framing: the CRC16 codec and the fixed-capacity frame buffer.
//!
//! A frame on the wire is `[unit_id][function][payload..][crc_lo][crc_hi]`.
//! [`compute`] returns the CRC already byte-swapped into wire order, so its
//! big-endian bytes are exactly the two trailing frame bytes.

use crate::encoding::Writer;
use crate::EncodeError;

/// Upper bound on any frame, request or answer, including the CRC.
pub const MAX_FRAME_LEN: usize = 64;
pub const CRC_LEN: usize = 2;
/// `[unit_id][function|0x80][code][crc_lo][crc_hi]`
pub const EXCEPTION_FRAME_LEN: usize = 5;

const HEADER_LEN: usize = 2;

const fn build_crc16_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u16;
        let mut bit = 0;
        while bit < 8 {
            if (crc & 0x0001) != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

const CRC16_TABLE: [u16; 256] = build_crc16_table();

fn crc16(data: &[u8]) -> u16 {
    let mut crc = 0xFFFFu16;
    for byte in data {
        let idx = ((crc ^ u16::from(*byte)) & 0x00FF) as usize;
        crc = (crc >> 8) ^ CRC16_TABLE[idx];
    }
    crc
}

/// Modbus CRC16 over `data`, returned in wire order (high byte = `crc_lo`).
pub fn compute(data: &[u8]) -> u16 {
    crc16(data).swap_bytes()
}

pub fn verify(data: &[u8], received: u16) -> bool {
    compute(data) == received
}

/// One raw RTU frame, reused from exchange to exchange.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    buf: [u8; MAX_FRAME_LEN],
    len: usize,
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for Frame {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Frame")
            .field("bytes", &self.as_bytes())
            .finish()
    }
}

impl Frame {
    pub const fn new() -> Self {
        Self {
            buf: [0u8; MAX_FRAME_LEN],
            len: 0,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub const fn len(&self) -> usize {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Backing storage for filling the frame straight from a transport.
    /// Follow with [`Frame::set_len`].
    pub fn storage_mut(&mut self) -> &mut [u8; MAX_FRAME_LEN] {
        &mut self.buf
    }

    pub fn set_len(&mut self, len: usize) -> Result<(), EncodeError> {
        if len > MAX_FRAME_LEN {
            return Err(EncodeError::BufferTooSmall);
        }
        self.len = len;
        Ok(())
    }

    pub fn copy_from(&mut self, bytes: &[u8]) -> Result<(), EncodeError> {
        if bytes.len() > MAX_FRAME_LEN {
            return Err(EncodeError::BufferTooSmall);
        }
        self.buf[..bytes.len()].copy_from_slice(bytes);
        self.len = bytes.len();
        Ok(())
    }

    pub fn unit_id(&self) -> Option<u8> {
        self.as_bytes().first().copied()
    }

    pub fn function(&self) -> Option<u8> {
        self.as_bytes().get(1).copied()
    }

    /// Big-endian word at byte `offset`.
    pub fn word(&self, offset: usize) -> Option<u16> {
        let bytes = self.as_bytes().get(offset..offset + 2)?;
        Some(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    /// Start address field of a request, or an echoed address.
    pub fn address(&self) -> Option<u16> {
        self.word(2)
    }

    /// Quantity (or single-write value) field following the address.
    pub fn quantity(&self) -> Option<u16> {
        self.word(4)
    }

    /// Function code and payload, without unit id and CRC.
    pub fn pdu(&self) -> &[u8] {
        if self.len < HEADER_LEN + CRC_LEN {
            return &[];
        }
        &self.buf[1..self.len - CRC_LEN]
    }

    /// The two trailing bytes interpreted in wire order.
    pub fn received_crc(&self) -> Option<u16> {
        if self.len < CRC_LEN {
            return None;
        }
        Some(u16::from_be_bytes([
            self.buf[self.len - 2],
            self.buf[self.len - 1],
        ]))
    }

    pub fn crc_ok(&self) -> bool {
        match self.received_crc() {
            Some(crc) if self.len > CRC_LEN => verify(&self.buf[..self.len - CRC_LEN], crc),
            _ => false,
        }
    }

    /// Rebuilds the frame as `[unit_id][body..][crc]`.
    ///
    /// `body` receives a writer positioned after the unit id; the CRC is
    /// appended afterwards. On error the frame is left empty.
    pub fn build<F>(&mut self, unit_id: u8, body: F) -> Result<usize, EncodeError>
    where
        F: FnOnce(&mut Writer<'_>) -> Result<(), EncodeError>,
    {
        self.len = 0;
        let written = {
            let mut w = Writer::new(&mut self.buf[..MAX_FRAME_LEN - CRC_LEN]);
            w.write_u8(unit_id)?;
            body(&mut w)?;
            w.position()
        };
        self.seal(written)
    }

    fn seal(&mut self, written: usize) -> Result<usize, EncodeError> {
        let crc = compute(&self.buf[..written]);
        self.buf[written..written + CRC_LEN].copy_from_slice(&crc.to_be_bytes());
        self.len = written + CRC_LEN;
        Ok(self.len)
    }
}
