//! Fixed-capacity register map served by a slave.
//!
//! The map holds four independently addressed regions. Every accessor checks
//! `address + count <= capacity` before touching storage, so a malformed
//! request can never reach past the end of a region.

use core::ops::Range;

use crate::RegisterError;

pub const INPUT_REGISTER_COUNT: usize = 16;
pub const HOLDING_REGISTER_COUNT: usize = 16;
pub const DISCRETE_INPUT_COUNT: usize = 16;
pub const COIL_COUNT: usize = 16;

const _: () = assert!(DISCRETE_INPUT_COUNT % 16 == 0);
const _: () = assert!(COIL_COUNT % 16 == 0);

pub const DISCRETE_INPUT_WORDS: usize = DISCRETE_INPUT_COUNT / 16;
pub const COIL_WORDS: usize = COIL_COUNT / 16;

fn checked_range(address: u16, count: usize, capacity: usize) -> Result<Range<usize>, RegisterError> {
    let start = usize::from(address);
    let out_of_range = RegisterError::AddressOutOfRange {
        address,
        count,
        capacity,
    };
    let end = start.checked_add(count).ok_or(out_of_range)?;
    if end > capacity {
        return Err(out_of_range);
    }
    Ok(start..end)
}

/// Bit storage packed 16 per word, LSB first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitBank<const WORDS: usize> {
    words: [u16; WORDS],
}

impl<const WORDS: usize> Default for BitBank<WORDS> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const WORDS: usize> BitBank<WORDS> {
    pub const CAPACITY: usize = WORDS * 16;

    pub const fn new() -> Self {
        Self { words: [0; WORDS] }
    }

    pub const fn capacity(&self) -> usize {
        Self::CAPACITY
    }

    pub fn check_range(&self, address: u16, count: usize) -> Result<(), RegisterError> {
        checked_range(address, count, Self::CAPACITY).map(|_| ())
    }

    pub fn get(&self, address: u16) -> Result<bool, RegisterError> {
        let index = checked_range(address, 1, Self::CAPACITY)?.start;
        Ok(self.words[index / 16] & (1 << (index % 16)) != 0)
    }

    pub fn set(&mut self, address: u16, value: bool) -> Result<(), RegisterError> {
        let index = checked_range(address, 1, Self::CAPACITY)?.start;
        let mask = 1u16 << (index % 16);
        if value {
            self.words[index / 16] |= mask;
        } else {
            self.words[index / 16] &= !mask;
        }
        Ok(())
    }

    /// Copies `dst.len()` bits starting at `address` into `dst`.
    pub fn read(&self, address: u16, dst: &mut [bool]) -> Result<(), RegisterError> {
        if dst.is_empty() {
            return Err(RegisterError::InvalidReference);
        }
        let range = checked_range(address, dst.len(), Self::CAPACITY)?;
        for (slot, index) in dst.iter_mut().zip(range) {
            *slot = self.words[index / 16] & (1 << (index % 16)) != 0;
        }
        Ok(())
    }

    /// Stores `src` starting at `address`. Nothing is written when the range is invalid.
    pub fn write(&mut self, address: u16, src: &[bool]) -> Result<(), RegisterError> {
        if src.is_empty() {
            return Err(RegisterError::InvalidReference);
        }
        let range = checked_range(address, src.len(), Self::CAPACITY)?;
        for (value, index) in src.iter().zip(range) {
            let mask = 1u16 << (index % 16);
            if *value {
                self.words[index / 16] |= mask;
            } else {
                self.words[index / 16] &= !mask;
            }
        }
        Ok(())
    }

    pub fn words(&self) -> &[u16; WORDS] {
        &self.words
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterBank<const N: usize> {
    values: [u16; N],
}

impl<const N: usize> Default for RegisterBank<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> RegisterBank<N> {
    pub const CAPACITY: usize = N;

    pub const fn new() -> Self {
        Self { values: [0; N] }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn check_range(&self, address: u16, count: usize) -> Result<(), RegisterError> {
        checked_range(address, count, N).map(|_| ())
    }

    pub fn get(&self, address: u16) -> Result<u16, RegisterError> {
        let index = checked_range(address, 1, N)?.start;
        Ok(self.values[index])
    }

    pub fn set(&mut self, address: u16, value: u16) -> Result<(), RegisterError> {
        let index = checked_range(address, 1, N)?.start;
        self.values[index] = value;
        Ok(())
    }

    pub fn read(&self, address: u16, dst: &mut [u16]) -> Result<(), RegisterError> {
        if dst.is_empty() {
            return Err(RegisterError::InvalidReference);
        }
        let range = checked_range(address, dst.len(), N)?;
        dst.copy_from_slice(&self.values[range]);
        Ok(())
    }

    pub fn write(&mut self, address: u16, src: &[u16]) -> Result<(), RegisterError> {
        if src.is_empty() {
            return Err(RegisterError::InvalidReference);
        }
        let range = checked_range(address, src.len(), N)?;
        self.values[range].copy_from_slice(src);
        Ok(())
    }

    pub fn as_slice(&self) -> &[u16] {
        &self.values
    }
}

/// The four regions a slave exposes.
///
/// Discrete inputs and input registers are read-only from the bus; the host
/// application updates them through the `_mut` accessors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterMap {
    input_registers: RegisterBank<INPUT_REGISTER_COUNT>,
    holding_registers: RegisterBank<HOLDING_REGISTER_COUNT>,
    discrete_inputs: BitBank<DISCRETE_INPUT_WORDS>,
    coils: BitBank<COIL_WORDS>,
}

impl RegisterMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input_registers(&self) -> &RegisterBank<INPUT_REGISTER_COUNT> {
        &self.input_registers
    }

    pub fn input_registers_mut(&mut self) -> &mut RegisterBank<INPUT_REGISTER_COUNT> {
        &mut self.input_registers
    }

    pub fn holding_registers(&self) -> &RegisterBank<HOLDING_REGISTER_COUNT> {
        &self.holding_registers
    }

    pub fn holding_registers_mut(&mut self) -> &mut RegisterBank<HOLDING_REGISTER_COUNT> {
        &mut self.holding_registers
    }

    pub fn discrete_inputs(&self) -> &BitBank<DISCRETE_INPUT_WORDS> {
        &self.discrete_inputs
    }

    pub fn discrete_inputs_mut(&mut self) -> &mut BitBank<DISCRETE_INPUT_WORDS> {
        &mut self.discrete_inputs
    }

    pub fn coils(&self) -> &BitBank<COIL_WORDS> {
        &self.coils
    }

    pub fn coils_mut(&mut self) -> &mut BitBank<COIL_WORDS> {
        &mut self.coils
    }
}

#[cfg(test)]
mod tests {
    use super::{BitBank, RegisterBank, RegisterMap, COIL_COUNT, HOLDING_REGISTER_COUNT};
    use crate::RegisterError;

    #[test]
    fn capacities_match_constants() {
        let map = RegisterMap::new();
        assert_eq!(map.coils().capacity(), COIL_COUNT);
        assert_eq!(map.holding_registers().capacity(), HOLDING_REGISTER_COUNT);
    }

    #[test]
    fn bits_pack_lsb_first() {
        let mut bank = BitBank::<2>::new();
        bank.set(0, true).unwrap();
        bank.set(3, true).unwrap();
        bank.set(17, true).unwrap();
        assert_eq!(bank.words(), &[0b1001, 0b10]);
        bank.set(3, false).unwrap();
        assert_eq!(bank.words(), &[0b0001, 0b10]);
        assert!(bank.get(17).unwrap());
        assert!(!bank.get(16).unwrap());
    }

    #[test]
    fn last_slot_is_addressable() {
        let mut bank = RegisterBank::<16>::new();
        bank.set(15, 0xBEEF).unwrap();
        assert_eq!(bank.get(15).unwrap(), 0xBEEF);
        bank.check_range(0, 16).unwrap();
    }

    #[test]
    fn range_past_capacity_is_rejected() {
        let mut bank = RegisterBank::<16>::new();
        assert_eq!(
            bank.set(16, 1).unwrap_err(),
            RegisterError::AddressOutOfRange {
                address: 16,
                count: 1,
                capacity: 16
            }
        );
        let mut dst = [0u16; 2];
        assert!(matches!(
            bank.read(15, &mut dst),
            Err(RegisterError::AddressOutOfRange { .. })
        ));
        assert!(bank.check_range(u16::MAX, 1).is_err());
    }

    #[test]
    fn failed_write_leaves_storage_untouched() {
        let mut bank = RegisterBank::<16>::new();
        assert!(bank.write(14, &[1, 2, 3]).is_err());
        assert!(bank.as_slice().iter().all(|v| *v == 0));

        let mut bits = BitBank::<1>::new();
        assert!(bits.write(15, &[true, true]).is_err());
        assert_eq!(bits.words(), &[0]);
    }

    #[test]
    fn empty_buffers_are_invalid_references() {
        let mut bank = RegisterBank::<16>::new();
        assert_eq!(bank.read(0, &mut []).unwrap_err(), RegisterError::InvalidReference);
        assert_eq!(bank.write(0, &[]).unwrap_err(), RegisterError::InvalidReference);

        let mut bits = BitBank::<1>::new();
        assert_eq!(bits.read(0, &mut []).unwrap_err(), RegisterError::InvalidReference);
        assert_eq!(bits.write(0, &[]).unwrap_err(), RegisterError::InvalidReference);
    }

    #[test]
    fn bulk_bit_access() {
        let mut bits = BitBank::<1>::new();
        bits.write(4, &[true, false, true]).unwrap();
        let mut out = [false; 4];
        bits.read(3, &mut out).unwrap();
        assert_eq!(out, [false, true, false, true]);
    }
}
