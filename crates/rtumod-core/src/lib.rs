//! Modbus RTU primitives in pure Rust.
//!
//! `rtumod-core` provides the CRC16 codec, a fixed-capacity RTU frame buffer,
//! request/answer encoding for the eight supported function codes and the
//! four-region register map served by a slave. Everything here is
//! allocation-free and `no_std`-compatible.

#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]

#[cfg(feature = "std")]
extern crate std;

pub mod encoding;
pub mod error;
pub mod frame;
pub mod pdu;
pub mod registers;

pub use error::{DecodeError, EncodeError, RegisterError};
pub use frame::rtu::{Frame, MAX_FRAME_LEN};
pub use registers::RegisterMap;
