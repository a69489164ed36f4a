//! SPI flash wire formats
//!
//! Opcode table and address encoding for the chip behind the bridge. The
//! 4-byte big-endian address here is independent of the little-endian
//! length field in the USB framing header; see [`crate::channel`].

pub mod address;
pub mod opcodes;

pub use address::{decode_addr, encode_addr};
