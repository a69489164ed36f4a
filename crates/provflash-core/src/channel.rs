//! Bridge transaction channel
//!
//! A [`Transaction`] describes one tunneled SPI operation: opcode, optional
//! address, outbound data, expected read length, and the bridge flag byte.
//! [`BridgeChannel`] is the transport seam - one implementation per framing
//! variant (bulk header+payload, control single-shot, raw 64-byte packets)
//! plus the in-memory emulator used in tests.
//!
//! The framed variants prefix every request with a 4-byte header: a 24-bit
//! little-endian read length followed by the flag byte. The flash address
//! inside the payload stays big-endian per the SPI command format.

use bitflags::bitflags;

use crate::error::{Error, Result};
use crate::spi::encode_addr;

/// Maximum outbound payload (opcode + address + data) the bridge accepts
pub const MAX_PAYLOAD: usize = 500;

/// Read lengths are carried in a 24-bit header field
pub const MAX_READ_LEN: usize = (1 << 24) - 1;

/// Minimum inbound transfer size the bridge hardware requires; shorter
/// requests still submit a buffer this large and discard the padding.
pub const MIN_IN_TRANSFER: usize = 512;

bitflags! {
    /// Flag byte of the transaction header
    ///
    /// The bridge folds common sequencing into the transaction itself:
    /// `WRITE_ENABLE` pulses WREN before the command and `STATUS_POLL`
    /// holds off the reply until the WIP bit clears afterwards. Page
    /// programs set both, which is what lets the write pipeline stream
    /// pages without interleaving separate WREN/status commands.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TxnFlags: u8 {
        /// Poll the status register after the command until WIP clears
        const STATUS_POLL = 1 << 0;
        /// Pulse Write Enable before the command
        const WRITE_ENABLE = 1 << 1;
    }
}

/// A single tunneled SPI transaction
///
/// Uses slices for data to avoid copies; the lifetime ties the transaction
/// to the image buffer it references.
pub struct Transaction<'a> {
    /// The opcode byte
    pub opcode: u8,
    /// Flash address, transmitted as 4 big-endian bytes when present
    pub address: Option<u32>,
    /// Data to write after opcode/address
    pub write_data: &'a [u8],
    /// Number of response bytes expected
    pub read_len: usize,
    /// Bridge flag byte
    pub flags: TxnFlags,
}

impl<'a> Transaction<'a> {
    /// A command with no address, data, or response (e.g. WREN)
    pub fn simple(opcode: u8) -> Self {
        Self {
            opcode,
            address: None,
            write_data: &[],
            read_len: 0,
            flags: TxnFlags::empty(),
        }
    }

    /// Read a register with no address phase (e.g. RDID, RDSR)
    pub fn read_reg(opcode: u8, read_len: usize) -> Self {
        Self {
            opcode,
            address: None,
            write_data: &[],
            read_len,
            flags: TxnFlags::empty(),
        }
    }

    /// Read memory starting at an address (e.g. READ_4B)
    pub fn read_mem(opcode: u8, address: u32, read_len: usize) -> Self {
        Self {
            opcode,
            address: Some(address),
            write_data: &[],
            read_len,
            flags: TxnFlags::empty(),
        }
    }

    /// An erase command: address, no data, no response
    pub fn erase(opcode: u8, address: u32) -> Self {
        Self {
            opcode,
            address: Some(address),
            write_data: &[],
            read_len: 0,
            flags: TxnFlags::empty(),
        }
    }

    /// A program command: address plus data payload
    pub fn program(opcode: u8, address: u32, data: &'a [u8]) -> Self {
        Self {
            opcode,
            address: Some(address),
            write_data: data,
            read_len: 0,
            flags: TxnFlags::empty(),
        }
    }

    /// Set the bridge flag byte
    pub fn with_flags(mut self, flags: TxnFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Outbound payload length: opcode + address bytes + data
    pub fn out_len(&self) -> usize {
        1 + if self.address.is_some() { 4 } else { 0 } + self.write_data.len()
    }

    /// Check transport limits
    ///
    /// Must pass before any I/O is attempted so an oversized request can
    /// never leave a partial transfer on the wire.
    pub fn validate(&self, max_payload: usize) -> Result<()> {
        let len = self.out_len();
        if len > max_payload {
            return Err(Error::TransactionTooLarge {
                len,
                max: max_payload,
            });
        }
        if self.read_len > MAX_READ_LEN {
            return Err(Error::TransactionTooLarge {
                len: self.read_len,
                max: MAX_READ_LEN,
            });
        }
        Ok(())
    }

    /// Serialize the outbound payload: opcode, big-endian address bytes,
    /// write data
    pub fn encode_payload(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.out_len());
        out.push(self.opcode);
        if let Some(addr) = self.address {
            out.extend_from_slice(&encode_addr(addr));
        }
        out.extend_from_slice(self.write_data);
        out
    }
}

/// Encode the 4-byte framing header: 24-bit little-endian read length, then
/// the flag byte
pub fn encode_header(read_len: usize, flags: TxnFlags) -> [u8; 4] {
    [
        (read_len & 0xFF) as u8,
        ((read_len >> 8) & 0xFF) as u8,
        ((read_len >> 16) & 0xFF) as u8,
        flags.bits(),
    ]
}

/// Validate a transaction and serialize header plus payload, as sent by the
/// framed (bulk and control) variants in a single outbound transfer
pub fn encode_request(txn: &Transaction<'_>, max_payload: usize) -> Result<Vec<u8>> {
    txn.validate(max_payload)?;
    let mut out = Vec::with_capacity(4 + txn.out_len());
    out.extend_from_slice(&encode_header(txn.read_len, txn.flags));
    out.extend_from_slice(&txn.encode_payload());
    Ok(out)
}

/// Transport strategy for one bridge framing variant
pub trait BridgeChannel {
    /// Largest outbound payload a single transaction may carry
    fn max_payload(&self) -> usize {
        MAX_PAYLOAD
    }

    /// Execute one transaction
    ///
    /// Exactly one outbound transfer and at most one inbound transfer per
    /// call; returns exactly `read_len` bytes with any hardware padding
    /// discarded. No implicit retries - a failed transfer surfaces as
    /// [`Error::Transport`].
    fn transact(&mut self, txn: &Transaction<'_>) -> Result<Vec<u8>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spi::opcodes;

    #[test]
    fn test_header_is_little_endian() {
        assert_eq!(encode_header(0, TxnFlags::empty()), [0, 0, 0, 0]);
        assert_eq!(encode_header(3, TxnFlags::empty()), [3, 0, 0, 0]);
        assert_eq!(
            encode_header(0x0102_03, TxnFlags::STATUS_POLL),
            [0x03, 0x02, 0x01, 0x01]
        );
        assert_eq!(
            encode_header(512, TxnFlags::STATUS_POLL | TxnFlags::WRITE_ENABLE),
            [0x00, 0x02, 0x00, 0x03]
        );
    }

    #[test]
    fn test_payload_layout() {
        let data = [0xAA, 0xBB];
        let txn = Transaction::program(opcodes::PP_4B, 0x0102_0304, &data);
        assert_eq!(
            txn.encode_payload(),
            vec![0x12, 0x01, 0x02, 0x03, 0x04, 0xAA, 0xBB]
        );

        let txn = Transaction::read_reg(opcodes::RDID, 3);
        assert_eq!(txn.encode_payload(), vec![0x9F]);
    }

    #[test]
    fn test_outbound_size_boundary() {
        // 1 opcode + 4 address + 495 data = 500: the largest legal payload
        let data = vec![0u8; 495];
        let txn = Transaction::program(opcodes::PP_4B, 0, &data);
        assert_eq!(txn.out_len(), 500);
        assert!(txn.validate(MAX_PAYLOAD).is_ok());

        let data = vec![0u8; 496];
        let txn = Transaction::program(opcodes::PP_4B, 0, &data);
        assert_eq!(txn.out_len(), 501);
        assert!(matches!(
            txn.validate(MAX_PAYLOAD),
            Err(Error::TransactionTooLarge { len: 501, max: 500 })
        ));
    }

    #[test]
    fn test_read_len_boundary() {
        let txn = Transaction::read_reg(opcodes::RDSR, MAX_READ_LEN);
        assert!(txn.validate(MAX_PAYLOAD).is_ok());

        let txn = Transaction::read_reg(opcodes::RDSR, 1 << 24);
        assert!(matches!(
            txn.validate(MAX_PAYLOAD),
            Err(Error::TransactionTooLarge {
                len: 0x100_0000,
                ..
            })
        ));
    }

    #[test]
    fn test_encode_request_rejects_before_framing() {
        let data = vec![0u8; 496];
        let txn = Transaction::program(opcodes::PP_4B, 0, &data);
        assert!(encode_request(&txn, MAX_PAYLOAD).is_err());

        let txn = Transaction::read_mem(opcodes::READ_4B, 0x4_0000, 16);
        let req = encode_request(&txn, MAX_PAYLOAD).unwrap();
        assert_eq!(&req[..4], &[16, 0, 0, 0]);
        assert_eq!(&req[4..], &[0x13, 0x00, 0x04, 0x00, 0x00]);
    }
}
