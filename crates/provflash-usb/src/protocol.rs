//! Bridge USB protocol constants and types
//!
//! The flash tunnel lives on interface 0, alternate setting 1, as one
//! IN/OUT bulk endpoint pair. Board control uses vendor control requests
//! at the device level.

use std::fmt;
use std::str::FromStr;

use crate::error::UsbBridgeError;

// USB device identifiers
pub const BRIDGE_USB_VENDOR: u16 = 0x1209;
pub const BRIDGE_USB_PRODUCT: u16 = 0x7551;

// Flash tunnel interface
pub const FLASH_INTERFACE: u8 = 0;
pub const FLASH_ALT_SETTING: u8 = 1;

// Vendor control requests
/// Drive the SoC reset line; wValue 0 = assert (low), 1 = release (high)
pub const REQ_RESET: u8 = 0x10;
/// Framed flash transaction (control framing variant only)
pub const REQ_FLASH_TXN: u8 = 0x20;
/// Reboot the coprocessor into its DFU bootloader
pub const REQ_BOOT: u8 = 0xBB;

/// Packet size of the raw framing variant
pub const PACKET_SIZE: usize = 64;

/// Cap on emulated WIP polls in the raw framing variant, which has no
/// STATUS_POLL flag on the wire
pub const PACKET_POLL_CAP: u32 = 10_000;

/// Framing variant the device firmware speaks
///
/// Three incompatible generations exist in the field; the variant is
/// configuration, selected per device, and everything above the channel is
/// identical across them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BridgeVariant {
    /// 4-byte header + payload on bulk endpoints (current firmware)
    #[default]
    Bulk,
    /// Same framed request over vendor control transfers
    Control,
    /// Raw 64-byte packetization, no header (oldest firmware)
    Packet,
}

impl fmt::Display for BridgeVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeVariant::Bulk => write!(f, "bulk"),
            BridgeVariant::Control => write!(f, "control"),
            BridgeVariant::Packet => write!(f, "packet"),
        }
    }
}

impl FromStr for BridgeVariant {
    type Err = UsbBridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bulk" => Ok(BridgeVariant::Bulk),
            "control" | "ctrl" => Ok(BridgeVariant::Control),
            "packet" | "packet64" => Ok(BridgeVariant::Packet),
            other => Err(UsbBridgeError::UnknownVariant(other.to_string())),
        }
    }
}

/// OUT packet lengths for shifting `len` bytes in the raw framing variant
///
/// The bridge holds chip select across full 64-byte packets and releases it
/// when a packet comes up short, so a shift that is an exact multiple of the
/// packet size ends with a zero-length flush packet.
pub fn packet_lengths(len: usize) -> Vec<usize> {
    let mut lengths = Vec::with_capacity(len / PACKET_SIZE + 1);
    let mut remaining = len;
    loop {
        let chunk = remaining.min(PACKET_SIZE);
        lengths.push(chunk);
        remaining -= chunk;
        if chunk < PACKET_SIZE {
            break;
        }
    }
    lengths
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_lengths_short_shift() {
        assert_eq!(packet_lengths(1), vec![1]);
        assert_eq!(packet_lengths(63), vec![63]);
    }

    #[test]
    fn test_packet_lengths_flush_on_exact_multiple() {
        assert_eq!(packet_lengths(64), vec![64, 0]);
        assert_eq!(packet_lengths(128), vec![64, 64, 0]);
    }

    #[test]
    fn test_packet_lengths_remainder() {
        assert_eq!(packet_lengths(65), vec![64, 1]);
        assert_eq!(packet_lengths(261), vec![64, 64, 64, 64, 5]);
    }

    #[test]
    fn test_variant_parsing() {
        assert_eq!("bulk".parse::<BridgeVariant>().unwrap(), BridgeVariant::Bulk);
        assert_eq!(
            "CTRL".parse::<BridgeVariant>().unwrap(),
            BridgeVariant::Control
        );
        assert_eq!(
            "packet64".parse::<BridgeVariant>().unwrap(),
            BridgeVariant::Packet
        );
        assert!("serprog".parse::<BridgeVariant>().is_err());
    }
}
