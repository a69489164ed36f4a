//! provflash-usb - USB↔SPI bridge device support
//!
//! The board's coprocessor tunnels SPI flash commands over USB. This crate
//! finds the device, claims the flash interface, and implements the
//! [`provflash_core::channel::BridgeChannel`] transport seam for the three
//! framing generations found in the field:
//!
//! - **Bulk**: 4-byte header (little-endian 24-bit read length + flag
//!   byte) and payload on one bulk OUT transfer; response on one bulk IN
//!   transfer of at least 512 bytes.
//! - **Control**: the same framed request carried in a single vendor
//!   control transfer pair.
//! - **Packet**: raw 64-byte packetization with no header. Each OUT packet
//!   is shifted through the SPI bus full-duplex and the MISO bytes echo
//!   back on IN; chip select is held across full packets and released on a
//!   short one, so exact multiples of 64 need a zero-length flush packet.
//!
//! The variant is selected by configuration; the flash command set in
//! provflash-core is identical across all three.
//!
//! Board control (reset into the freshly written firmware, reboot to the
//! DFU bootloader) goes over vendor control requests on the same device.
//!
//! # Example
//!
//! ```no_run
//! use provflash_usb::{UsbBridge, UsbBridgeConfig, BridgeVariant};
//! use provflash_core::protocol;
//!
//! let config = UsbBridgeConfig {
//!     serial: None,
//!     variant: BridgeVariant::Bulk,
//! };
//! let mut bridge = UsbBridge::open_with_config(&config)?;
//!
//! let id = protocol::read_id(&mut bridge)?;
//! println!("JEDEC ID: {:02X} {:02X} {:02X}", id[0], id[1], id[2]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod device;
mod error;
mod protocol;

pub use device::{UsbBridge, UsbBridgeConfig};
pub use error::{Result, UsbBridgeError};
pub use protocol::BridgeVariant;
