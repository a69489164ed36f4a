//! provflash-core - Core engine for USB SPI-flash provisioning
//!
//! This crate implements the flash-programming engine for boards whose SPI
//! flash is reached through a USB↔SPI bridge: the tunneled transaction
//! protocol, the flash command set, the write-in-progress poller, the
//! page-write pipeline, the factory personalization block, and the
//! provisioning orchestrator that sequences them.
//!
//! Transport is pluggable: anything implementing [`channel::BridgeChannel`]
//! can carry transactions, which is how the three historical USB framings
//! (bulk header+payload, control single-shot, raw 64-byte packets) and the
//! in-memory test emulator all share one command set.
//!
//! # Example
//!
//! ```ignore
//! use provflash_core::{protocol, provision};
//!
//! fn identify<C: provflash_core::channel::BridgeChannel>(ch: &mut C) {
//!     match protocol::read_id(ch) {
//!         Ok(id) => println!("JEDEC ID: {:02X} {:02X} {:02X}", id[0], id[1], id[2]),
//!         Err(e) => println!("Probe failed: {}", e),
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod channel;
pub mod chip;
pub mod error;
pub mod factory;
pub mod operations;
pub mod protocol;
pub mod provision;
pub mod spi;

pub use error::{Error, Result};
