//! Error types for provflash-core

use std::time::Duration;

use thiserror::Error;

/// Core error type
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Outbound payload or requested read length exceeds the transport's
    /// per-transaction limits; raised before any transfer is attempted
    #[error("transaction too large: {len} exceeds the {max} byte limit")]
    TransactionTooLarge {
        /// Offending length (outbound payload or requested read)
        len: usize,
        /// The limit it ran into
        max: usize,
    },

    /// JEDEC ID did not match the configured chip profile
    #[error(
        "chip ID mismatch: expected {expected:02X?}, read {found:02X?} (flash communication error?)"
    )]
    ChipIdMismatch {
        /// ID from the chip profile
        expected: [u8; 3],
        /// ID actually read
        found: [u8; 3],
    },

    /// The WIP bit never cleared within the polling budget
    #[error("flash timeout: write-in-progress still set after {elapsed:?}")]
    FlashTimeout {
        /// How long the poller waited
        elapsed: Duration,
    },

    /// Underlying USB transfer failed
    #[error("transport error: {0}")]
    Transport(String),

    /// Device returned fewer bytes than the transaction requested
    #[error("short response: expected {expected} bytes, got {got}")]
    ShortResponse {
        /// Bytes requested
        expected: usize,
        /// Bytes received
        got: usize,
    },

    /// Two images in the provisioning plan occupy overlapping ranges
    #[error("image at 0x{offset:08X} ({len} bytes) overlaps the image at 0x{next:08X}")]
    ImageOverlap {
        /// Offset of the earlier image
        offset: u32,
        /// Its length
        len: usize,
        /// Offset of the image it runs into
        next: u32,
    },

    /// An image extends past the end of the flash
    #[error("image at 0x{offset:08X} ({len} bytes) exceeds the {size} byte flash")]
    ImageOutOfBounds {
        /// Image offset
        offset: u32,
        /// Image length
        len: usize,
        /// Flash size from the chip profile
        size: usize,
    },
}

/// Result type alias using the core Error type
pub type Result<T> = std::result::Result<T, Error>;
