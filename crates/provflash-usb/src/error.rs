//! Error types for the USB bridge

use thiserror::Error;

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, UsbBridgeError>;

/// Errors that can occur when using the USB bridge
#[derive(Debug, Error)]
pub enum UsbBridgeError {
    /// No matching device on the bus
    #[error("bridge device not found (VID:1209 PID:7551)")]
    DeviceNotFound,

    /// Several matching devices and no serial filter to pick one
    #[error("multiple bridge devices found ({0}), specify a serial number")]
    MultipleDevicesFound(usize),

    /// Failed to open the device
    #[error("failed to open bridge device: {0}")]
    OpenFailed(String),

    /// Failed to claim the flash interface or activate its alt setting
    #[error("failed to claim flash interface: {0}")]
    ClaimFailed(String),

    /// USB transfer failed
    #[error("USB transfer failed: {0}")]
    TransferFailed(String),

    /// Device replied with an unexpected transfer length
    #[error("invalid response from bridge: {0}")]
    InvalidResponse(String),

    /// Unknown framing variant name
    #[error("unknown framing variant: {0} (expected bulk, control, or packet)")]
    UnknownVariant(String),

    /// Core library error
    #[error("core error: {0}")]
    Core(#[from] provflash_core::Error),
}

impl From<nusb::Error> for UsbBridgeError {
    fn from(e: nusb::Error) -> Self {
        UsbBridgeError::TransferFailed(e.to_string())
    }
}
