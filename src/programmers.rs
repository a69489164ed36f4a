//! Bridge registration and dispatch
//!
//! One enum over the compiled-in backends, so command implementations work
//! with any of them without generics at the CLI boundary.

use provflash_core::channel::{BridgeChannel, Transaction};
use provflash_core::error::Result as CoreResult;
use provflash_core::provision::BoardControl;
use provflash_usb::{BridgeVariant, UsbBridge, UsbBridgeConfig};

/// Information about a programmer backend
pub struct ProgrammerInfo {
    /// Primary name (used for matching)
    pub name: &'static str,
    /// Short description
    pub description: &'static str,
}

/// All programmer backends enabled at compile time
#[allow(unused_mut)]
pub fn available_programmers() -> Vec<ProgrammerInfo> {
    let mut programmers = vec![
        ProgrammerInfo {
            name: "bulk",
            description: "USB bridge, header+payload bulk framing (current firmware)",
        },
        ProgrammerInfo {
            name: "control",
            description: "USB bridge, framed vendor control transfers",
        },
        ProgrammerInfo {
            name: "packet",
            description: "USB bridge, raw 64-byte packet framing (oldest firmware)",
        },
    ];

    #[cfg(feature = "dummy")]
    programmers.push(ProgrammerInfo {
        name: "dummy",
        description: "In-memory bridge emulator for testing",
    });

    programmers
}

/// Comma-separated backend names for CLI help
pub fn programmer_names_short() -> String {
    available_programmers()
        .iter()
        .map(|p| p.name)
        .collect::<Vec<_>>()
        .join(", ")
}

/// An open bridge, whichever backend it is
pub enum Bridge {
    /// Real hardware over USB
    Usb(UsbBridge),
    /// In-memory emulator
    #[cfg(feature = "dummy")]
    Dummy(provflash_dummy::DummyBridge),
}

impl Bridge {
    /// Open the backend selected by name
    pub fn open(name: &str, serial: Option<&str>) -> Result<Self, Box<dyn std::error::Error>> {
        match name {
            "bulk" | "control" | "packet" => {
                let config = UsbBridgeConfig {
                    serial: serial.map(str::to_string),
                    variant: name.parse::<BridgeVariant>()?,
                };
                Ok(Bridge::Usb(UsbBridge::open_with_config(&config)?))
            }
            #[cfg(feature = "dummy")]
            "dummy" => Ok(Bridge::Dummy(provflash_dummy::DummyBridge::new_default())),
            other => Err(format!(
                "unknown programmer: {} (available: {})",
                other,
                programmer_names_short()
            )
            .into()),
        }
    }

    /// Board reset, or DFU reboot when requested
    pub fn reset(&mut self, dfu: bool) -> Result<(), Box<dyn std::error::Error>> {
        match self {
            Bridge::Usb(b) => {
                if dfu {
                    b.boot_dfu()?;
                } else {
                    b.reset()?;
                }
                Ok(())
            }
            #[cfg(feature = "dummy")]
            Bridge::Dummy(b) => {
                b.reset_board()?;
                Ok(())
            }
        }
    }
}

impl BridgeChannel for Bridge {
    fn transact(&mut self, txn: &Transaction<'_>) -> CoreResult<Vec<u8>> {
        match self {
            Bridge::Usb(b) => b.transact(txn),
            #[cfg(feature = "dummy")]
            Bridge::Dummy(b) => b.transact(txn),
        }
    }
}

impl BoardControl for Bridge {
    fn reset_board(&mut self) -> CoreResult<()> {
        match self {
            Bridge::Usb(b) => b.reset_board(),
            #[cfg(feature = "dummy")]
            Bridge::Dummy(b) => b.reset_board(),
        }
    }
}
