//! CLI argument parsing

use crate::programmers;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Parse a string as a hex or decimal u32
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

/// Generate dynamic help text for the programmer argument
fn programmer_help() -> String {
    format!(
        "Programmer to use [available: {}]",
        programmers::programmer_names_short()
    )
}

#[derive(Parser)]
#[command(name = "provflash")]
#[command(author, version, about = "USB SPI-flash provisioning tool", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Device selection shared across commands
#[derive(clap::Args, Debug, Clone)]
pub struct DeviceArgs {
    /// Programmer to use
    #[arg(short, long, default_value = "bulk", help = programmer_help())]
    pub programmer: String,

    /// USB serial number to match when several boards are attached
    #[arg(long)]
    pub serial: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Provision a board: identity check, chip erase, bootloader + factory
    /// block + firmware writes, reset
    Provision {
        #[command(flatten)]
        device: DeviceArgs,

        /// Bootloader image path
        #[arg(long)]
        boot: PathBuf,

        /// Firmware image path
        #[arg(long)]
        firmware: PathBuf,

        /// Bootloader destination offset
        #[arg(long, value_parser = parse_hex_u32, default_value = "0x0")]
        boot_offset: u32,

        /// Factory block destination offset
        #[arg(long, value_parser = parse_hex_u32, default_value = "0x40000")]
        factory_offset: u32,

        /// Firmware destination offset
        #[arg(long, value_parser = parse_hex_u32, default_value = "0x50000")]
        firmware_offset: u32,
    },

    /// Probe the flash chip and check its JEDEC ID
    Probe {
        #[command(flatten)]
        device: DeviceArgs,
    },

    /// Read a flash region to a file
    Read {
        #[command(flatten)]
        device: DeviceArgs,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Start address (hex or decimal)
        #[arg(long, value_parser = parse_hex_u32, default_value = "0x0")]
        addr: u32,

        /// Number of bytes to read (defaults to the rest of the chip)
        #[arg(long, value_parser = parse_hex_u32)]
        length: Option<u32>,
    },

    /// Erase the entire flash chip
    Erase {
        #[command(flatten)]
        device: DeviceArgs,
    },

    /// Write a single image at an offset (no erase; the target region must
    /// already be blank)
    Write {
        #[command(flatten)]
        device: DeviceArgs,

        /// Input file path
        #[arg(short, long)]
        input: PathBuf,

        /// Destination offset
        #[arg(long, value_parser = parse_hex_u32, default_value = "0x0")]
        addr: u32,
    },

    /// Reset the board into its flashed firmware
    Reset {
        #[command(flatten)]
        device: DeviceArgs,

        /// Reboot the coprocessor into its DFU bootloader instead
        #[arg(long)]
        dfu: bool,
    },

    /// List supported programmers
    ListProgrammers,
}
