//! provflash - USB SPI-flash provisioning tool
//!
//! Personalizes and provisions the SPI flash of a USB-attached board
//! through the board's USB↔SPI bridge: JEDEC identity check, full chip
//! erase, bootloader + factory block + firmware writes at fixed offsets,
//! then a reset into the new firmware.
//!
//! # Architecture
//!
//! The flash command set in `provflash-core` is written against a single
//! `BridgeChannel` transport seam. The three USB framing generations found
//! in the field (bulk header+payload, framed control transfers, raw 64-byte
//! packets) live behind that seam in `provflash-usb`, selected by the
//! `--programmer` option, and an in-memory emulator (`provflash-dummy`)
//! rides along for hardware-free runs and tests.

mod cli;
mod commands;
mod programmers;

use clap::Parser;
use cli::{Cli, Commands};
use programmers::Bridge;
use provflash_core::provision::ProvisionConfig;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    match cli.command {
        Commands::Provision {
            device,
            boot,
            firmware,
            boot_offset,
            factory_offset,
            firmware_offset,
        } => {
            let config = ProvisionConfig {
                boot_offset,
                factory_offset,
                firmware_offset,
                ..ProvisionConfig::default()
            };
            let mut bridge = Bridge::open(&device.programmer, device.serial.as_deref())?;
            commands::flash::run_provision(&mut bridge, &boot, &firmware, &config)
        }
        Commands::Probe { device } => {
            let mut bridge = Bridge::open(&device.programmer, device.serial.as_deref())?;
            commands::flash::run_probe(&mut bridge, &ProvisionConfig::default())
        }
        Commands::Read {
            device,
            output,
            addr,
            length,
        } => {
            let config = ProvisionConfig::default();
            let remaining = config.chip.total_size.saturating_sub(addr as usize);
            let length = match length {
                Some(len) => len as usize,
                None => remaining,
            };
            let mut bridge = Bridge::open(&device.programmer, device.serial.as_deref())?;
            commands::flash::run_read(&mut bridge, &output, addr, length)
        }
        Commands::Erase { device } => {
            let mut bridge = Bridge::open(&device.programmer, device.serial.as_deref())?;
            commands::flash::run_erase(&mut bridge, &ProvisionConfig::default())
        }
        Commands::Write {
            device,
            input,
            addr,
        } => {
            let mut bridge = Bridge::open(&device.programmer, device.serial.as_deref())?;
            commands::flash::run_write(&mut bridge, &input, addr, &ProvisionConfig::default())
        }
        Commands::Reset { device, dfu } => {
            let mut bridge = Bridge::open(&device.programmer, device.serial.as_deref())?;
            commands::flash::run_reset(&mut bridge, dfu)
        }
        Commands::ListProgrammers => {
            commands::list_programmers();
            Ok(())
        }
    }
}
