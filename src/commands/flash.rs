//! Flash command implementations

use indicatif::{ProgressBar, ProgressStyle};
use provflash_core::factory::format_mac;
use provflash_core::operations::{self, WriteProgress};
use provflash_core::protocol;
use provflash_core::provision::{self, ProvisionConfig};
use rand::RngCore;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

use crate::programmers::Bridge;

/// Transfer chunk for reads (4 KiB)
const READ_CHUNK_SIZE: usize = 4096;

type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Read file contents into a Vec
fn read_file(path: &Path) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let mut file = File::open(path)?;
    let mut data = Vec::new();
    file.read_to_end(&mut data)?;
    println!("Read {} bytes from {:?}", data.len(), path);
    Ok(data)
}

/// Create a standard progress bar style
fn create_progress_bar_style() -> Result<ProgressStyle, Box<dyn std::error::Error>> {
    Ok(ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta}) {msg}")?
        .progress_chars("#>-"))
}

/// Progress reporter using indicatif progress bars
pub struct IndicatifProgress {
    current_bar: Option<ProgressBar>,
}

impl IndicatifProgress {
    pub fn new() -> Self {
        Self { current_bar: None }
    }
}

impl Default for IndicatifProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl WriteProgress for IndicatifProgress {
    fn writing(&mut self, base: u32, total_bytes: usize) {
        let pb = ProgressBar::new(total_bytes as u64);
        pb.set_style(
            create_progress_bar_style().unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        pb.set_message(format!("@ 0x{:08X}", base));
        self.current_bar = Some(pb);
    }

    fn write_progress(&mut self, bytes_written: usize) {
        if let Some(pb) = &self.current_bar {
            pb.set_position(bytes_written as u64);
        }
    }

    fn complete(&mut self, elapsed: Duration) {
        if let Some(pb) = self.current_bar.take() {
            pb.finish_with_message(format!("done in {:.2}s", elapsed.as_secs_f64()));
        }
    }
}

/// Run the provision command
pub fn run_provision(
    bridge: &mut Bridge,
    boot_path: &Path,
    firmware_path: &Path,
    config: &ProvisionConfig,
) -> CmdResult {
    let boot = read_file(boot_path)?;
    let firmware = read_file(firmware_path)?;

    // fresh device-unique bytes per run; both MACs share them
    let mut uid = [0u8; 4];
    rand::rng().fill_bytes(&mut uid);

    let mut progress = IndicatifProgress::new();
    let report = provision::provision(bridge, &boot, &firmware, config, uid, &mut progress)?;

    println!("Generated MAC addresses:");
    println!("  {}", format_mac(&report.factory.mac1()));
    println!("  {}", format_mac(&report.factory.mac2()));
    println!("Provisioned in {:.2}s", report.elapsed.as_secs_f64());
    Ok(())
}

/// Run the probe command
pub fn run_probe(bridge: &mut Bridge, config: &ProvisionConfig) -> CmdResult {
    let id = protocol::read_id(bridge)?;
    println!("JEDEC ID: {:02X} {:02X} {:02X}", id[0], id[1], id[2]);

    if id == config.chip.jedec_id {
        println!(
            "Matches expected chip: {} ({} bytes)",
            config.chip.name, config.chip.total_size
        );
    } else {
        println!(
            "Does not match the expected {:02X?} ({})",
            config.chip.jedec_id, config.chip.name
        );
    }
    Ok(())
}

/// Run the read command
pub fn run_read(bridge: &mut Bridge, output: &Path, addr: u32, length: usize) -> CmdResult {
    let mut data = vec![0u8; length];

    let pb = ProgressBar::new(length as u64);
    pb.set_style(create_progress_bar_style()?);

    let mut offset = 0usize;
    while offset < length {
        let chunk_len = READ_CHUNK_SIZE.min(length - offset);
        protocol::read(
            bridge,
            addr + offset as u32,
            &mut data[offset..offset + chunk_len],
        )?;
        offset += chunk_len;
        pb.set_position(offset as u64);
    }
    pb.finish_with_message("Read complete");

    let mut file = File::create(output)?;
    file.write_all(&data)?;
    println!("Wrote {} bytes to {:?}", data.len(), output);
    Ok(())
}

/// Run the erase command
pub fn run_erase(bridge: &mut Bridge, config: &ProvisionConfig) -> CmdResult {
    protocol::check_id(bridge, &config.chip)?;
    protocol::chip_erase(bridge, &config.erase_poll)?;
    println!("Erase complete");
    Ok(())
}

/// Run the write command
pub fn run_write(
    bridge: &mut Bridge,
    input: &Path,
    addr: u32,
    config: &ProvisionConfig,
) -> CmdResult {
    let data = read_file(input)?;
    let mut progress = IndicatifProgress::new();
    operations::write_image(bridge, addr, &data, &config.page_poll, &mut progress)?;
    Ok(())
}

/// Run the reset command
pub fn run_reset(bridge: &mut Bridge, dfu: bool) -> CmdResult {
    if dfu {
        println!("Rebooting into the DFU bootloader...");
    } else {
        println!("Rebooting device...");
    }
    bridge.reset(dfu)
}
