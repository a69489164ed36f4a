//! Provisioning orchestrator
//!
//! Sequences identity check, chip erase, the three image writes, and the
//! board reset. The identity check runs strictly before the erase so a
//! miswired board is never wiped. There is no partial-success recovery: a
//! failed run leaves the flash indeterminate and the device must be
//! re-provisioned from scratch.

use std::fmt;
use std::time::{Duration, Instant};

use crate::channel::BridgeChannel;
use crate::chip::ChipProfile;
use crate::error::{Error, Result};
use crate::factory::{FactoryBlock, FactoryConfig};
use crate::operations::{self, WriteProgress};
use crate::protocol::{self, PollPolicy};

/// Board-level control the orchestrator needs beyond the flash tunnel
pub trait BoardControl {
    /// Reset the board so it boots the freshly written image
    fn reset_board(&mut self) -> Result<()>;
}

/// Steps of the provisioning sequence, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Plan validation, before anything touches the device
    Plan,
    /// JEDEC ID check
    Identify,
    /// Full chip erase
    Erase,
    /// Bootloader image write
    WriteBoot,
    /// Factory block write
    WriteFactory,
    /// Firmware image write
    WriteFirmware,
    /// Board reset into the new firmware
    Reset,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Plan => "plan validation",
            Step::Identify => "identify",
            Step::Erase => "chip erase",
            Step::WriteBoot => "bootloader write",
            Step::WriteFactory => "factory block write",
            Step::WriteFirmware => "firmware write",
            Step::Reset => "board reset",
        };
        f.write_str(name)
    }
}

/// A provisioning failure, tagged with the step that raised it
#[derive(Debug, thiserror::Error)]
#[error("provisioning failed during {step}: {source}")]
pub struct ProvisionError {
    /// The step that failed
    pub step: Step,
    /// The underlying error
    #[source]
    pub source: Error,
}

/// Everything board-specific about a provisioning run
#[derive(Debug, Clone)]
pub struct ProvisionConfig {
    /// Expected chip identity and geometry
    pub chip: ChipProfile,
    /// Destination offset of the bootloader image
    pub boot_offset: u32,
    /// Destination offset of the factory block
    pub factory_offset: u32,
    /// Destination offset of the firmware image
    pub firmware_offset: u32,
    /// MAC prefixes for the factory block
    pub factory: FactoryConfig,
    /// Completion policy for page writes
    pub page_poll: PollPolicy,
    /// Completion policy for the chip erase
    pub erase_poll: PollPolicy,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            chip: ChipProfile::default(),
            boot_offset: 0x0,
            factory_offset: 0x4_0000,
            firmware_offset: 0x5_0000,
            factory: FactoryConfig::default(),
            page_poll: PollPolicy::page(),
            erase_poll: PollPolicy::erase(),
        }
    }
}

/// Summary of a successful provisioning run
#[derive(Debug)]
pub struct ProvisionReport {
    /// The factory block that was written, with its generated MACs
    pub factory: FactoryBlock,
    /// Wall-clock duration of the whole sequence
    pub elapsed: Duration,
}

/// Check a write plan: regions in ascending order, non-overlapping, and
/// inside the chip
///
/// The erase covers the whole chip, so overlap between images is the only
/// way one write can clobber another.
fn validate_plan(chip: &ChipProfile, segments: &[(u32, usize)]) -> Result<()> {
    for pair in segments.windows(2) {
        let (offset, len) = pair[0];
        let (next, _) = pair[1];
        if offset as u64 + len as u64 > next as u64 {
            return Err(Error::ImageOverlap { offset, len, next });
        }
    }
    for &(offset, len) in segments {
        if offset as u64 + len as u64 > chip.total_size as u64 {
            return Err(Error::ImageOutOfBounds {
                offset,
                len,
                size: chip.total_size,
            });
        }
    }
    Ok(())
}

/// Run the full provisioning sequence
///
/// `uid` is the device-unique MAC suffix; callers draw fresh random bytes
/// per device (injected here so tests stay deterministic). Any step's
/// failure aborts the run immediately with the step recorded in the error.
pub fn provision<B, P>(
    bridge: &mut B,
    boot: &[u8],
    firmware: &[u8],
    config: &ProvisionConfig,
    uid: [u8; 4],
    progress: &mut P,
) -> std::result::Result<ProvisionReport, ProvisionError>
where
    B: BridgeChannel + BoardControl + ?Sized,
    P: WriteProgress + ?Sized,
{
    let step = |step: Step| move |source: Error| ProvisionError { step, source };

    let factory = FactoryBlock::build(&config.factory, uid);

    let plan = [
        (config.boot_offset, boot.len()),
        (config.factory_offset, factory.as_bytes().len()),
        (config.firmware_offset, firmware.len()),
    ];
    validate_plan(&config.chip, &plan).map_err(step(Step::Plan))?;

    log::info!(
        "provisioning {}: boot {} bytes @ 0x{:05x}, factory @ 0x{:05x}, firmware {} bytes @ 0x{:05x}",
        config.chip.name,
        boot.len(),
        config.boot_offset,
        config.factory_offset,
        firmware.len(),
        config.firmware_offset,
    );

    let start = Instant::now();

    protocol::check_id(bridge, &config.chip).map_err(step(Step::Identify))?;
    protocol::chip_erase(bridge, &config.erase_poll).map_err(step(Step::Erase))?;

    operations::write_image(bridge, config.boot_offset, boot, &config.page_poll, progress)
        .map_err(step(Step::WriteBoot))?;
    operations::write_image(
        bridge,
        config.factory_offset,
        factory.as_bytes(),
        &config.page_poll,
        progress,
    )
    .map_err(step(Step::WriteFactory))?;
    operations::write_image(
        bridge,
        config.firmware_offset,
        firmware,
        &config.page_poll,
        progress,
    )
    .map_err(step(Step::WriteFirmware))?;

    log::info!("rebooting device...");
    bridge.reset_board().map_err(step(Step::Reset))?;

    Ok(ProvisionReport {
        factory,
        elapsed: start.elapsed(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_plan_accepts_canonical_layout() {
        let chip = ChipProfile::default();
        let plan = [(0x0, 4096), (0x4_0000, 46), (0x5_0000, 4096)];
        assert!(validate_plan(&chip, &plan).is_ok());
    }

    #[test]
    fn test_validate_plan_rejects_overlap() {
        let chip = ChipProfile::default();
        // bootloader runs into the factory block
        let plan = [(0x0, 0x4_0001), (0x4_0000, 46), (0x5_0000, 16)];
        assert!(matches!(
            validate_plan(&chip, &plan),
            Err(Error::ImageOverlap { offset: 0, next: 0x4_0000, .. })
        ));
    }

    #[test]
    fn test_validate_plan_rejects_out_of_bounds() {
        let chip = ChipProfile::default();
        let plan = [(0x0, 16), (0x4_0000, 46), (0x5_0000, chip.total_size)];
        assert!(matches!(
            validate_plan(&chip, &plan),
            Err(Error::ImageOutOfBounds { offset: 0x5_0000, .. })
        ));
    }

    #[test]
    fn test_validate_plan_allows_image_ending_at_next_offset() {
        let chip = ChipProfile::default();
        let plan = [(0x0, 0x4_0000), (0x4_0000, 46), (0x5_0000, 16)];
        assert!(validate_plan(&chip, &plan).is_ok());
    }
}
