//! Flash chip configuration

/// Identity and geometry of the target flash chip
///
/// Board-specific configuration, not protocol constants: a board spin with
/// a different flash part swaps the profile, not the code. The JEDEC ID is
/// checked before anything destructive runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChipProfile {
    /// Display name
    pub name: &'static str,
    /// Expected JEDEC ID: manufacturer, device, capacity
    pub jedec_id: [u8; 3],
    /// Program page size in bytes
    pub page_size: usize,
    /// Total size in bytes
    pub total_size: usize,
}

impl Default for ChipProfile {
    /// The 32 MiB Spansion part populated on supported boards
    fn default() -> Self {
        Self {
            name: "S25FL256S",
            jedec_id: [0x01, 0x02, 0x19],
            page_size: 256,
            total_size: 32 * 1024 * 1024,
        }
    }
}
