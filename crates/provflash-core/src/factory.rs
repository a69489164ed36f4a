//! Factory personalization block
//!
//! The factory region holds the two MAC addresses the firmware claims at
//! boot. Layout: 4-byte magic, MAC 1, 30 bytes of 0xFF padding, MAC 2. The
//! two MACs share a 4-byte device-unique suffix and differ only in their
//! 2-byte prefix, so a device's interfaces are related but distinct on the
//! network.

/// Magic header identifying the factory partition
pub const FACTORY_MAGIC: [u8; 4] = [0x20, 0x76, 0x03, 0x01];

/// Total size of the factory block in bytes
pub const FACTORY_BLOCK_LEN: usize = 46;

const MAC_LEN: usize = 6;
const PAD_LEN: usize = 30;

/// MAC prefixes for the device's two network interfaces
///
/// Locally administered addresses; board-specific configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactoryConfig {
    /// First interface's 2-byte MAC prefix
    pub mac1_prefix: [u8; 2],
    /// Second interface's 2-byte MAC prefix
    pub mac2_prefix: [u8; 2],
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            mac1_prefix: [0x02, 0xA3],
            mac2_prefix: [0x02, 0xA4],
        }
    }
}

/// A built factory block and the MACs embedded in it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactoryBlock {
    bytes: [u8; FACTORY_BLOCK_LEN],
    mac1: [u8; MAC_LEN],
    mac2: [u8; MAC_LEN],
}

impl FactoryBlock {
    /// Build the block from the configured prefixes and a 4-byte
    /// device-unique suffix
    ///
    /// The same suffix appears in both MACs. Callers must draw a fresh
    /// suffix per provisioning run; this type never reuses or caches one.
    pub fn build(config: &FactoryConfig, uid: [u8; 4]) -> Self {
        let mut mac1 = [0u8; MAC_LEN];
        mac1[..2].copy_from_slice(&config.mac1_prefix);
        mac1[2..].copy_from_slice(&uid);

        let mut mac2 = [0u8; MAC_LEN];
        mac2[..2].copy_from_slice(&config.mac2_prefix);
        mac2[2..].copy_from_slice(&uid);

        let mut bytes = [0xFFu8; FACTORY_BLOCK_LEN];
        bytes[..4].copy_from_slice(&FACTORY_MAGIC);
        bytes[4..4 + MAC_LEN].copy_from_slice(&mac1);
        // bytes 10..40 stay 0xFF
        bytes[4 + MAC_LEN + PAD_LEN..].copy_from_slice(&mac2);

        Self { bytes, mac1, mac2 }
    }

    /// The raw block, ready to be written at the factory offset
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// MAC of the first interface
    pub fn mac1(&self) -> [u8; MAC_LEN] {
        self.mac1
    }

    /// MAC of the second interface
    pub fn mac2(&self) -> [u8; MAC_LEN] {
        self.mac2
    }
}

/// Format a MAC for operator display, `aa:bb:cc:dd:ee:ff`
pub fn format_mac(mac: &[u8; MAC_LEN]) -> String {
    mac.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let block = FactoryBlock::build(&FactoryConfig::default(), [0xDE, 0xAD, 0xBE, 0xEF]);
        let bytes = block.as_bytes();

        assert_eq!(bytes.len(), FACTORY_BLOCK_LEN);
        assert_eq!(&bytes[..4], &FACTORY_MAGIC);
        assert_eq!(&bytes[4..10], &[0x02, 0xA3, 0xDE, 0xAD, 0xBE, 0xEF]);
        assert!(bytes[10..40].iter().all(|&b| b == 0xFF));
        assert_eq!(&bytes[40..], &[0x02, 0xA4, 0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn test_macs_share_suffix_not_prefix() {
        let config = FactoryConfig::default();
        let block = FactoryBlock::build(&config, [1, 2, 3, 4]);

        assert_eq!(block.mac1()[2..], block.mac2()[2..]);
        assert_ne!(block.mac1()[..2], block.mac2()[..2]);
        assert_eq!(block.mac1()[..2], config.mac1_prefix);
        assert_eq!(block.mac2()[..2], config.mac2_prefix);
    }

    #[test]
    fn test_distinct_uids_give_distinct_blocks() {
        let config = FactoryConfig::default();
        let a = FactoryBlock::build(&config, [0, 0, 0, 1]);
        let b = FactoryBlock::build(&config, [0, 0, 0, 2]);
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_format_mac() {
        assert_eq!(
            format_mac(&[0x02, 0xA3, 0x00, 0x1B, 0xC5, 0x09]),
            "02:a3:00:1b:c5:09"
        );
    }
}
