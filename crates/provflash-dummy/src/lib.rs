//! provflash-dummy - In-memory bridge emulator for testing
//!
//! Emulates the USB↔SPI bridge and the flash chip behind it: transactions
//! are validated against the same transport limits as the real channel,
//! the WRITE_ENABLE/STATUS_POLL flag semantics are honored, and the WIP
//! bit is modeled with a poll countdown so completion polling is actually
//! exercised. Every executed operation lands in an ordered log that tests
//! assert against.

use provflash_core::channel::{BridgeChannel, Transaction, TxnFlags};
use provflash_core::error::{Error, Result};
use provflash_core::provision::BoardControl;
use provflash_core::spi::opcodes;

/// 64 KiB, the block size behind the BE_DC opcode
const SECTOR_SIZE: usize = 64 * 1024;

/// Configuration for the emulated bridge and chip
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// JEDEC ID the chip reports
    pub jedec_id: [u8; 3],
    /// Flash size in bytes
    pub size: usize,
    /// Program page size
    pub page_size: usize,
    /// How many status polls report WIP after an erase or an un-polled
    /// program before the chip goes idle
    pub busy_polls: u32,
}

impl Default for DummyConfig {
    /// Matches the default chip profile (S25FL256S)
    fn default() -> Self {
        Self {
            jedec_id: [0x01, 0x02, 0x19],
            size: 32 * 1024 * 1024,
            page_size: 256,
            busy_polls: 3,
        }
    }
}

/// One executed bridge operation, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeOp {
    /// JEDEC ID read
    ReadId,
    /// Status register read
    ReadStatus,
    /// Write Enable pulse (explicit command or header flag)
    WriteEnable,
    /// Memory read
    Read {
        /// Start address
        addr: u32,
        /// Length in bytes
        len: usize,
    },
    /// Page program
    PageProgram {
        /// Destination address
        addr: u32,
        /// Payload length
        len: usize,
    },
    /// 64 KiB block erase
    SectorErase {
        /// Address within the block
        addr: u32,
    },
    /// Full chip erase
    ChipErase,
    /// Board reset request
    Reset,
}

/// In-memory bridge + flash emulator
pub struct DummyBridge {
    config: DummyConfig,
    data: Vec<u8>,
    write_enabled: bool,
    busy_remaining: u32,
    ops: Vec<BridgeOp>,
}

impl DummyBridge {
    /// Create an emulator with the given configuration
    pub fn new(config: DummyConfig) -> Self {
        let data = vec![0xFF; config.size];
        Self {
            config,
            data,
            write_enabled: false,
            busy_remaining: 0,
            ops: Vec::new(),
        }
    }

    /// Create an emulator with the default configuration
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// The emulated flash contents
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Ordered log of executed operations
    pub fn ops(&self) -> &[BridgeOp] {
        &self.ops
    }

    /// The configuration in use
    pub fn config(&self) -> &DummyConfig {
        &self.config
    }

    fn require_write_enable(&mut self, txn: &Transaction<'_>) -> Result<()> {
        if txn.flags.contains(TxnFlags::WRITE_ENABLE) {
            self.write_enabled = true;
            self.ops.push(BridgeOp::WriteEnable);
        }
        if !self.write_enabled {
            return Err(Error::Transport(format!(
                "opcode 0x{:02X} without write enable",
                txn.opcode
            )));
        }
        // the WEL bit self-clears on every program/erase
        self.write_enabled = false;
        Ok(())
    }

    fn finish_busy(&mut self, txn: &Transaction<'_>) {
        if txn.flags.contains(TxnFlags::STATUS_POLL) {
            // the bridge holds the reply until WIP clears
            self.busy_remaining = 0;
        } else {
            self.busy_remaining = self.config.busy_polls;
        }
    }

    fn handle_read(&mut self, addr: u32, len: usize) -> Result<Vec<u8>> {
        let addr = addr as usize;
        if addr + len > self.data.len() {
            return Err(Error::Transport(format!(
                "read of {} bytes at 0x{:08X} out of bounds",
                len, addr
            )));
        }
        Ok(self.data[addr..addr + len].to_vec())
    }

    fn handle_page_program(&mut self, txn: &Transaction<'_>) -> Result<()> {
        self.require_write_enable(txn)?;

        let addr = txn.address.unwrap_or(0) as usize;
        let data = txn.write_data;

        if data.len() > self.config.page_size {
            return Err(Error::Transport(format!(
                "page program of {} bytes exceeds the {} byte page",
                data.len(),
                self.config.page_size
            )));
        }
        // the real chip wraps inside the page; treat it as a pipeline bug
        if addr % self.config.page_size + data.len() > self.config.page_size {
            return Err(Error::Transport(format!(
                "page program at 0x{:08X} crosses a page boundary",
                addr
            )));
        }
        if addr + data.len() > self.data.len() {
            return Err(Error::Transport(format!(
                "page program at 0x{:08X} out of bounds",
                addr
            )));
        }

        // programming can only clear bits
        for (i, &byte) in data.iter().enumerate() {
            self.data[addr + i] &= byte;
        }

        self.finish_busy(txn);
        Ok(())
    }

    fn handle_sector_erase(&mut self, txn: &Transaction<'_>) -> Result<()> {
        self.require_write_enable(txn)?;

        let addr = txn.address.unwrap_or(0) as usize;
        let aligned = addr & !(SECTOR_SIZE - 1);
        if aligned + SECTOR_SIZE > self.data.len() {
            return Err(Error::Transport(format!(
                "sector erase at 0x{:08X} out of bounds",
                addr
            )));
        }

        for byte in &mut self.data[aligned..aligned + SECTOR_SIZE] {
            *byte = 0xFF;
        }

        self.finish_busy(txn);
        Ok(())
    }

    fn handle_chip_erase(&mut self, txn: &Transaction<'_>) -> Result<()> {
        self.require_write_enable(txn)?;

        for byte in &mut self.data {
            *byte = 0xFF;
        }

        self.finish_busy(txn);
        Ok(())
    }
}

impl BridgeChannel for DummyBridge {
    fn transact(&mut self, txn: &Transaction<'_>) -> Result<Vec<u8>> {
        log::trace!(
            "dummy txn opcode=0x{:02X} out={} read={} flags={:?}",
            txn.opcode,
            txn.out_len(),
            txn.read_len,
            txn.flags,
        );

        // same pre-I/O checks as the real transports
        txn.validate(self.max_payload())?;

        match txn.opcode {
            opcodes::RDID => {
                self.ops.push(BridgeOp::ReadId);
                Ok(self.config.jedec_id[..txn.read_len.min(3)].to_vec())
            }

            opcodes::RDSR => {
                self.ops.push(BridgeOp::ReadStatus);
                let status = if self.busy_remaining > 0 {
                    self.busy_remaining -= 1;
                    opcodes::SR1_WIP
                } else {
                    0x00
                };
                Ok(vec![status])
            }

            opcodes::WREN => {
                self.write_enabled = true;
                self.ops.push(BridgeOp::WriteEnable);
                Ok(Vec::new())
            }

            opcodes::READ_4B => {
                let addr = txn.address.unwrap_or(0);
                let data = self.handle_read(addr, txn.read_len)?;
                self.ops.push(BridgeOp::Read {
                    addr,
                    len: txn.read_len,
                });
                Ok(data)
            }

            opcodes::PP_4B => {
                self.handle_page_program(txn)?;
                self.ops.push(BridgeOp::PageProgram {
                    addr: txn.address.unwrap_or(0),
                    len: txn.write_data.len(),
                });
                Ok(Vec::new())
            }

            opcodes::BE_DC => {
                self.handle_sector_erase(txn)?;
                self.ops.push(BridgeOp::SectorErase {
                    addr: txn.address.unwrap_or(0),
                });
                Ok(Vec::new())
            }

            opcodes::CE_60 => {
                self.handle_chip_erase(txn)?;
                self.ops.push(BridgeOp::ChipErase);
                Ok(Vec::new())
            }

            other => Err(Error::Transport(format!(
                "opcode 0x{:02X} not supported by the bridge",
                other
            ))),
        }
    }
}

impl BoardControl for DummyBridge {
    fn reset_board(&mut self) -> Result<()> {
        self.ops.push(BridgeOp::Reset);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provflash_core::operations::{self, LogProgress, NoProgress, PAGE_SIZE};
    use provflash_core::protocol::{self, PollPolicy};
    use provflash_core::provision::{self, ProvisionConfig, Step};

    #[test]
    fn test_read_jedec_id() {
        let mut bridge = DummyBridge::new_default();
        assert_eq!(protocol::read_id(&mut bridge).unwrap(), [0x01, 0x02, 0x19]);
    }

    #[test]
    fn test_write_page_and_read_back() {
        let mut bridge = DummyBridge::new_default();
        let data = [0x12, 0x34, 0x56, 0x78];

        protocol::write_page(&mut bridge, 0x1000, &data).unwrap();

        let mut buf = [0u8; 4];
        protocol::read(&mut bridge, 0x1000, &mut buf).unwrap();
        assert_eq!(buf, data);
    }

    #[test]
    fn test_chip_erase_clears_everything() {
        let mut bridge = DummyBridge::new_default();
        protocol::write_page(&mut bridge, 0, &[0x00; 16]).unwrap();

        protocol::chip_erase(&mut bridge, &PollPolicy::erase()).unwrap();
        assert!(bridge.data()[..64].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_erase_exercises_the_poller() {
        let mut bridge = DummyBridge::new(DummyConfig {
            busy_polls: 5,
            ..DummyConfig::default()
        });

        protocol::chip_erase(&mut bridge, &PollPolicy::erase()).unwrap();

        // five busy samples plus the final clear one
        let polls = bridge
            .ops()
            .iter()
            .filter(|op| matches!(op, BridgeOp::ReadStatus))
            .count();
        assert_eq!(polls, 6);
    }

    #[test]
    fn test_write_image_lands_bit_exact() {
        let mut bridge = DummyBridge::new_default();
        let image: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();

        operations::write_image(
            &mut bridge,
            0x5_0000,
            &image,
            &PollPolicy::page(),
            &mut LogProgress::default(),
        )
        .unwrap();

        assert_eq!(&bridge.data()[0x5_0000..0x5_0000 + image.len()], &image[..]);
    }

    #[test]
    fn test_sector_erase_clears_only_its_block() {
        let mut bridge = DummyBridge::new_default();
        protocol::write_page(&mut bridge, 0x1_0000 - 4, &[0x00; 4]).unwrap();
        protocol::write_page(&mut bridge, 0x1_0000, &[0x00; 4]).unwrap();

        protocol::erase_sector(&mut bridge, 0x1_0000, &PollPolicy::erase()).unwrap();

        assert_eq!(&bridge.data()[0x1_0000 - 4..0x1_0000], &[0x00; 4]);
        assert!(bridge.data()[0x1_0000..0x1_0000 + 4].iter().all(|&b| b == 0xFF));
    }

    fn page_programs(bridge: &DummyBridge) -> Vec<(u32, usize)> {
        bridge
            .ops()
            .iter()
            .filter_map(|op| match op {
                BridgeOp::PageProgram { addr, len } => Some((*addr, *len)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_provision_end_to_end() {
        let mut bridge = DummyBridge::new_default();
        let boot = vec![0xB0u8; 4096];
        let firmware = vec![0xF1u8; 4096];
        let config = ProvisionConfig::default();

        let report = provision::provision(
            &mut bridge,
            &boot,
            &firmware,
            &config,
            [0xDE, 0xAD, 0xBE, 0xEF],
            &mut NoProgress,
        )
        .unwrap();

        // exactly one chip erase, no sector erases
        let erases: Vec<_> = bridge
            .ops()
            .iter()
            .filter(|op| matches!(op, BridgeOp::ChipErase | BridgeOp::SectorErase { .. }))
            .collect();
        assert_eq!(erases, vec![&BridgeOp::ChipErase]);

        // 16 bootloader pages, the factory page, 16 firmware pages, in order
        let pages = page_programs(&bridge);
        assert_eq!(pages.len(), 33);
        for (i, &(addr, len)) in pages[..16].iter().enumerate() {
            assert_eq!(addr, (i * PAGE_SIZE) as u32);
            assert_eq!(len, PAGE_SIZE);
        }
        assert_eq!(pages[16], (0x4_0000, 46));
        for (i, &(addr, len)) in pages[17..].iter().enumerate() {
            assert_eq!(addr, 0x5_0000 + (i * PAGE_SIZE) as u32);
            assert_eq!(len, PAGE_SIZE);
        }

        // erase before the first write, reset after the last
        let erase_idx = bridge
            .ops()
            .iter()
            .position(|op| matches!(op, BridgeOp::ChipErase))
            .unwrap();
        let first_write = bridge
            .ops()
            .iter()
            .position(|op| matches!(op, BridgeOp::PageProgram { .. }))
            .unwrap();
        assert!(erase_idx < first_write);
        assert!(matches!(bridge.ops().last(), Some(&BridgeOp::Reset)));
        assert_eq!(
            bridge
                .ops()
                .iter()
                .filter(|op| matches!(op, BridgeOp::Reset))
                .count(),
            1
        );

        // images and factory block land bit-exact
        assert_eq!(&bridge.data()[..4096], &boot[..]);
        assert_eq!(
            &bridge.data()[0x4_0000..0x4_0000 + 46],
            report.factory.as_bytes()
        );
        assert_eq!(&bridge.data()[0x5_0000..0x5_0000 + 4096], &firmware[..]);

        // the injected uid shows up in both MACs
        assert_eq!(
            &bridge.data()[0x4_0004..0x4_000A],
            &[0x02, 0xA3, 0xDE, 0xAD, 0xBE, 0xEF]
        );
        assert_eq!(report.factory.mac1()[2..], [0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn test_provision_aborts_on_id_mismatch() {
        let mut bridge = DummyBridge::new(DummyConfig {
            jedec_id: [0xFF, 0xFF, 0xFF],
            ..DummyConfig::default()
        });

        let err = provision::provision(
            &mut bridge,
            &[0u8; 4096],
            &[0u8; 4096],
            &ProvisionConfig::default(),
            [0, 0, 0, 0],
            &mut NoProgress,
        )
        .unwrap_err();

        assert_eq!(err.step, Step::Identify);
        assert!(matches!(
            err.source,
            provflash_core::Error::ChipIdMismatch {
                expected: [0x01, 0x02, 0x19],
                found: [0xFF, 0xFF, 0xFF],
            }
        ));

        // nothing destructive happened: the only traffic was the ID read
        assert!(bridge.ops().iter().all(|op| matches!(op, BridgeOp::ReadId)));
    }

    #[test]
    fn test_transport_limits_enforced() {
        let mut bridge = DummyBridge::new_default();
        // an oversized program is rejected before touching the flash
        let data = vec![0u8; 496];
        let txn = Transaction::program(opcodes::PP_4B, 0, &data)
            .with_flags(TxnFlags::WRITE_ENABLE | TxnFlags::STATUS_POLL);
        assert!(matches!(
            bridge.transact(&txn),
            Err(Error::TransactionTooLarge { len: 501, .. })
        ));
        assert!(bridge.ops().is_empty());
    }
}
