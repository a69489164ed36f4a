//! USB bridge device implementation
//!
//! `UsbBridge` owns the device handle and the claimed flash interface, and
//! dispatches transactions to whichever framing variant the firmware
//! speaks. Exactly one outbound and at most one inbound transfer happen per
//! framed transaction; nothing is retried.

use nusb::transfer::{ControlIn, ControlOut, ControlType, Direction, Queue, Recipient, RequestBuffer};
use nusb::{Device, DeviceInfo, Interface};
use provflash_core::channel::{self, BridgeChannel, Transaction, TxnFlags};
use provflash_core::error::{Error as CoreError, Result as CoreResult};
use provflash_core::provision::BoardControl;
use provflash_core::spi::opcodes;

use crate::error::{Result, UsbBridgeError};
use crate::protocol::*;

/// Configuration options for opening a bridge
#[derive(Debug, Clone, Default)]
pub struct UsbBridgeConfig {
    /// USB serial number to match (None = use first device found)
    pub serial: Option<String>,
    /// Framing variant the device firmware speaks
    pub variant: BridgeVariant,
}

/// USB↔SPI bridge programmer
///
/// Owns the flash tunnel exclusively for the lifetime of a run; two
/// concurrent runs against one device would violate the chip-global
/// write-in-progress invariant and are prevented by normal interface
/// claiming.
pub struct UsbBridge {
    device: Device,
    interface: Interface,
    in_ep: u8,
    out_ep: u8,
    variant: BridgeVariant,
}

impl UsbBridge {
    /// Open the first bridge found, with default configuration
    pub fn open() -> Result<Self> {
        Self::open_with_config(&UsbBridgeConfig::default())
    }

    /// Open a bridge with specific configuration
    pub fn open_with_config(config: &UsbBridgeConfig) -> Result<Self> {
        let devices = Self::find_devices(config.serial.as_deref())?;

        if devices.is_empty() {
            return Err(UsbBridgeError::DeviceNotFound);
        }
        if devices.len() > 1 && config.serial.is_none() {
            return Err(UsbBridgeError::MultipleDevicesFound(devices.len()));
        }

        let device_info = &devices[0];
        log::info!(
            "opening bridge at bus {} address {} ({} framing)",
            device_info.bus_number(),
            device_info.device_address(),
            config.variant,
        );

        let device = device_info
            .open()
            .map_err(|e| UsbBridgeError::OpenFailed(e.to_string()))?;

        let interface = device
            .claim_interface(FLASH_INTERFACE)
            .map_err(|e| UsbBridgeError::ClaimFailed(e.to_string()))?;
        interface
            .set_alt_setting(FLASH_ALT_SETTING)
            .map_err(|e| UsbBridgeError::ClaimFailed(e.to_string()))?;

        let (in_ep, out_ep) = Self::flash_endpoints(&device)?;
        log::debug!("flash tunnel endpoints: IN 0x{:02X}, OUT 0x{:02X}", in_ep, out_ep);

        Ok(Self {
            device,
            interface,
            in_ep,
            out_ep,
            variant: config.variant,
        })
    }

    /// Find all bridge devices, optionally filtered by serial number
    fn find_devices(serial_filter: Option<&str>) -> Result<Vec<DeviceInfo>> {
        let mut devices = Vec::new();

        for dev_info in nusb::list_devices()? {
            if dev_info.vendor_id() != BRIDGE_USB_VENDOR
                || dev_info.product_id() != BRIDGE_USB_PRODUCT
            {
                continue;
            }

            if let Some(filter) = serial_filter {
                match dev_info.serial_number() {
                    Some(serial) if serial.contains(filter) => {}
                    _ => continue,
                }
            }

            devices.push(dev_info);
        }

        Ok(devices)
    }

    /// Discover the flash tunnel's IN/OUT endpoint pair from the active
    /// configuration
    fn flash_endpoints(device: &Device) -> Result<(u8, u8)> {
        let config = device
            .active_configuration()
            .map_err(|e| UsbBridgeError::ClaimFailed(e.to_string()))?;

        let mut in_ep = None;
        let mut out_ep = None;

        for iface in config.interface_alt_settings() {
            if iface.interface_number() != FLASH_INTERFACE
                || iface.alternate_setting() != FLASH_ALT_SETTING
            {
                continue;
            }
            for ep in iface.endpoints() {
                match ep.direction() {
                    Direction::In => {
                        if in_ep.is_none() {
                            in_ep = Some(ep.address());
                        }
                    }
                    Direction::Out => {
                        if out_ep.is_none() {
                            out_ep = Some(ep.address());
                        }
                    }
                }
            }
        }

        match (in_ep, out_ep) {
            (Some(in_ep), Some(out_ep)) => Ok((in_ep, out_ep)),
            _ => Err(UsbBridgeError::ClaimFailed(
                "flash interface exposes no bulk endpoint pair".into(),
            )),
        }
    }

    /// Send one bulk OUT transfer
    fn write_bulk(&mut self, data: &[u8]) -> Result<()> {
        let mut queue: Queue<Vec<u8>> = self.interface.bulk_out_queue(self.out_ep);
        queue.submit(data.to_vec());

        let completion = futures_lite::future::block_on(async { queue.next_complete().await });
        completion
            .status
            .map_err(|e| UsbBridgeError::TransferFailed(e.to_string()))?;

        log::trace!("USB write {} bytes", data.len());
        Ok(())
    }

    /// Read one bulk IN transfer of up to `len` bytes
    fn read_bulk(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut queue: Queue<RequestBuffer> = self.interface.bulk_in_queue(self.in_ep);
        queue.submit(RequestBuffer::new(len));

        let completion = futures_lite::future::block_on(async { queue.next_complete().await });
        completion
            .status
            .map_err(|e| UsbBridgeError::TransferFailed(e.to_string()))?;

        log::trace!("USB read {} bytes", completion.data.len());
        Ok(completion.data)
    }

    /// Send a vendor control OUT request at the device level
    fn control_out(&mut self, request: u8, value: u16, data: &[u8]) -> Result<()> {
        let result = futures_lite::future::block_on(self.interface.control_out(ControlOut {
            control_type: ControlType::Vendor,
            recipient: Recipient::Device,
            request,
            value,
            index: 0,
            data,
        }));

        result
            .status
            .map_err(|e| UsbBridgeError::TransferFailed(e.to_string()))?;
        Ok(())
    }

    /// Read a vendor control IN response at the device level
    fn control_in(&mut self, request: u8, value: u16, len: u16) -> Result<Vec<u8>> {
        let result = futures_lite::future::block_on(self.interface.control_in(ControlIn {
            control_type: ControlType::Vendor,
            recipient: Recipient::Device,
            request,
            value,
            index: 0,
            length: len,
        }));

        result
            .status
            .map_err(|e| UsbBridgeError::TransferFailed(e.to_string()))?;
        Ok(result.data)
    }

    /// Execute a framed transaction over the bulk endpoints
    fn transact_bulk(&mut self, txn: &Transaction<'_>) -> CoreResult<Vec<u8>> {
        let request = channel::encode_request(txn, self.max_payload())?;
        self.write_bulk(&request).map_err(transport)?;

        if txn.read_len == 0 {
            return Ok(Vec::new());
        }

        // The bridge hardware requires an inbound buffer of at least 512
        // bytes regardless of the requested length; the padding is dropped.
        let mut data = self
            .read_bulk(txn.read_len.max(channel::MIN_IN_TRANSFER))
            .map_err(transport)?;
        if data.len() < txn.read_len {
            return Err(CoreError::ShortResponse {
                expected: txn.read_len,
                got: data.len(),
            });
        }
        data.truncate(txn.read_len);
        Ok(data)
    }

    /// Execute a framed transaction as a vendor control transfer pair
    ///
    /// Control transfers carry a 16-bit length, so reads in this variant
    /// cap at 65535 bytes; the command set stays well below that.
    fn transact_control(&mut self, txn: &Transaction<'_>) -> CoreResult<Vec<u8>> {
        let request = channel::encode_request(txn, self.max_payload())?;
        self.control_out(REQ_FLASH_TXN, 0, &request)
            .map_err(transport)?;

        if txn.read_len == 0 {
            return Ok(Vec::new());
        }
        let read_len = u16::try_from(txn.read_len).map_err(|_| {
            CoreError::Transport("control framing caps reads at 65535 bytes".into())
        })?;

        let mut data = self
            .control_in(REQ_FLASH_TXN, 0, read_len)
            .map_err(transport)?;
        if data.len() < txn.read_len {
            return Err(CoreError::ShortResponse {
                expected: txn.read_len,
                got: data.len(),
            });
        }
        data.truncate(txn.read_len);
        Ok(data)
    }

    /// Shift `out` through the SPI bus and collect the full-duplex echo
    fn shift_packets(&mut self, out: &[u8]) -> Result<Vec<u8>> {
        let mut echo = Vec::with_capacity(out.len());
        let mut offset = 0;

        for len in packet_lengths(out.len()) {
            self.write_bulk(&out[offset..offset + len])?;
            let data = self.read_bulk(PACKET_SIZE)?;
            if data.len() != len {
                return Err(UsbBridgeError::InvalidResponse(format!(
                    "packet echo of {} bytes for a {} byte packet",
                    data.len(),
                    len
                )));
            }
            echo.extend_from_slice(&data);
            offset += len;
        }

        Ok(echo)
    }

    /// Execute a transaction over the raw packet framing
    ///
    /// There is no header in this variant, so the flag semantics are
    /// emulated host-side: WRITE_ENABLE becomes its own WREN shift before
    /// the command and STATUS_POLL becomes WIP polling after it. Response
    /// bytes are clocked out by appending dummy bytes to the shift.
    fn transact_packet(&mut self, txn: &Transaction<'_>) -> CoreResult<Vec<u8>> {
        txn.validate(self.max_payload())?;

        if txn.flags.contains(TxnFlags::WRITE_ENABLE) {
            self.shift_packets(&[opcodes::WREN]).map_err(transport)?;
        }

        let cmd_len = txn.out_len();
        let mut shift = txn.encode_payload();
        shift.resize(cmd_len + txn.read_len, 0);

        let echo = self.shift_packets(&shift).map_err(transport)?;
        let response = echo[cmd_len..].to_vec();

        if txn.flags.contains(TxnFlags::STATUS_POLL) {
            self.poll_wip_raw()?;
        }

        Ok(response)
    }

    /// Emulated STATUS_POLL for the raw framing: read the status register
    /// until WIP clears, bounded by [`PACKET_POLL_CAP`]
    fn poll_wip_raw(&mut self) -> CoreResult<()> {
        let start = std::time::Instant::now();
        for _ in 0..PACKET_POLL_CAP {
            let echo = self
                .shift_packets(&[opcodes::RDSR, 0])
                .map_err(transport)?;
            if echo[1] & opcodes::SR1_WIP == 0 {
                return Ok(());
            }
        }
        Err(CoreError::FlashTimeout {
            elapsed: start.elapsed(),
        })
    }

    /// Reset the board into the freshly written firmware
    ///
    /// USB-resets the coprocessor, then pulses the SoC reset line low and
    /// high via vendor control requests.
    pub fn reset(&mut self) -> Result<()> {
        self.device.reset()?;
        self.control_out(REQ_RESET, 0, &[])?;
        self.control_out(REQ_RESET, 1, &[])?;
        Ok(())
    }

    /// Reboot the coprocessor into its DFU bootloader
    pub fn boot_dfu(&mut self) -> Result<()> {
        self.control_out(REQ_BOOT, 0, &[])
    }
}

/// Map a device-level failure into the core transport error
fn transport(e: UsbBridgeError) -> CoreError {
    CoreError::Transport(e.to_string())
}

impl BridgeChannel for UsbBridge {
    fn transact(&mut self, txn: &Transaction<'_>) -> CoreResult<Vec<u8>> {
        log::debug!(
            "txn opcode=0x{:02X} out={} read={} flags={:?} ({})",
            txn.opcode,
            txn.out_len(),
            txn.read_len,
            txn.flags,
            self.variant,
        );
        match self.variant {
            BridgeVariant::Bulk => self.transact_bulk(txn),
            BridgeVariant::Control => self.transact_control(txn),
            BridgeVariant::Packet => self.transact_packet(txn),
        }
    }
}

impl BoardControl for UsbBridge {
    fn reset_board(&mut self) -> CoreResult<()> {
        self.reset().map_err(transport)
    }
}
