//! USB bridge device
//!
//! The bridge exposes one vendor interface with a bulk OUT endpoint for
//! command frames and a bulk IN endpoint for responses.

use std::time::Duration;

use nandbridge_core::error::Result as CoreResult;
use nandbridge_core::transport::Transport;
use nusb::transfer::{Buffer, Bulk, In, Out};
use nusb::{Endpoint, MaybeFuture};

use crate::error::{Result, UsbError};

/// Default bridge vendor ID
pub const DEFAULT_VENDOR_ID: u16 = 0x09fb;
/// Default bridge product ID
pub const DEFAULT_PRODUCT_ID: u16 = 0x6001;
/// Interface carrying the bulk endpoints
pub const DEFAULT_INTERFACE: u8 = 1;
/// Bulk OUT endpoint for command frames
pub const WRITE_EP: u8 = 0x04;
/// Bulk IN endpoint for responses
pub const READ_EP: u8 = 0x83;
/// Per-transfer timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Where to find the bridge and how long to wait for it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsbConfig {
    /// USB vendor ID
    pub vendor_id: u16,
    /// USB product ID
    pub product_id: u16,
    /// Interface number to claim
    pub interface: u8,
    /// Timeout for each bulk transfer
    pub timeout: Duration,
}

impl Default for UsbConfig {
    fn default() -> Self {
        Self {
            vendor_id: DEFAULT_VENDOR_ID,
            product_id: DEFAULT_PRODUCT_ID,
            interface: DEFAULT_INTERFACE,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Information about a connected bridge
#[derive(Debug, Clone)]
pub struct UsbDeviceInfo {
    /// USB bus identifier
    pub bus: String,
    /// USB device address
    pub address: u8,
    /// Product string, if the device reports one
    pub product: Option<String>,
}

impl std::fmt::Display for UsbDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bridge at bus {} address {}", self.bus, self.address)?;
        if let Some(product) = &self.product {
            write!(f, " ({})", product)?;
        }
        Ok(())
    }
}

/// NAND command bridge connected over USB
pub struct UsbBridge {
    out_ep: Endpoint<Bulk, Out>,
    in_ep: Endpoint<Bulk, In>,
    timeout: Duration,
    /// Bytes received beyond what the last read asked for
    stash: Vec<u8>,
}

impl UsbBridge {
    /// Open the first bridge matching `config`
    pub fn open(config: &UsbConfig) -> Result<Self> {
        Self::open_nth(config, 0)
    }

    /// Open the nth bridge matching `config` (0-indexed)
    pub fn open_nth(config: &UsbConfig, index: usize) -> Result<Self> {
        let devices: Vec<_> = nusb::list_devices()
            .wait()
            .map_err(|e| UsbError::OpenFailed(e.to_string()))?
            .filter(|d| d.vendor_id() == config.vendor_id && d.product_id() == config.product_id)
            .collect();

        let device_info = devices.get(index).ok_or(UsbError::DeviceNotFound {
            vendor_id: config.vendor_id,
            product_id: config.product_id,
        })?;

        log::info!(
            "Opening bridge at bus {} address {}",
            device_info.bus_id(),
            device_info.device_address()
        );

        let device = device_info
            .open()
            .wait()
            .map_err(|e| UsbError::OpenFailed(e.to_string()))?;

        let interface = device
            .claim_interface(config.interface)
            .wait()
            .map_err(|e| UsbError::ClaimFailed(e.to_string()))?;

        let out_ep = interface
            .endpoint::<Bulk, Out>(WRITE_EP)
            .map_err(|e| UsbError::ClaimFailed(e.to_string()))?;
        let in_ep = interface
            .endpoint::<Bulk, In>(READ_EP)
            .map_err(|e| UsbError::ClaimFailed(e.to_string()))?;

        log::debug!(
            "claimed interface {}, IN max packet {} bytes",
            config.interface,
            in_ep.max_packet_size()
        );

        Ok(Self {
            out_ep,
            in_ep,
            timeout: config.timeout,
            stash: Vec::new(),
        })
    }

    /// List all connected bridges matching `config`
    pub fn list_devices(config: &UsbConfig) -> Result<Vec<UsbDeviceInfo>> {
        let devices = nusb::list_devices()
            .wait()
            .map_err(|e| UsbError::OpenFailed(e.to_string()))?
            .filter(|d| d.vendor_id() == config.vendor_id && d.product_id() == config.product_id)
            .map(|d| UsbDeviceInfo {
                bus: d.bus_id().to_string(),
                address: d.device_address(),
                product: d.product_string().map(str::to_string),
            })
            .collect();
        Ok(devices)
    }

    /// Send `data` as one bulk OUT transfer
    fn usb_write(&mut self, data: &[u8]) -> Result<()> {
        self.out_ep.submit(Buffer::from(data.to_vec()));

        let completion = match self.out_ep.wait_next_complete(self.timeout) {
            Some(c) => c,
            None => {
                self.drain_all_pending();
                return Err(UsbError::Timeout);
            }
        };
        completion
            .status
            .map_err(|e| UsbError::TransferFailed(e.to_string()))?;

        log::trace!("USB write {} bytes", data.len());
        Ok(())
    }

    /// Collect exactly `buf.len()` bytes from the IN endpoint
    ///
    /// Each request is rounded up to whole packets. Anything the device
    /// sends past the requested length is kept for the next read.
    fn usb_read(&mut self, buf: &mut [u8]) -> Result<()> {
        let want = buf.len();
        let mut filled = self.stash.len().min(want);
        buf[..filled].copy_from_slice(&self.stash[..filled]);
        self.stash.drain(..filled);

        let max_packet = self.in_ep.max_packet_size().max(1);
        while filled < want {
            let request = (want - filled).div_ceil(max_packet) * max_packet;
            self.in_ep.submit(Buffer::new(request));

            let completion = match self.in_ep.wait_next_complete(self.timeout) {
                Some(c) => c,
                None => {
                    self.drain_all_pending();
                    return Err(UsbError::Timeout);
                }
            };
            completion
                .status
                .map_err(|e| UsbError::TransferFailed(e.to_string()))?;

            let received = &completion.buffer[..completion.actual_len];
            if received.is_empty() {
                return Err(UsbError::ShortRead {
                    expected: want,
                    actual: filled,
                });
            }
            let take = received.len().min(want - filled);
            buf[filled..filled + take].copy_from_slice(&received[..take]);
            self.stash.extend_from_slice(&received[take..]);
            filled += take;
        }

        if !self.stash.is_empty() {
            log::warn!("bridge sent {} bytes more than requested", self.stash.len());
        }
        log::trace!("USB read {} bytes", want);
        Ok(())
    }

    /// Cancel and drain all pending transfers on both endpoints
    fn drain_all_pending(&mut self) {
        self.out_ep.cancel_all();
        while self.out_ep.pending() > 0 {
            let _ = self.out_ep.wait_next_complete(Duration::from_secs(1));
        }
        self.in_ep.cancel_all();
        while self.in_ep.pending() > 0 {
            let _ = self.in_ep.wait_next_complete(Duration::from_secs(1));
        }
    }
}

impl Transport for UsbBridge {
    fn write(&mut self, data: &[u8]) -> CoreResult<()> {
        Ok(self.usb_write(data)?)
    }

    fn read(&mut self, buf: &mut [u8]) -> CoreResult<()> {
        Ok(self.usb_read(buf)?)
    }
}

impl Drop for UsbBridge {
    fn drop(&mut self) {
        self.drain_all_pending();
    }
}
