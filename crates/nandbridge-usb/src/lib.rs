//! nandbridge-usb - USB transport for the NAND command bridge
//!
//! The bridge is a small microcontroller that drives the NAND bus. Command
//! frames go out on a bulk OUT endpoint, responses come back on a bulk IN
//! endpoint. This crate only moves bytes; the frame format lives in
//! `nandbridge-core`.
//!
//! # Example
//!
//! ```no_run
//! use nandbridge_core::{NandSession, SessionConfig};
//! use nandbridge_usb::{UsbBridge, UsbConfig};
//!
//! let bridge = UsbBridge::open(&UsbConfig::default())?;
//! let nand = NandSession::open(bridge, SessionConfig::default())?;
//! println!("{} {}", nand.geometry().vendor, nand.geometry().model);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod device;
mod error;

pub use device::{
    UsbBridge, UsbConfig, UsbDeviceInfo, DEFAULT_INTERFACE, DEFAULT_PRODUCT_ID, DEFAULT_TIMEOUT,
    DEFAULT_VENDOR_ID, READ_EP, WRITE_EP,
};
pub use error::{Result, UsbError};
