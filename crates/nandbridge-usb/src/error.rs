//! Error types for the USB bridge

use thiserror::Error;

/// Result type for USB bridge operations
pub type Result<T> = std::result::Result<T, UsbError>;

/// Errors that can occur talking to the bridge over USB
#[derive(Debug, Error)]
pub enum UsbError {
    /// No device with the configured VID:PID is connected
    #[error("bridge device not found (VID:{vendor_id:04x} PID:{product_id:04x})")]
    DeviceNotFound {
        /// Vendor ID searched for
        vendor_id: u16,
        /// Product ID searched for
        product_id: u16,
    },

    /// Enumeration or opening the device failed
    #[error("failed to open bridge: {0}")]
    OpenFailed(String),

    /// Claiming the interface or opening an endpoint failed
    #[error("failed to claim interface: {0}")]
    ClaimFailed(String),

    /// A bulk transfer completed with an error
    #[error("USB transfer failed: {0}")]
    TransferFailed(String),

    /// A bulk transfer did not complete in time
    #[error("USB transfer timed out")]
    Timeout,

    /// The device ended the response early
    #[error("short read: expected {expected} bytes, got {actual}")]
    ShortRead {
        /// Bytes requested
        expected: usize,
        /// Bytes received
        actual: usize,
    },
}

impl From<UsbError> for nandbridge_core::Error {
    fn from(e: UsbError) -> Self {
        log::error!("{}", e);
        nandbridge_core::Error::Transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_names_ids() {
        let e = UsbError::DeviceNotFound {
            vendor_id: 0x09fb,
            product_id: 0x6001,
        };
        assert_eq!(e.to_string(), "bridge device not found (VID:09fb PID:6001)");
    }

    #[test]
    fn test_maps_to_transport_error() {
        let core: nandbridge_core::Error = UsbError::ShortRead {
            expected: 4,
            actual: 1,
        }
        .into();
        assert_eq!(core, nandbridge_core::Error::Transport);
    }
}
