//! Error types for nandbridge-core
//!
//! This module provides a no_std compatible error type that can be used
//! throughout the crate.

use core::fmt;

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    // Link errors
    /// Transport write or read failed, or returned fewer bytes than requested
    Transport,
    /// Status polling gave up before the device asserted ready
    Timeout,
    /// Command frame does not fit the wire header fields
    FrameTooLarge,

    // Device identification errors
    /// Parameter page is undersized or describes an impossible geometry
    Protocol,
    /// READ ID did not return the ONFI signature
    NotOnfi,

    // Flash operation errors
    /// Device reported the error bit after a page read request
    Read {
        /// Page that failed to load
        page: u32,
    },
    /// Program attempted while the write-enable status bit is clear
    WriteProtected,
    /// Device recommends rewriting the page (status bit 0x08 after reload)
    RewriteRecommended {
        /// Page that should be rewritten
        page: u32,
    },
    /// Readback differs from the data that was programmed
    VerifyMismatch {
        /// Page that was verified
        page: u32,
        /// Offset of the first differing byte
        offset: usize,
    },
    /// Retry budget spent on one page write
    WriteExhausted {
        /// Page that could not be written
        page: u32,
        /// Number of attempts made
        attempts: u32,
    },
    /// Data read requested before a page was loaded into the page register
    NoPageLoaded,
    /// Device reported the error bit after erasing a block that had to be erased
    EraseFailed {
        /// Block that failed to erase
        block: u32,
    },

    // Address/size errors
    /// Page or block index is beyond the device
    AddressOutOfRange,
    /// No good block left before the end of the device
    OutOfSpace,
    /// Block list does not fit in the index page
    IndexOverflow,
    /// Data does not fit in the target region
    ImageTooLarge,
}

impl Error {
    /// Whether the image allocator may retry the page write after this error
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Read { .. } | Self::RewriteRecommended { .. } | Self::VerifyMismatch { .. }
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport => write!(f, "transport read/write failed"),
            Self::Timeout => write!(f, "device did not become ready"),
            Self::FrameTooLarge => write!(f, "command frame exceeds header field limits"),
            Self::Protocol => write!(f, "malformed or undersized parameter page"),
            Self::NotOnfi => write!(f, "device did not report an ONFI signature"),
            Self::Read { page } => write!(f, "device reported read error on page {}", page),
            Self::WriteProtected => write!(f, "device is write protected"),
            Self::RewriteRecommended { page } => {
                write!(f, "device recommends rewriting page {}", page)
            }
            Self::VerifyMismatch { page, offset } => write!(
                f,
                "verify failed on page {}: data mismatch at offset {}",
                page, offset
            ),
            Self::WriteExhausted { page, attempts } => write!(
                f,
                "giving up on page {} after {} attempts",
                page, attempts
            ),
            Self::NoPageLoaded => write!(f, "no page loaded for data read"),
            Self::EraseFailed { block } => write!(f, "erase of block {} failed", block),
            Self::AddressOutOfRange => write!(f, "page or block out of range"),
            Self::OutOfSpace => write!(f, "no good block left on device"),
            Self::IndexOverflow => write!(f, "block list does not fit in the index page"),
            Self::ImageTooLarge => write!(f, "data too large for target region"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
