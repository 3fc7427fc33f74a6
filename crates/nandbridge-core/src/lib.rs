//! nandbridge-core - Core library for ONFI NAND programming through a bridge
//!
//! This crate drives a raw NAND flash chip whose bus is exposed by a small
//! microcontroller bridge. The host sends command frames (opcode, address
//! cycles, output data, expected read length) over a byte stream and gets
//! back exactly the requested number of bytes. Everything on top of that,
//! from parameter page decoding to bad block aware image storage, lives here.
//!
//! The crate is `no_std` and needs only `alloc`.
//!
//! # Features
//!
//! - `std` - Implement `std::error::Error` for [`Error`]
//!
//! # Example
//!
//! ```ignore
//! use nandbridge_core::{image, NandSession, NoProgress, SessionConfig};
//!
//! fn dump<T: nandbridge_core::Transport>(transport: T) -> nandbridge_core::Result<Vec<u8>> {
//!     let mut nand = NandSession::open(transport, SessionConfig::default())?;
//!     image::read_image(&mut nand, 0, &mut NoProgress)
//! }
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod address;
pub mod badblock;
pub mod command;
pub mod error;
pub mod geometry;
pub mod image;
pub mod protocol;
pub mod session;
pub mod status;
pub mod transport;

#[cfg(test)]
mod mock;

pub use address::NandAddress;
pub use badblock::BadBlockTable;
pub use error::{Error, Result};
pub use geometry::Geometry;
pub use image::{ImageProgress, ImageStats, NoProgress};
pub use session::{ChipState, NandSession, SessionConfig};
pub use status::Status;
pub use transport::Transport;
