//! Flash command protocols
//!
//! Currently only the ONFI NAND command set spoken through the bridge.

pub mod onfi;
