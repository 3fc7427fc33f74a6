//! nandbridge-dummy - In-memory NAND emulator for testing
//!
//! This crate provides an emulated ONFI NAND chip that sits behind the
//! bridge command-frame protocol. It implements
//! [`Transport`](nandbridge_core::Transport), so a
//! [`NandSession`](nandbridge_core::NandSession) can drive it exactly like
//! the USB bridge. Bad blocks, write protection, slow status and flaky page
//! loads can be configured to exercise the error paths.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

use alloc::vec::Vec;

mod nand;

pub use nand::{DummyNand, PageFault, ProgramFault};

/// Configuration for the emulated chip
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// Manufacturer name in the parameter page
    pub vendor: &'static str,
    /// Model name in the parameter page
    pub model: &'static str,
    /// JEDEC manufacturer ID
    pub manufacturer_id: u8,
    /// JEDEC device ID
    pub device_id: u8,
    /// Data bytes per page
    pub bytes_per_page: u32,
    /// Spare bytes per page
    pub spare_per_page: u16,
    /// Pages per erase block
    pub pages_per_block: u32,
    /// Blocks per logical unit
    pub blocks_per_unit: u32,
    /// Number of logical units
    pub unit_count: u8,
    /// Row address cycles
    pub row_address_bytes: u8,
    /// Column address cycles
    pub column_address_bytes: u8,
    /// Factory bad blocks (marker byte cleared, erase fails)
    pub bad_blocks: Vec<u32>,
    /// Blocks whose markers look good but whose erase fails
    pub erase_failures: Vec<u32>,
    /// WP# asserted: status write-enable bit clear, program and erase fail
    pub write_protected: bool,
    /// Not-ready status reads after each reset, load, erase and program
    pub busy_polls: u32,
    /// Answer READ ID 0x20 with the ONFI signature
    pub onfi: bool,
    /// On-die ECC enabled at power-up
    pub internal_ecc: bool,
    /// SET FEATURES can switch on-die ECC on
    pub ecc_supported: bool,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            vendor: "MICRON",
            model: "MT29F2G08ABAEAWP",
            manufacturer_id: 0x2C, // Micron
            device_id: 0xDA,       // 2Gbit x8
            bytes_per_page: 2048,
            spare_per_page: 64,
            pages_per_block: 64,
            blocks_per_unit: 1024,
            unit_count: 1,
            row_address_bytes: 3,
            column_address_bytes: 2,
            bad_blocks: Vec::new(),
            erase_failures: Vec::new(),
            write_protected: false,
            busy_polls: 0,
            onfi: true,
            internal_ecc: false,
            ecc_supported: true,
        }
    }
}

impl DummyConfig {
    /// Bytes per page including the spare area
    pub fn raw_page_size(&self) -> usize {
        self.bytes_per_page as usize + self.spare_per_page as usize
    }

    /// Total number of erase blocks
    pub fn total_blocks(&self) -> u32 {
        self.blocks_per_unit * self.unit_count as u32
    }

    /// Total number of pages
    pub fn total_pages(&self) -> u32 {
        self.total_blocks() * self.pages_per_block
    }
}
