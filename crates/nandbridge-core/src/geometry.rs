//! Device geometry from the ONFI parameter page
//!
//! The geometry is read once per session and never changes afterwards.

use heapless::String;
use zerocopy::byteorder::little_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::command::{self, opcodes, CommandFrame, MAX_ADDRESS_BYTES};
use crate::error::{Error, Result};
use crate::transport::Transport;

/// Length of the parameter page response
pub const PARAM_PAGE_LEN: usize = 256;

/// Byte range of the manufacturer name
pub const VENDOR_RANGE: core::ops::Range<usize> = 32..44;
/// Byte range of the device model
pub const MODEL_RANGE: core::ops::Range<usize> = 44..64;
/// Offset of the memory organization block
pub const GEOMETRY_OFFSET: usize = 80;

/// Memory organization block of the parameter page (bytes 80..102)
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct ParamGeometry {
    /// Data bytes per page
    pub bytes_per_page: U32,
    /// Spare bytes per page
    pub spare_per_page: U16,
    /// Data bytes per partial page (unused here)
    pub bytes_per_partial_page: U32,
    /// Spare bytes per partial page (unused here)
    pub spare_per_partial_page: U16,
    /// Pages per block
    pub pages_per_block: U32,
    /// Blocks per logical unit
    pub blocks_per_unit: U32,
    /// Number of logical units
    pub unit_count: u8,
    /// Address cycles: low nibble row, high nibble column
    pub address_cycles: u8,
}

impl ParamGeometry {
    /// Size of the block on the wire
    pub const LEN: usize = core::mem::size_of::<Self>();
}

/// Geometry of an attached NAND device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Geometry {
    /// Manufacturer name from the parameter page
    pub vendor: String<12>,
    /// Device model from the parameter page
    pub model: String<20>,
    /// Data bytes per page
    pub bytes_per_page: u32,
    /// Spare bytes per page
    pub spare_per_page: u32,
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
}

impl Geometry {
    /// Read the parameter page and parse it
    pub fn load<T: Transport + ?Sized>(transport: &mut T) -> Result<Self> {
        let frame = CommandFrame::with_address(opcodes::READ_PARAM_PAGE, &[0])
            .with_read_len(PARAM_PAGE_LEN as u16);
        let page = command::execute(transport, &frame)?;
        let geometry = Self::parse(&page)?;
        log::debug!(
            "geometry: {} {}: {}+{} bytes/page, {} pages/block, {} blocks/unit, {} unit(s), {} row + {} column address bytes",
            geometry.vendor,
            geometry.model,
            geometry.bytes_per_page,
            geometry.spare_per_page,
            geometry.pages_per_block,
            geometry.blocks_per_unit,
            geometry.unit_count,
            geometry.row_address_bytes,
            geometry.column_address_bytes
        );
        Ok(geometry)
    }

    /// Parse a 256-byte parameter page
    pub fn parse(page: &[u8]) -> Result<Self> {
        if page.len() < PARAM_PAGE_LEN {
            log::error!(
                "parameter page is {} bytes, expected {}",
                page.len(),
                PARAM_PAGE_LEN
            );
            return Err(Error::Protocol);
        }

        let raw = ParamGeometry::read_from_bytes(
            &page[GEOMETRY_OFFSET..GEOMETRY_OFFSET + ParamGeometry::LEN],
        )
        .map_err(|_| Error::Protocol)?;

        let geometry = Self {
            vendor: identifier(&page[VENDOR_RANGE]),
            model: identifier(&page[MODEL_RANGE]),
            bytes_per_page: raw.bytes_per_page.get(),
            spare_per_page: raw.spare_per_page.get() as u32,
            pages_per_block: raw.pages_per_block.get(),
            blocks_per_unit: raw.blocks_per_unit.get(),
            unit_count: raw.unit_count,
            row_address_bytes: raw.address_cycles & 0x0F,
            column_address_bytes: raw.address_cycles >> 4,
        };
        geometry.validate()?;
        Ok(geometry)
    }

    /// Check that the geometry describes a device the bridge can address
    ///
    /// Every column of a page, spare area included, must fit a 16-bit
    /// column address and all address cycles must fit one frame.
    pub fn validate(&self) -> Result<()> {
        if self.bytes_per_page == 0
            || self.pages_per_block == 0
            || self.blocks_per_unit == 0
            || self.unit_count == 0
        {
            log::error!("parameter page describes an empty device");
            return Err(Error::Protocol);
        }
        if (self.row_address_bytes + self.column_address_bytes) as usize > MAX_ADDRESS_BYTES {
            log::error!(
                "{} row + {} column address bytes exceed the frame limit",
                self.row_address_bytes,
                self.column_address_bytes
            );
            return Err(Error::Protocol);
        }
        if self.bytes_per_page as u64 + self.spare_per_page as u64 > u16::MAX as u64 {
            log::error!(
                "{}+{} byte pages exceed a 16-bit column address",
                self.bytes_per_page,
                self.spare_per_page
            );
            return Err(Error::Protocol);
        }
        if self.checked_total_pages().is_none() {
            log::error!("device has more pages than a 32-bit page number can address");
            return Err(Error::Protocol);
        }
        Ok(())
    }

    fn checked_total_pages(&self) -> Option<u32> {
        self.pages_per_block
            .checked_mul(self.blocks_per_unit)?
            .checked_mul(self.unit_count as u32)
    }

    /// Total number of pages on the device
    pub fn total_pages(&self) -> u32 {
        self.pages_per_block * self.blocks_per_unit * self.unit_count as u32
    }

    /// Total number of erase blocks on the device
    pub fn total_blocks(&self) -> u32 {
        self.blocks_per_unit * self.unit_count as u32
    }

    /// Bytes per page including the spare area
    pub fn raw_page_size(&self) -> usize {
        (self.bytes_per_page + self.spare_per_page) as usize
    }

    /// Data bytes per erase block
    pub fn block_size(&self) -> usize {
        self.bytes_per_page as usize * self.pages_per_block as usize
    }

    /// Data capacity of the device in bytes
    pub fn total_size(&self) -> u64 {
        self.bytes_per_page as u64 * self.total_pages() as u64
    }

    /// Block containing `page`
    pub fn block_of(&self, page: u32) -> u32 {
        page / self.pages_per_block
    }

    /// First page of `block`
    pub fn first_page(&self, block: u32) -> u32 {
        block * self.pages_per_block
    }

    /// Fail with `AddressOutOfRange` unless `page` is on the device
    pub fn check_page(&self, page: u32) -> Result<()> {
        if page >= self.total_pages() {
            return Err(Error::AddressOutOfRange);
        }
        Ok(())
    }

    /// Fail with `AddressOutOfRange` unless `block` is on the device
    pub fn check_block(&self, block: u32) -> Result<()> {
        if block >= self.total_blocks() {
            return Err(Error::AddressOutOfRange);
        }
        Ok(())
    }
}

/// Decode a space/NUL padded ASCII identifier
fn identifier<const N: usize>(raw: &[u8]) -> String<N> {
    let end = raw
        .iter()
        .rposition(|&c| c != b' ' && c != 0)
        .map_or(0, |i| i + 1);
    let mut s = String::new();
    for &c in &raw[..end] {
        let c = if c.is_ascii_graphic() || c == b' ' { c as char } else { '?' };
        if s.push(c).is_err() {
            break;
        }
    }
    s
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use alloc::vec;
    use alloc::vec::Vec;

    /// Build a parameter page for tests
    pub(crate) fn param_page(
        bytes_per_page: u32,
        spare: u16,
        pages_per_block: u32,
        blocks_per_unit: u32,
        units: u8,
        row_bytes: u8,
        col_bytes: u8,
    ) -> Vec<u8> {
        let mut page = vec![0u8; PARAM_PAGE_LEN];
        page[..4].copy_from_slice(b"ONFI");
        page[VENDOR_RANGE].copy_from_slice(b"MICRON      ");
        page[MODEL_RANGE].copy_from_slice(b"MT29F2G08ABAEAH4    ");
        let geom = ParamGeometry {
            bytes_per_page: U32::new(bytes_per_page),
            spare_per_page: U16::new(spare),
            bytes_per_partial_page: U32::new(bytes_per_page / 4),
            spare_per_partial_page: U16::new(spare / 4),
            pages_per_block: U32::new(pages_per_block),
            blocks_per_unit: U32::new(blocks_per_unit),
            unit_count: units,
            address_cycles: (col_bytes << 4) | row_bytes,
        };
        page[GEOMETRY_OFFSET..GEOMETRY_OFFSET + ParamGeometry::LEN]
            .copy_from_slice(geom.as_bytes());
        page
    }

    #[test]
    fn test_param_geometry_size() {
        assert_eq!(ParamGeometry::LEN, 22);
    }

    #[test]
    fn test_parse_micron_page() {
        let page = param_page(2048, 64, 64, 2048, 1, 3, 2);
        let g = Geometry::parse(&page).unwrap();
        assert_eq!(g.vendor.as_str(), "MICRON");
        assert_eq!(g.model.as_str(), "MT29F2G08ABAEAH4");
        assert_eq!(g.bytes_per_page, 2048);
        assert_eq!(g.spare_per_page, 64);
        assert_eq!(g.pages_per_block, 64);
        assert_eq!(g.blocks_per_unit, 2048);
        assert_eq!(g.unit_count, 1);
        assert_eq!(g.row_address_bytes, 3);
        assert_eq!(g.column_address_bytes, 2);
        assert_eq!(g.total_pages(), 64 * 2048);
        assert_eq!(g.total_blocks(), 2048);
        assert_eq!(g.raw_page_size(), 2112);
    }

    #[test]
    fn test_short_page_rejected() {
        let page = param_page(2048, 64, 64, 1024, 1, 3, 2);
        assert_eq!(Geometry::parse(&page[..255]), Err(Error::Protocol));
    }

    #[test]
    fn test_too_many_address_bytes_rejected() {
        let page = param_page(2048, 64, 64, 1024, 1, 5, 4);
        assert_eq!(Geometry::parse(&page), Err(Error::Protocol));
    }

    #[test]
    fn test_page_wider_than_column_rejected() {
        let page = param_page(65536 - 64, 64, 64, 1024, 1, 3, 2);
        assert_eq!(Geometry::parse(&page), Err(Error::Protocol));
        let page = param_page(65536 - 65, 64, 64, 1024, 1, 3, 2);
        assert!(Geometry::parse(&page).is_ok());
    }

    #[test]
    fn test_validate_catches_hand_built_geometry() {
        let mut g = Geometry::parse(&param_page(2048, 64, 64, 1024, 1, 3, 2)).unwrap();
        assert_eq!(g.validate(), Ok(()));
        g.row_address_bytes = 6;
        g.column_address_bytes = 3;
        assert_eq!(g.validate(), Err(Error::Protocol));
    }

    #[test]
    fn test_empty_device_rejected() {
        let page = param_page(2048, 64, 0, 1024, 1, 3, 2);
        assert_eq!(Geometry::parse(&page), Err(Error::Protocol));
    }

    #[test]
    fn test_load_sends_param_page_command() {
        use crate::mock::ScriptedTransport;

        let page = param_page(4096, 224, 128, 1024, 2, 3, 2);
        let mut t = ScriptedTransport::new(move |_frame| page.clone());
        let g = Geometry::load(&mut t).unwrap();
        assert_eq!(g.total_blocks(), 2048);
        assert_eq!(t.writes[0], vec![0xEC, 1, 0, 0, 0x00, 0x01, 0x00]);
    }
}
