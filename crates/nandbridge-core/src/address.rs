//! Logical page number to address cycle translation
//!
//! A NAND address is sent column first, then row, each little-endian and
//! truncated to the cycle counts from the parameter page. The row address is
//! the logical page number itself (block and page-in-block concatenated).

use core::ops::Deref;

use crate::command::MAX_ADDRESS_BYTES;
use crate::geometry::Geometry;

/// Address cycles for one command frame
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct NandAddress {
    bytes: [u8; MAX_ADDRESS_BYTES],
    len: u8,
}

impl NandAddress {
    fn push_le(&mut self, value: u64, count: u8) {
        let le = value.to_le_bytes();
        let start = self.len as usize;
        let count = count as usize;
        self.bytes[start..start + count].copy_from_slice(&le[..count]);
        self.len += count as u8;
    }

    /// Address bytes in transmission order
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }
}

impl Deref for NandAddress {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl core::fmt::Debug for NandAddress {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "NandAddress({:02X?})", self.as_slice())
    }
}

impl Geometry {
    /// Row address cycles for `page` (used alone for block erase)
    pub fn row_address(&self, page: u32) -> NandAddress {
        let mut addr = NandAddress::default();
        addr.push_le(page as u64, self.row_address_bytes);
        addr
    }

    /// Full address for `page` starting at column 0
    pub fn page_address(&self, page: u32) -> NandAddress {
        self.page_address_at(page, 0)
    }

    /// Full address for `page` starting at byte `column`
    pub fn page_address_at(&self, page: u32, column: u16) -> NandAddress {
        let mut addr = NandAddress::default();
        addr.push_le(column as u64, self.column_address_bytes);
        addr.push_le(page as u64, self.row_address_bytes);
        addr
    }

    /// Page number carried by row address cycles
    ///
    /// Inverse of [`row_address`](Self::row_address) for pages that fit the
    /// row width.
    pub fn decode_row(&self, row: &[u8]) -> u32 {
        let mut le = [0u8; 8];
        let n = row.len().min(8);
        le[..n].copy_from_slice(&row[..n]);
        u64::from_le_bytes(le) as u32
    }
}

#[cfg(test)]
mod tests {
    use crate::geometry::tests::param_page;
    use crate::geometry::Geometry;

    fn geometry() -> Geometry {
        Geometry::parse(&param_page(2048, 64, 64, 1024, 1, 3, 2)).unwrap()
    }

    #[test]
    fn test_page_address_layout() {
        let g = geometry();
        // Page 0x012345: two zero column bytes, then three row bytes LE
        assert_eq!(g.page_address(0x012345).as_slice(), &[0, 0, 0x45, 0x23, 0x01]);
        assert_eq!(g.row_address(0x012345).as_slice(), &[0x45, 0x23, 0x01]);
    }

    #[test]
    fn test_column_offset() {
        let g = geometry();
        assert_eq!(g.page_address_at(1, 2048).as_slice(), &[0x00, 0x08, 1, 0, 0]);
    }

    #[test]
    fn test_row_address_round_trips_for_every_block_start() {
        let g = geometry();
        for block in 0..g.total_blocks() {
            let page = g.first_page(block) + block % g.pages_per_block;
            let row = g.row_address(page);
            assert_eq!(row.len(), 3);
            assert_eq!(g.decode_row(&row), page);
        }
    }

    #[test]
    fn test_row_truncated_to_configured_width() {
        let g = Geometry::parse(&param_page(512, 16, 32, 64, 1, 2, 1)).unwrap();
        let row = g.row_address(0x0001_0203);
        assert_eq!(row.as_slice(), &[0x03, 0x02]);
        assert_eq!(g.page_address(5).as_slice(), &[0, 5, 0]);
    }
}
