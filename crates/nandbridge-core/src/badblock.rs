//! Bad block detection from spare-area markers
//!
//! A good block carries 0xFF in the first spare byte of its first and last
//! page. Factory-marked and worn-out blocks read back with most of those
//! bits cleared.

use alloc::vec::Vec;

use crate::error::{Error, Result};
use crate::protocol::onfi;
use crate::session::NandSession;
use crate::transport::Transport;

/// Markers with this many set bits or fewer mark the block bad
const MARKER_BAD_THRESHOLD: u32 = 4;

/// Result of a full-device bad block scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadBlockTable {
    blocks: Vec<u32>,
    total_blocks: u32,
}

impl BadBlockTable {
    /// Build a table from a list of bad block indices
    pub fn new(mut blocks: Vec<u32>, total_blocks: u32) -> Self {
        blocks.sort_unstable();
        blocks.dedup();
        Self {
            blocks,
            total_blocks,
        }
    }

    /// Whether `block` was found bad
    pub fn is_bad(&self, block: u32) -> bool {
        self.blocks.binary_search(&block).is_ok()
    }

    /// Number of bad blocks
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Whether the scan found no bad blocks
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Number of blocks scanned
    pub fn total_blocks(&self) -> u32 {
        self.total_blocks
    }

    /// Bad block indices in ascending order
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.blocks.iter().copied()
    }

    /// Bad block indices as a slice
    pub fn as_slice(&self) -> &[u32] {
        &self.blocks
    }
}

/// Read the bad block marker of `page`
///
/// Returns `None` when the device refuses to load the page.
fn read_marker<T: Transport>(nand: &mut NandSession<T>, page: u32) -> Result<Option<u8>> {
    match onfi::load_page(nand, page) {
        Ok(_) => {}
        Err(Error::Read { page }) => {
            log::warn!("page {} failed to load while reading bad block marker", page);
            return Ok(None);
        }
        Err(e) => return Err(e),
    }
    let column =
        u16::try_from(nand.geometry().bytes_per_page).map_err(|_| Error::AddressOutOfRange)?;
    let marker = onfi::read_data(nand, column, Some(1))?;
    Ok(marker.first().copied())
}

/// Check the bad block markers of `block`
///
/// Reads the first spare byte of the first and last page of the block. The
/// block is bad if either marker has [`MARKER_BAD_THRESHOLD`] or fewer bits
/// set, or if either page fails to load.
pub fn is_bad<T: Transport>(nand: &mut NandSession<T>, block: u32) -> Result<bool> {
    nand.geometry().check_block(block)?;
    let first = nand.geometry().first_page(block);
    let last = first + nand.geometry().pages_per_block - 1;

    for page in [first, last] {
        let bad = match read_marker(nand, page)? {
            Some(marker) => marker.count_ones() <= MARKER_BAD_THRESHOLD,
            None => true,
        };
        if bad {
            log::debug!("block {} is bad (marker at page {})", block, page);
            return Ok(true);
        }
    }
    Ok(false)
}

/// Check every block on the device
pub fn scan_all<T: Transport>(nand: &mut NandSession<T>) -> Result<BadBlockTable> {
    let total = nand.geometry().total_blocks();
    log::info!("Scanning {} blocks for bad block markers", total);

    let mut bad = Vec::new();
    for block in 0..total {
        if is_bad(nand, block)? {
            log::warn!("bad block {}", block);
            bad.push(block);
        }
    }

    log::info!("{} bad block(s) found", bad.len());
    Ok(BadBlockTable::new(bad, total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::opcodes;
    use crate::geometry::tests::param_page;
    use crate::geometry::Geometry;
    use crate::mock::ScriptedTransport;
    use crate::session::SessionConfig;
    use alloc::vec;

    /// Emulates marker reads: `marker(page)` gives the spare byte,
    /// `None` makes the page load fail
    fn marker_session(
        marker: impl Fn(u32) -> Option<u8> + 'static,
    ) -> NandSession<ScriptedTransport> {
        let geometry = Geometry::parse(&param_page(2048, 64, 64, 16, 1, 3, 2)).unwrap();
        let g = geometry.clone();
        let mut loaded: Option<u32> = None;
        let mut latched: Option<u32> = None;
        let responder = move |frame: &[u8]| -> Vec<u8> {
            let addr_len = frame[1] as usize;
            let read_len = u16::from_le_bytes([frame[4], frame[5]]) as usize;
            match frame[0] {
                opcodes::READ_MODE if addr_len > 0 => {
                    let row = &frame[6 + 2..6 + addr_len];
                    latched = Some(g.decode_row(row));
                    vec![]
                }
                opcodes::READ_START => {
                    loaded = latched.take();
                    vec![]
                }
                opcodes::READ_STATUS => {
                    let ok = loaded.map(|p| marker(p).is_some()).unwrap_or(true);
                    vec![if ok { 0x40 } else { 0x41 }]
                }
                opcodes::CHANGE_READ_COLUMN_START => {
                    let byte = loaded.and_then(|p| marker(p)).unwrap_or(0xFF);
                    vec![byte; read_len]
                }
                _ => vec![0xFF; read_len],
            }
        };
        NandSession::with_geometry(ScriptedTransport::new(responder), geometry, SessionConfig::default())
            .unwrap()
    }

    #[test]
    fn test_good_block() {
        let mut nand = marker_session(|_| Some(0xFF));
        assert!(!is_bad(&mut nand, 2).unwrap());
    }

    #[test]
    fn test_threshold() {
        // Four set bits is bad, five is good
        let mut nand = marker_session(|_| Some(0x0F));
        assert!(is_bad(&mut nand, 0).unwrap());
        let mut nand = marker_session(|_| Some(0x1F));
        assert!(!is_bad(&mut nand, 0).unwrap());
    }

    #[test]
    fn test_last_page_marker_checked() {
        // Block 1 spans pages 64..128
        let mut nand = marker_session(|p| if p == 127 { Some(0x00) } else { Some(0xFF) });
        assert!(is_bad(&mut nand, 1).unwrap());
        assert!(!is_bad(&mut nand, 2).unwrap());
    }

    #[test]
    fn test_load_failure_is_bad() {
        let mut nand = marker_session(|p| if p == 64 * 3 { None } else { Some(0xFF) });
        assert!(is_bad(&mut nand, 3).unwrap());
    }

    #[test]
    fn test_is_bad_deterministic() {
        let mut nand = marker_session(|p| if p / 64 == 5 { Some(0x01) } else { Some(0xFE) });
        let first = is_bad(&mut nand, 5).unwrap();
        for _ in 0..3 {
            assert_eq!(is_bad(&mut nand, 5).unwrap(), first);
        }
        assert!(first);
    }

    #[test]
    fn test_scan_all() {
        let mut nand = marker_session(|p| match p / 64 {
            3 | 11 => Some(0x00),
            _ => Some(0xFF),
        });
        let table = scan_all(&mut nand).unwrap();
        assert_eq!(table.as_slice(), &[3, 11]);
        assert_eq!(table.total_blocks(), 16);
        assert!(table.is_bad(11));
        assert!(!table.is_bad(4));
    }

    #[test]
    fn test_session_caches_scan() {
        let mut nand = marker_session(|p| if p / 64 == 7 { Some(0x00) } else { Some(0xFF) });
        assert!(nand.bad_blocks().is_none());
        assert_eq!(nand.scan_bad_blocks().unwrap().as_slice(), &[7]);

        let writes = nand.transport_mut().writes.len();
        assert_eq!(nand.scan_bad_blocks().unwrap().len(), 1);
        assert_eq!(nand.transport_mut().writes.len(), writes);
    }

    #[test]
    fn test_block_out_of_range() {
        let mut nand = marker_session(|_| Some(0xFF));
        assert_eq!(is_bad(&mut nand, 16), Err(Error::AddressOutOfRange));
    }
}
