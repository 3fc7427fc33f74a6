//! Image allocator: spread an image across good blocks and index it
//!
//! An image is written page by page into good blocks following the block
//! that holds the index page. The index page then receives the list of
//! blocks used, as little-endian `u32` entries terminated by
//! [`INDEX_SENTINEL`]. Bytes of the index page beyond that record are kept
//! from its previous contents.
//!
//! Every image page also gets [`PAGE_MARK`] programmed at spare offset
//! [`PAGE_MARK_OFFSET`], clear of the bad-block marker byte. Reading back
//! trims trailing pages only when they are erased and unmarked, so an image
//! that ends in 0xFF pages keeps its length. Parts with too little spare
//! area to hold the mark fall back to trimming every trailing erased page.
//!
//! Rewriting the index erases the whole block that contains the index page.
//! Any other data stored in that block is lost, and a power failure between
//! the erase and the program leaves the device without a valid index.

use alloc::vec;
use alloc::vec::Vec;

use crate::badblock;
use crate::error::{Error, Result};
use crate::protocol::onfi;
use crate::session::NandSession;
use crate::transport::Transport;

/// Terminates the block list in the index record
pub const INDEX_SENTINEL: u32 = 0xFFFF_FFFF;

/// Spare-area offset of the image page mark
pub const PAGE_MARK_OFFSET: usize = 2;

/// Value programmed at [`PAGE_MARK_OFFSET`] on every image page
pub const PAGE_MARK: u8 = 0x00;

/// Statistics from an image or block write
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageStats {
    /// Blocks erased, including the index block
    pub blocks_erased: usize,
    /// Blocks passed over because they were bad or failed to erase
    pub blocks_skipped: usize,
    /// Pages programmed and verified
    pub pages_written: usize,
    /// Page writes that had to be repeated
    pub retries: usize,
}

/// Progress callbacks for image operations
pub trait ImageProgress {
    /// Called when starting to write `total_pages` pages
    fn writing(&mut self, total_pages: usize);

    /// Called before erasing `block`
    fn erasing(&mut self, block: u32);

    /// Called after each page verifies
    fn page_written(&mut self, pages_written: usize);

    /// Called when a page write failed and will be attempted again
    fn retry(&mut self, page: u32, attempt: u32, error: Error);

    /// Called when starting to read `total_pages` pages
    fn reading(&mut self, total_pages: usize);

    /// Called after each page is read
    fn page_read(&mut self, pages_read: usize);

    /// Called when a write completes
    fn complete(&mut self, stats: &ImageStats);
}

/// A no-op progress reporter
pub struct NoProgress;

impl ImageProgress for NoProgress {
    fn writing(&mut self, _total_pages: usize) {}
    fn erasing(&mut self, _block: u32) {}
    fn page_written(&mut self, _pages_written: usize) {}
    fn retry(&mut self, _page: u32, _attempt: u32, _error: Error) {}
    fn reading(&mut self, _total_pages: usize) {}
    fn page_read(&mut self, _pages_read: usize) {}
    fn complete(&mut self, _stats: &ImageStats) {}
}

/// Most block entries an index page of `bytes_per_page` bytes can hold
pub fn index_capacity(bytes_per_page: u32) -> usize {
    (bytes_per_page as usize / 4).saturating_sub(1)
}

/// Splice a block list into an index page
///
/// `page` holds the previous contents of the index page's main area. The
/// list and sentinel overwrite its start; the rest is left untouched.
pub fn encode_index(blocks: &[u32], page: &mut [u8]) -> Result<()> {
    let needed = (blocks.len() + 1) * 4;
    if needed > page.len() {
        return Err(Error::IndexOverflow);
    }
    let entries = blocks.iter().copied().chain(core::iter::once(INDEX_SENTINEL));
    for (slot, value) in page.chunks_exact_mut(4).zip(entries) {
        slot.copy_from_slice(&value.to_le_bytes());
    }
    Ok(())
}

/// Decode the block list at the start of an index page
///
/// Stops at the sentinel, at the first entry that is not a block on the
/// device, or at the end of `page`.
pub fn decode_index(page: &[u8], total_blocks: u32) -> Vec<u32> {
    page.chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .take_while(|&b| b != INDEX_SENTINEL && b < total_blocks)
        .collect()
}

/// Bytes programmed per image page: the main area, then the spare up to the mark
fn marked_page_len(bytes_per_page: usize, spare_per_page: u32) -> usize {
    if (spare_per_page as usize) > PAGE_MARK_OFFSET {
        bytes_per_page + PAGE_MARK_OFFSET + 1
    } else {
        bytes_per_page
    }
}

/// Whether a page read as `raw` carries the image page mark
///
/// Up to half the mark's bits may have flipped.
fn is_marked(raw: &[u8], bytes_per_page: usize) -> bool {
    raw.get(bytes_per_page + PAGE_MARK_OFFSET)
        .is_some_and(|&b| (b ^ PAGE_MARK).count_ones() <= 4)
}

/// Read the main area of `page`, treating a failed load as erased
fn read_main_area<T: Transport>(nand: &mut NandSession<T>, page: u32) -> Result<Vec<u8>> {
    let bytes_per_page = nand.geometry().bytes_per_page as usize;
    match onfi::load_page(nand, page) {
        Ok(_) => onfi::read_data(nand, 0, Some(bytes_per_page)),
        Err(Error::Read { .. }) => {
            log::warn!("index page {} unreadable, previous contents not kept", page);
            Ok(vec![0xFF; bytes_per_page])
        }
        Err(e) => Err(e),
    }
}

/// Fail early on a write-protected device instead of failing every erase
fn ensure_writable<T: Transport>(nand: &mut NandSession<T>) -> Result<()> {
    if !onfi::read_status(nand)?.is_write_enabled() {
        log::error!("device is write protected");
        return Err(Error::WriteProtected);
    }
    Ok(())
}

fn block_is_bad<T: Transport>(nand: &mut NandSession<T>, block: u32) -> Result<bool> {
    if let Some(table) = nand.bad_blocks() {
        return Ok(table.is_bad(block));
    }
    badblock::is_bad(nand, block)
}

/// Program one page with verify, repeating retryable failures
///
/// The attempt budget comes from the session config.
fn write_page_with_retry<T: Transport>(
    nand: &mut NandSession<T>,
    page: u32,
    data: &[u8],
    progress: &mut impl ImageProgress,
    stats: &mut ImageStats,
) -> Result<()> {
    let max_attempts = nand.config().max_write_retries.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match onfi::program_with_verify(nand, page, data) {
            Ok(_) => {
                stats.pages_written += 1;
                return Ok(());
            }
            Err(e) if e.is_retryable() => {
                if attempt >= max_attempts {
                    log::error!("page {}: {} after {} attempts", page, e, attempt);
                    return Err(Error::WriteExhausted {
                        page,
                        attempts: attempt,
                    });
                }
                log::warn!("page {}: {}, retrying ({}/{})", page, e, attempt, max_attempts);
                stats.retries += 1;
                progress.retry(page, attempt, e);
            }
            Err(e) => return Err(e),
        }
    }
}

/// Find, erase and return the first usable block at or after `from`
fn next_good_block<T: Transport>(
    nand: &mut NandSession<T>,
    from: u32,
    progress: &mut impl ImageProgress,
    stats: &mut ImageStats,
) -> Result<u32> {
    let total = nand.geometry().total_blocks();
    let mut block = from;
    while block < total {
        if block_is_bad(nand, block)? {
            log::warn!("skipping bad block {}", block);
            stats.blocks_skipped += 1;
            block += 1;
            continue;
        }
        progress.erasing(block);
        let status = onfi::erase_block(nand, block)?;
        stats.blocks_erased += 1;
        if status.is_error() {
            log::warn!("skipping block {} after failed erase", block);
            stats.blocks_skipped += 1;
            block += 1;
            continue;
        }
        return Ok(block);
    }
    log::error!("ran out of good blocks searching from block {}", from);
    Err(Error::OutOfSpace)
}

/// Write `data` after the index block and record the blocks used
///
/// The last page is zero-padded. Returns the block list written to
/// `index_page`.
pub fn write_image<T: Transport>(
    nand: &mut NandSession<T>,
    index_page: u32,
    data: &[u8],
    progress: &mut impl ImageProgress,
) -> Result<Vec<u32>> {
    nand.geometry().check_page(index_page)?;
    let bytes_per_page = nand.geometry().bytes_per_page as usize;
    let page_len = marked_page_len(bytes_per_page, nand.geometry().spare_per_page);
    let pages_per_block = nand.geometry().pages_per_block;
    let index_block = nand.geometry().block_of(index_page);
    let capacity = index_capacity(nand.geometry().bytes_per_page);
    ensure_writable(nand)?;

    let mut index_record = read_main_area(nand, index_page)?;

    let total_pages = data.len().div_ceil(bytes_per_page);
    log::info!(
        "Writing {} bytes ({} pages) with index at page {}",
        data.len(),
        total_pages,
        index_page
    );
    progress.writing(total_pages);

    let mut stats = ImageStats::default();
    let mut used: Vec<u32> = Vec::new();
    let mut next_block = index_block + 1;
    let mut page = 0u32;
    let mut buf = vec![0xFFu8; page_len];
    if page_len > bytes_per_page {
        buf[bytes_per_page + PAGE_MARK_OFFSET] = PAGE_MARK;
    }

    for (i, chunk) in data.chunks(bytes_per_page).enumerate() {
        if i == 0 || page % pages_per_block == 0 {
            if used.len() >= capacity {
                log::error!("index page holds at most {} blocks", capacity);
                return Err(Error::IndexOverflow);
            }
            let block = next_good_block(nand, next_block, progress, &mut stats)?;
            used.push(block);
            next_block = block + 1;
            page = nand.geometry().first_page(block);
        }

        buf[..chunk.len()].copy_from_slice(chunk);
        buf[chunk.len()..bytes_per_page].fill(0);
        write_page_with_retry(nand, page, &buf, progress, &mut stats)?;
        progress.page_written(i + 1);
        page += 1;
    }

    encode_index(&used, &mut index_record)?;

    if !used.contains(&index_block) {
        progress.erasing(index_block);
        let status = onfi::erase_block(nand, index_block)?;
        stats.blocks_erased += 1;
        if status.is_error() {
            return Err(Error::EraseFailed { block: index_block });
        }
    }
    write_page_with_retry(nand, index_page, &index_record, progress, &mut stats)?;

    log::info!(
        "Image written to {} block(s): {:?} ({} retries, {} blocks skipped)",
        used.len(),
        used,
        stats.retries,
        stats.blocks_skipped
    );
    progress.complete(&stats);
    Ok(used)
}

/// Read back the image indexed at `index_page`
///
/// Reads every page of every listed block, then drops trailing pages that
/// read back fully erased and lack the image page mark. The result is the
/// written image zero-padded to a whole page.
pub fn read_image<T: Transport>(
    nand: &mut NandSession<T>,
    index_page: u32,
    progress: &mut impl ImageProgress,
) -> Result<Vec<u8>> {
    nand.geometry().check_page(index_page)?;
    let bytes_per_page = nand.geometry().bytes_per_page as usize;
    let page_len = marked_page_len(bytes_per_page, nand.geometry().spare_per_page);
    let pages_per_block = nand.geometry().pages_per_block;

    onfi::load_page(nand, index_page)?;
    let record = onfi::read_data(nand, 0, Some(bytes_per_page))?;
    let blocks = decode_index(&record, nand.geometry().total_blocks());
    log::info!("Index at page {} lists {} block(s): {:?}", index_page, blocks.len(), blocks);

    progress.reading(blocks.len() * pages_per_block as usize);
    let mut out = Vec::with_capacity(blocks.len() * nand.geometry().block_size());
    let mut marked = Vec::with_capacity(blocks.len() * pages_per_block as usize);
    for block in blocks {
        let first = nand.geometry().first_page(block);
        for page in first..first + pages_per_block {
            onfi::load_page(nand, page)?;
            let raw = onfi::read_data(nand, 0, Some(page_len))?;
            marked.push(is_marked(&raw, bytes_per_page));
            out.extend_from_slice(&raw[..bytes_per_page]);
            progress.page_read(marked.len());
        }
    }

    let kept = trim_erased_pages(&out, &marked, bytes_per_page);
    log::debug!("dropped {} trailing erased bytes", out.len() - kept);
    out.truncate(kept);
    Ok(out)
}

/// Length of `data` without its trailing unmarked all-0xFF pages
///
/// `marked` holds one flag per page of `data`.
fn trim_erased_pages(data: &[u8], marked: &[bool], bytes_per_page: usize) -> usize {
    let mut end = data.len();
    for &mark in marked.iter().rev() {
        if mark || end < bytes_per_page {
            break;
        }
        if data[end - bytes_per_page..end].iter().any(|&b| b != 0xFF) {
            break;
        }
        end -= bytes_per_page;
    }
    end
}

/// Erase `block` and program `data` into it from its first page
///
/// `data` must fit in the block's main area; the last page is zero-padded.
pub fn write_block<T: Transport>(
    nand: &mut NandSession<T>,
    block: u32,
    data: &[u8],
    progress: &mut impl ImageProgress,
) -> Result<ImageStats> {
    nand.geometry().check_block(block)?;
    if data.len() > nand.geometry().block_size() {
        return Err(Error::ImageTooLarge);
    }
    let bytes_per_page = nand.geometry().bytes_per_page as usize;
    let first = nand.geometry().first_page(block);
    ensure_writable(nand)?;

    let mut stats = ImageStats::default();
    progress.erasing(block);
    let status = onfi::erase_block(nand, block)?;
    stats.blocks_erased += 1;
    if status.is_error() {
        return Err(Error::EraseFailed { block });
    }

    progress.writing(data.len().div_ceil(bytes_per_page));
    let mut buf = vec![0u8; bytes_per_page];
    for (i, chunk) in data.chunks(bytes_per_page).enumerate() {
        buf[..chunk.len()].copy_from_slice(chunk);
        buf[chunk.len()..].fill(0);
        write_page_with_retry(nand, first + i as u32, &buf, progress, &mut stats)?;
        progress.page_written(i + 1);
    }

    log::info!("Wrote {} pages to block {}", stats.pages_written, block);
    progress.complete(&stats);
    Ok(stats)
}
