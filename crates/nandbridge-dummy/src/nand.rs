//! Frame-level NAND emulator

use alloc::collections::{BTreeMap, VecDeque};
use alloc::vec;
use alloc::vec::Vec;

use nandbridge_core::command::{opcodes, CommandFrame};
use nandbridge_core::error::{Error, Result};
use nandbridge_core::geometry::{
    ParamGeometry, GEOMETRY_OFFSET, MODEL_RANGE, PARAM_PAGE_LEN, VENDOR_RANGE,
};
use nandbridge_core::status::Status;
use nandbridge_core::transport::Transport;
use zerocopy::byteorder::little_endian::{U16, U32};
use zerocopy::IntoBytes;

use crate::DummyConfig;

/// Misbehaviour injected into page loads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageFault {
    /// First data bit of the page register reads inverted
    BitFlip,
    /// The load reports the status error bit
    ReadError,
    /// The load reports the rewrite-recommended status bit
    RewriteRecommended,
}

/// Misbehaviour injected into page programs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramFault {
    /// The PROGRAM CONFIRM frame fails at the transport
    TransportError,
    /// The program never completes; status stays busy
    Stuck,
}

#[derive(Debug, Clone, Copy)]
struct InjectedFault {
    fault: PageFault,
    /// Loads left before the fault clears; `None` never clears
    remaining: Option<u32>,
}

/// Emulated NAND chip reached through the bridge frame format
///
/// Pages are stored sparsely; anything never programmed reads as erased.
/// Programming ANDs data into the page like real NAND cells.
pub struct DummyNand {
    config: DummyConfig,
    pages: BTreeMap<u32, Vec<u8>>,
    faults: BTreeMap<u32, InjectedFault>,
    register: Vec<u8>,
    column: usize,
    latched: Option<(usize, u32)>,
    program: Option<(usize, u32, Vec<u8>)>,
    erase_row: Option<u32>,
    failed: bool,
    rewrite: bool,
    busy: u32,
    response: VecDeque<u8>,
    frames: usize,
    erase_log: Vec<u32>,
    ecc_enabled: bool,
    program_faults: BTreeMap<u32, ProgramFault>,
    program_log: Vec<u32>,
    protect_after: Option<usize>,
}

impl DummyNand {
    /// Create a new emulated chip with the given configuration
    pub fn new(config: DummyConfig) -> Self {
        let raw = config.raw_page_size();
        let mut nand = Self {
            config,
            pages: BTreeMap::new(),
            faults: BTreeMap::new(),
            register: vec![0xFF; raw],
            column: 0,
            latched: None,
            program: None,
            erase_row: None,
            failed: false,
            rewrite: false,
            busy: 0,
            response: VecDeque::new(),
            frames: 0,
            erase_log: Vec::new(),
            ecc_enabled: false,
            program_faults: BTreeMap::new(),
            program_log: Vec::new(),
            protect_after: None,
        };
        nand.ecc_enabled = nand.config.internal_ecc;
        nand.mark_bad_blocks();
        nand
    }

    /// Create an emulated chip with the default geometry
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// Get the configuration
    pub fn config(&self) -> &DummyConfig {
        &self.config
    }

    fn mark_bad_blocks(&mut self) {
        let bytes_per_page = self.config.bytes_per_page as usize;
        let raw = self.config.raw_page_size();
        for block in self.config.bad_blocks.clone() {
            let first = block * self.config.pages_per_block;
            let last = first + self.config.pages_per_block - 1;
            for page in [first, last] {
                let mut data = vec![0xFF; raw];
                data[bytes_per_page] = 0x00;
                self.pages.insert(page, data);
            }
        }
    }

    /// Raw contents of `page` (main and spare area)
    pub fn page(&self, page: u32) -> Vec<u8> {
        self.pages
            .get(&page)
            .cloned()
            .unwrap_or_else(|| vec![0xFF; self.config.raw_page_size()])
    }

    /// Overwrite `page` directly, bypassing program semantics
    pub fn set_page(&mut self, page: u32, data: &[u8]) {
        let mut raw = vec![0xFF; self.config.raw_page_size()];
        let len = data.len().min(raw.len());
        raw[..len].copy_from_slice(&data[..len]);
        self.pages.insert(page, raw);
    }

    /// Make the next `loads` loads of `page` misbehave (`None` for every load)
    pub fn inject_fault(&mut self, page: u32, fault: PageFault, loads: Option<u32>) {
        self.faults.insert(page, InjectedFault { fault, remaining: loads });
    }

    /// Make every program of `page` misbehave
    pub fn inject_program_fault(&mut self, page: u32, fault: ProgramFault) {
        self.program_faults.insert(page, fault);
    }

    /// Assert the write-protect pin once `programs` programs have completed
    pub fn write_protect_after(&mut self, programs: usize) {
        self.protect_after = Some(programs);
    }

    /// Pages named by every PROGRAM CONFIRM received, in order
    pub fn program_log(&self) -> &[u32] {
        &self.program_log
    }

    /// Whether on-die ECC is currently on
    pub fn ecc_enabled(&self) -> bool {
        self.ecc_enabled
    }

    /// Enable or disable the write-protect pin
    pub fn set_write_protected(&mut self, protected: bool) {
        self.config.write_protected = protected;
    }

    /// Blocks erased so far, in order
    pub fn erase_log(&self) -> &[u32] {
        &self.erase_log
    }

    /// Number of frames received
    pub fn frames(&self) -> usize {
        self.frames
    }

    fn status(&mut self) -> u8 {
        let mut status = Status::empty();
        if !self.config.write_protected {
            status |= Status::WRITE_ENABLED;
        }
        if self.busy > 0 {
            self.busy -= 1;
            return status.bits();
        }
        status |= Status::READY;
        if self.failed {
            status |= Status::ERROR;
        }
        if self.rewrite {
            status |= Status::REWRITE_RECOMMENDED;
        }
        status.bits()
    }

    fn start_operation(&mut self) {
        self.failed = false;
        self.rewrite = false;
        self.busy = self.config.busy_polls;
    }

    /// Split an address into column and row
    fn decode_address(&self, address: &[u8]) -> (usize, u32) {
        let col_bytes = (self.config.column_address_bytes as usize).min(address.len());
        let column = le_value(&address[..col_bytes]) as usize;
        let row = le_value(&address[col_bytes..]) as u32;
        (column, row)
    }

    fn param_page(&self) -> Vec<u8> {
        let mut page = vec![0u8; PARAM_PAGE_LEN];
        page[..4].copy_from_slice(opcodes::ONFI_SIGNATURE);
        fill_identifier(&mut page[VENDOR_RANGE], self.config.vendor);
        fill_identifier(&mut page[MODEL_RANGE], self.config.model);
        let geom = ParamGeometry {
            bytes_per_page: U32::new(self.config.bytes_per_page),
            spare_per_page: U16::new(self.config.spare_per_page),
            bytes_per_partial_page: U32::new(self.config.bytes_per_page / 4),
            spare_per_partial_page: U16::new(self.config.spare_per_page / 4),
            pages_per_block: U32::new(self.config.pages_per_block),
            blocks_per_unit: U32::new(self.config.blocks_per_unit),
            unit_count: self.config.unit_count,
            address_cycles: (self.config.column_address_bytes << 4)
                | self.config.row_address_bytes,
        };
        page[GEOMETRY_OFFSET..GEOMETRY_OFFSET + ParamGeometry::LEN].copy_from_slice(geom.as_bytes());
        page
    }

    fn handle_read_id(&mut self, frame: &CommandFrame<'_>) -> Vec<u8> {
        let mut id = match frame.address.first() {
            Some(&opcodes::READ_ID_ONFI) if self.config.onfi => opcodes::ONFI_SIGNATURE.to_vec(),
            Some(&opcodes::READ_ID_JEDEC) => {
                let ecc = if self.ecc_enabled {
                    opcodes::ID_ECC_ENABLED
                } else {
                    0
                };
                vec![
                    self.config.manufacturer_id,
                    self.config.device_id,
                    0x90,
                    0x95,
                    0x06 | ecc,
                ]
            }
            _ => Vec::new(),
        };
        id.resize(frame.read_len as usize, 0);
        id
    }

    fn handle_read_start(&mut self) {
        self.start_operation();
        let Some((column, page)) = self.latched.take() else {
            log::warn!("dummy: READ START without an address");
            self.failed = true;
            return;
        };
        if page >= self.config.total_pages() {
            self.failed = true;
            return;
        }

        self.register = self.page(page);
        self.column = column;

        if let Some(injected) = self.faults.get_mut(&page) {
            match injected.fault {
                PageFault::BitFlip => self.register[0] ^= 0x01,
                PageFault::ReadError => self.failed = true,
                PageFault::RewriteRecommended => self.rewrite = true,
            }
            if let Some(remaining) = injected.remaining.as_mut() {
                *remaining = remaining.saturating_sub(1);
                if *remaining == 0 {
                    self.faults.remove(&page);
                }
            }
        }
    }

    fn read_register(&mut self, len: usize) -> Vec<u8> {
        let mut out = vec![0xFF; len];
        let start = self.column.min(self.register.len());
        let end = (self.column + len).min(self.register.len());
        out[..end - start].copy_from_slice(&self.register[start..end]);
        self.column += len;
        out
    }

    fn handle_erase_confirm(&mut self) {
        self.start_operation();
        let Some(row) = self.erase_row.take() else {
            self.failed = true;
            return;
        };
        let block = row / self.config.pages_per_block;
        if self.config.write_protected
            || block >= self.config.total_blocks()
            || self.config.bad_blocks.contains(&block)
            || self.config.erase_failures.contains(&block)
        {
            self.failed = true;
            return;
        }
        let first = block * self.config.pages_per_block;
        let end = first + self.config.pages_per_block;
        self.pages.retain(|&p, _| !(first..end).contains(&p));
        self.erase_log.push(block);
    }

    fn handle_set_features(&mut self, frame: &CommandFrame<'_>) {
        self.start_operation();
        match (frame.address.first(), frame.out_data.first()) {
            (Some(&opcodes::FEATURE_ARRAY_OPERATION_MODE), Some(&mode)) => {
                if self.config.ecc_supported {
                    self.ecc_enabled = mode & opcodes::ARRAY_MODE_INTERNAL_ECC[0] != 0;
                }
            }
            (feature, _) => log::debug!("dummy: ignoring SET FEATURES {:02X?}", feature),
        }
    }

    fn handle_program_confirm(&mut self) -> Result<()> {
        self.start_operation();
        let Some((column, page, data)) = self.program.take() else {
            self.failed = true;
            return Ok(());
        };
        self.program_log.push(page);
        match self.program_faults.get(&page) {
            Some(ProgramFault::TransportError) => {
                log::error!("dummy: injected transport failure programming page {}", page);
                return Err(Error::Transport);
            }
            Some(ProgramFault::Stuck) => {
                self.busy = u32::MAX;
                return Ok(());
            }
            None => {}
        }
        if self.config.write_protected || page >= self.config.total_pages() {
            self.failed = true;
            return Ok(());
        }
        let raw = self.config.raw_page_size();
        let cells = self.pages.entry(page).or_insert_with(|| vec![0xFF; raw]);
        for (cell, byte) in cells.iter_mut().skip(column).zip(data) {
            *cell &= byte;
        }
        if self.protect_after.is_some_and(|n| self.program_log.len() >= n) {
            self.config.write_protected = true;
        }
        Ok(())
    }

    fn handle_frame(&mut self, frame: &CommandFrame<'_>) -> Result<Vec<u8>> {
        let read_len = frame.read_len as usize;
        let response = match frame.opcode {
            opcodes::RESET => {
                self.start_operation();
                self.latched = None;
                self.program = None;
                self.erase_row = None;
                Vec::new()
            }
            opcodes::READ_ID => self.handle_read_id(frame),
            opcodes::READ_PARAM_PAGE => {
                let mut page = self.param_page();
                page.resize(read_len, 0);
                page
            }
            opcodes::READ_STATUS => {
                let status = self.status();
                vec![status; read_len]
            }
            opcodes::READ_MODE if !frame.address.is_empty() => {
                self.latched = Some(self.decode_address(frame.address));
                Vec::new()
            }
            opcodes::READ_MODE => self.read_register(read_len),
            opcodes::READ_START => {
                self.handle_read_start();
                Vec::new()
            }
            opcodes::CHANGE_READ_COLUMN => {
                self.column = le_value(frame.address) as usize;
                Vec::new()
            }
            opcodes::CHANGE_READ_COLUMN_START => self.read_register(read_len),
            opcodes::ERASE_SETUP => {
                self.erase_row = Some(le_value(frame.address) as u32);
                Vec::new()
            }
            opcodes::ERASE_CONFIRM => {
                self.handle_erase_confirm();
                Vec::new()
            }
            opcodes::PROGRAM_SETUP => {
                let (column, page) = self.decode_address(frame.address);
                self.program = Some((column, page, frame.out_data.to_vec()));
                Vec::new()
            }
            opcodes::PROGRAM_CONFIRM => {
                self.handle_program_confirm()?;
                Vec::new()
            }
            opcodes::SET_FEATURES => {
                self.handle_set_features(frame);
                Vec::new()
            }
            op => {
                log::error!("dummy: unsupported opcode 0x{:02X}", op);
                return Err(Error::Protocol);
            }
        };
        Ok(response)
    }
}

impl Transport for DummyNand {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        let frame = CommandFrame::decode(data)?;
        self.frames += 1;
        let response = self.handle_frame(&frame)?;
        self.response.extend(response);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        if self.response.len() < buf.len() {
            log::error!(
                "dummy: read of {} bytes with {} pending",
                buf.len(),
                self.response.len()
            );
            self.response.clear();
            return Err(Error::Transport);
        }
        let n = buf.len();
        for (dst, src) in buf.iter_mut().zip(self.response.drain(..n)) {
            *dst = src;
        }
        Ok(())
    }
}

fn le_value(bytes: &[u8]) -> u64 {
    let mut le = [0u8; 8];
    let n = bytes.len().min(8);
    le[..n].copy_from_slice(&bytes[..n]);
    u64::from_le_bytes(le)
}

fn fill_identifier(field: &mut [u8], value: &str) {
    field.fill(b' ');
    let len = value.len().min(field.len());
    field[..len].copy_from_slice(&value.as_bytes()[..len]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use nandbridge_core::command::execute;

    fn send(nand: &mut DummyNand, frame: CommandFrame<'_>) -> Vec<u8> {
        execute(nand, &frame).unwrap()
    }

    #[test]
    fn test_read_id() {
        let mut nand = DummyNand::new_default();
        let sig = send(&mut nand, CommandFrame::with_address(opcodes::READ_ID, &[0x20]).with_read_len(4));
        assert_eq!(sig, b"ONFI");
        let id = send(&mut nand, CommandFrame::with_address(opcodes::READ_ID, &[0x00]).with_read_len(2));
        assert_eq!(id, vec![0x2C, 0xDA]);
    }

    #[test]
    fn test_set_features_enables_ecc() {
        let mut nand = DummyNand::new_default();
        let id = |n: &mut DummyNand| {
            send(n, CommandFrame::with_address(opcodes::READ_ID, &[0x00]).with_read_len(5))
        };
        assert_eq!(id(&mut nand)[4], 0x06);
        send(
            &mut nand,
            CommandFrame::write(opcodes::SET_FEATURES, &[0x90], &[0x08, 0, 0, 0]),
        );
        assert!(nand.ecc_enabled());
        assert_eq!(id(&mut nand)[4], 0x86);
    }

    #[test]
    fn test_program_log_and_transport_fault() {
        let mut nand = DummyNand::new_default();
        nand.inject_program_fault(7, ProgramFault::TransportError);
        let addr = [0, 0, 7, 0, 0];
        send(&mut nand, CommandFrame::write(opcodes::PROGRAM_SETUP, &addr, &[0]));
        let confirm = CommandFrame::simple(opcodes::PROGRAM_CONFIRM);
        assert_eq!(execute(&mut nand, &confirm), Err(Error::Transport));
        assert_eq!(nand.program_log(), &[7]);
        assert_eq!(nand.page(7)[0], 0xFF);
    }

    #[test]
    fn test_program_ands_into_page() {
        let mut nand = DummyNand::new_default();
        let addr = [0, 0, 5, 0, 0];
        send(&mut nand, CommandFrame::write(opcodes::PROGRAM_SETUP, &addr, &[0xF0, 0x0F]));
        send(&mut nand, CommandFrame::simple(opcodes::PROGRAM_CONFIRM));
        send(&mut nand, CommandFrame::write(opcodes::PROGRAM_SETUP, &addr, &[0x3C, 0xFF]));
        send(&mut nand, CommandFrame::simple(opcodes::PROGRAM_CONFIRM));
        assert_eq!(&nand.page(5)[..3], &[0x30, 0x0F, 0xFF]);
    }

    #[test]
    fn test_read_with_column_change() {
        let mut nand = DummyNand::new_default();
        let mut data = vec![0u8; 2112];
        data[2048] = 0xA5;
        data[2049] = 0x5A;
        nand.set_page(3, &data);

        send(&mut nand, CommandFrame::with_address(opcodes::READ_MODE, &[0, 0, 3, 0, 0]));
        send(&mut nand, CommandFrame::simple(opcodes::READ_START));
        assert_eq!(send(&mut nand, CommandFrame::read(opcodes::READ_STATUS, 1)), vec![0xC0]);
        send(&mut nand, CommandFrame::simple(opcodes::READ_MODE));
        send(&mut nand, CommandFrame::with_address(opcodes::CHANGE_READ_COLUMN, &[0x00, 0x08]));
        let out = send(&mut nand, CommandFrame::read(opcodes::CHANGE_READ_COLUMN_START, 2));
        assert_eq!(out, vec![0xA5, 0x5A]);
    }

    #[test]
    fn test_erase_bad_block_fails() {
        let mut nand = DummyNand::new(DummyConfig {
            bad_blocks: vec![2],
            ..DummyConfig::default()
        });
        send(&mut nand, CommandFrame::with_address(opcodes::ERASE_SETUP, &[128, 0, 0]));
        send(&mut nand, CommandFrame::simple(opcodes::ERASE_CONFIRM));
        assert_eq!(send(&mut nand, CommandFrame::read(opcodes::READ_STATUS, 1)), vec![0xC1]);
        assert!(nand.erase_log().is_empty());
        assert_eq!(nand.page(128)[2048], 0x00);
    }

    #[test]
    fn test_busy_polls() {
        let mut nand = DummyNand::new(DummyConfig {
            busy_polls: 2,
            ..DummyConfig::default()
        });
        send(&mut nand, CommandFrame::simple(opcodes::RESET));
        let status = |n: &mut DummyNand| send(n, CommandFrame::read(opcodes::READ_STATUS, 1))[0];
        assert_eq!(status(&mut nand), 0x80);
        assert_eq!(status(&mut nand), 0x80);
        assert_eq!(status(&mut nand), 0xC0);
    }

    #[test]
    fn test_write_protect_clears_status_bit() {
        let mut nand = DummyNand::new_default();
        nand.set_write_protected(true);
        assert_eq!(send(&mut nand, CommandFrame::read(opcodes::READ_STATUS, 1)), vec![0x40]);
    }

    #[test]
    fn test_unknown_opcode_rejected() {
        let mut nand = DummyNand::new_default();
        assert_eq!(nand.write(&[0x42, 0, 0, 0, 0, 0]), Err(Error::Protocol));
    }
}
