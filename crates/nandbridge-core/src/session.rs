//! Session - the open connection to one NAND device
//!
//! A session owns the transport and the geometry read at open time. Every
//! operation in [`protocol`](crate::protocol), [`badblock`](crate::badblock)
//! and [`image`](crate::image) borrows the session mutably, so two flash
//! operations can never be in flight on the same device.

use alloc::vec::Vec;

use crate::badblock::BadBlockTable;
use crate::command::{self, opcodes, CommandFrame};
use crate::error::Result;
use crate::geometry::Geometry;
use crate::protocol::onfi;
use crate::transport::Transport;

/// Default bound on page write attempts in the image allocator
pub const DEFAULT_WRITE_RETRIES: u32 = 5;

/// Default bound on status polls before giving up
pub const DEFAULT_STATUS_POLLS: u32 = 100_000;

/// Tunables for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Attempts per page before a write is abandoned
    pub max_write_retries: u32,
    /// Status reads before `Error::Timeout`; `None` polls forever
    pub max_status_polls: Option<u32>,
    /// Require the ONFI signature from READ ID at open
    pub check_onfi_signature: bool,
    /// Send RESET before identifying the device
    pub reset_on_open: bool,
    /// Switch on the on-die ECC of known Micron parts at open
    pub enable_internal_ecc: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_write_retries: DEFAULT_WRITE_RETRIES,
            max_status_polls: Some(DEFAULT_STATUS_POLLS),
            check_onfi_signature: true,
            reset_on_open: true,
            enable_internal_ecc: true,
        }
    }
}

/// Command state of the chip as last driven by this session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChipState {
    /// No operation in progress
    #[default]
    Idle,
    /// Address latched, waiting for the second command cycle
    AddressLoaded,
    /// Page register holds a page, data can be read out
    Reading,
    /// Program in progress
    Programming,
    /// Erase in progress
    Erasing,
}

/// Open connection to a NAND device behind a bridge
pub struct NandSession<T: Transport> {
    transport: T,
    geometry: Geometry,
    config: SessionConfig,
    state: ChipState,
    jedec_id: Option<(u8, u8)>,
    internal_ecc: bool,
    bad_blocks: Option<BadBlockTable>,
}

impl<T: Transport> NandSession<T> {
    /// Identify the device and read its geometry
    ///
    /// Resets the chip, checks the ONFI signature, reads the JEDEC id
    /// (enabling on-die ECC on parts that have it) according to `config`,
    /// then parses the parameter page.
    pub fn open(transport: T, config: SessionConfig) -> Result<Self> {
        let mut transport = transport;

        if config.reset_on_open {
            let status = onfi::reset(&mut transport, config.max_status_polls)?;
            log::debug!("reset complete, status {}", status);
        }

        if config.check_onfi_signature {
            onfi::check_onfi_signature(&mut transport)?;
        }

        let (id, internal_ecc) = if config.enable_internal_ecc {
            onfi::enable_internal_ecc(&mut transport, config.max_status_polls)?
        } else {
            let id = onfi::read_id(&mut transport, opcodes::READ_ID_JEDEC, 2)?;
            (id, false)
        };
        let geometry = Geometry::load(&mut transport)?;

        log::info!(
            "Found {} {} (JEDEC {:02X} {:02X}{}), {} blocks of {} x {} bytes",
            geometry.vendor,
            geometry.model,
            id[0],
            id[1],
            if internal_ecc { ", on-die ECC" } else { "" },
            geometry.total_blocks(),
            geometry.pages_per_block,
            geometry.bytes_per_page
        );

        let mut session = Self::with_geometry(transport, geometry, config)?;
        session.jedec_id = Some((id[0], id[1]));
        session.internal_ecc = internal_ecc;
        Ok(session)
    }

    /// Create a session for a device whose geometry is already known
    ///
    /// The geometry goes through the same checks as a parsed parameter page.
    pub fn with_geometry(transport: T, geometry: Geometry, config: SessionConfig) -> Result<Self> {
        geometry.validate()?;
        Ok(Self {
            transport,
            geometry,
            config,
            state: ChipState::Idle,
            jedec_id: None,
            internal_ecc: false,
            bad_blocks: None,
        })
    }

    /// Device geometry
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Session tunables
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Command state last driven by this session
    pub fn state(&self) -> ChipState {
        self.state
    }

    /// Manufacturer and device id read at open
    pub fn jedec_id(&self) -> Option<(u8, u8)> {
        self.jedec_id
    }

    /// Whether on-die ECC was confirmed enabled at open
    pub fn internal_ecc(&self) -> bool {
        self.internal_ecc
    }

    /// Bad block table, if a full scan has been run
    pub fn bad_blocks(&self) -> Option<&BadBlockTable> {
        self.bad_blocks.as_ref()
    }

    /// Scan the device once and keep the result
    ///
    /// Later calls return the stored table without touching the device.
    pub fn scan_bad_blocks(&mut self) -> Result<&BadBlockTable> {
        let table = match self.bad_blocks.take() {
            Some(table) => table,
            None => crate::badblock::scan_all(self)?,
        };
        let table: &BadBlockTable = self.bad_blocks.insert(table);
        Ok(table)
    }

    /// Borrow the transport
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Close the session and return the transport
    pub fn into_transport(self) -> T {
        self.transport
    }

    pub(crate) fn execute(&mut self, frame: &CommandFrame<'_>) -> Result<Vec<u8>> {
        command::execute(&mut self.transport, frame)
    }

    pub(crate) fn set_state(&mut self, state: ChipState) {
        if self.state != state {
            log::trace!("chip state {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::geometry::tests::param_page;
    use crate::mock::ScriptedTransport;

    #[test]
    fn test_with_geometry_rejects_oversized_address() {
        let mut geometry = Geometry::parse(&param_page(2048, 64, 64, 1024, 1, 3, 2)).unwrap();
        geometry.row_address_bytes = 7;
        let t = ScriptedTransport::new(|_frame| Vec::new());
        assert!(matches!(
            NandSession::with_geometry(t, geometry, SessionConfig::default()),
            Err(Error::Protocol)
        ));
    }

    #[test]
    fn test_with_geometry_accepts_parsed_geometry() {
        let geometry = Geometry::parse(&param_page(2048, 64, 64, 1024, 1, 3, 2)).unwrap();
        let t = ScriptedTransport::new(|_frame| Vec::new());
        let nand = NandSession::with_geometry(t, geometry, SessionConfig::default()).unwrap();
        assert_eq!(nand.state(), ChipState::Idle);
        assert!(!nand.internal_ecc());
        assert_eq!(nand.jedec_id(), None);
    }
}
