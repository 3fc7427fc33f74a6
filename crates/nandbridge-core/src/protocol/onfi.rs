//! ONFI NAND protocol implementation
//!
//! This module implements the page read, block erase and page program
//! command sequences as the bridge expects them: one frame per command
//! cycle, with status polling between the confirm cycle and the next step.
//!
//! The chip has a single command state. Each function here runs one
//! sequence to completion and leaves the session's [`ChipState`] describing
//! where the chip was left.

use alloc::vec::Vec;

use crate::command::{self, opcodes, CommandFrame};
use crate::error::{Error, Result};
use crate::session::{ChipState, NandSession};
use crate::status::Status;
use crate::transport::Transport;

// ============================================================================
// Transport-level primitives (usable before a session exists)
// ============================================================================

/// Read the status register
pub fn read_status_raw<T: Transport + ?Sized>(transport: &mut T) -> Result<Status> {
    let resp = command::execute(transport, &CommandFrame::read(opcodes::READ_STATUS, 1))?;
    Ok(Status::from_raw(resp[0]))
}

/// Poll the status register until the ready bit is set
///
/// Busy-waits without delay between polls. With `max_polls` set, gives up
/// with [`Error::Timeout`] after that many not-ready reads.
pub fn poll_ready<T: Transport + ?Sized>(transport: &mut T, max_polls: Option<u32>) -> Result<Status> {
    let mut polls: u32 = 0;
    loop {
        let status = read_status_raw(transport)?;
        if status.is_ready() {
            if polls > 0 {
                log::trace!("ready after {} busy polls, status {}", polls, status);
            }
            return Ok(status);
        }
        polls = polls.saturating_add(1);
        if let Some(max) = max_polls {
            if polls >= max {
                log::error!("device still busy after {} status polls", polls);
                return Err(Error::Timeout);
            }
        }
    }
}

/// Send RESET and wait for the device to come back
pub fn reset<T: Transport + ?Sized>(transport: &mut T, max_polls: Option<u32>) -> Result<Status> {
    command::execute(transport, &CommandFrame::simple(opcodes::RESET))?;
    poll_ready(transport, max_polls)
}

/// Read `len` bytes of READ ID output at `address`
pub fn read_id<T: Transport + ?Sized>(transport: &mut T, address: u8, len: u16) -> Result<Vec<u8>> {
    let addr = [address];
    let frame = CommandFrame::with_address(opcodes::READ_ID, &addr).with_read_len(len);
    command::execute(transport, &frame)
}

/// Write four parameter bytes to feature address `feature`
pub fn set_features<T: Transport + ?Sized>(
    transport: &mut T,
    feature: u8,
    params: [u8; 4],
    max_polls: Option<u32>,
) -> Result<Status> {
    let addr = [feature];
    command::execute(
        transport,
        &CommandFrame::write(opcodes::SET_FEATURES, &addr, &params),
    )?;
    let status = poll_ready(transport, max_polls)?;
    log::trace!("set feature 0x{:02X} to {:02X?}", feature, params);
    Ok(status)
}

/// Switch on the on-die ECC of known Micron parts
///
/// Reads the JEDEC id, and for a part listed in
/// [`INTERNAL_ECC_DEVICES`](opcodes::INTERNAL_ECC_DEVICES) sets the array
/// operation mode until the id reports ECC enabled, sending at most
/// [`INTERNAL_ECC_ATTEMPTS`](opcodes::INTERNAL_ECC_ATTEMPTS) SET FEATURES.
/// Returns the id bytes and whether ECC ended up enabled. Other parts are
/// left alone.
pub fn enable_internal_ecc<T: Transport + ?Sized>(
    transport: &mut T,
    max_polls: Option<u32>,
) -> Result<(Vec<u8>, bool)> {
    let mut id = read_id(transport, opcodes::READ_ID_JEDEC, opcodes::JEDEC_ID_LEN)?;
    if !opcodes::INTERNAL_ECC_DEVICES.contains(&(id[0], id[1])) {
        return Ok((id, false));
    }
    let mut sets = 0;
    while id[opcodes::ID_ECC_BYTE] & opcodes::ID_ECC_ENABLED == 0 {
        if sets == opcodes::INTERNAL_ECC_ATTEMPTS {
            log::warn!(
                "on-die ECC still off after {} attempts, rewrite hints will not be reported",
                sets
            );
            return Ok((id, false));
        }
        set_features(
            transport,
            opcodes::FEATURE_ARRAY_OPERATION_MODE,
            opcodes::ARRAY_MODE_INTERNAL_ECC,
            max_polls,
        )?;
        sets += 1;
        id = read_id(transport, opcodes::READ_ID_JEDEC, opcodes::JEDEC_ID_LEN)?;
    }
    log::debug!("on-die ECC enabled");
    Ok((id, true))
}

/// Check that READ ID at 0x20 returns the ONFI signature
pub fn check_onfi_signature<T: Transport + ?Sized>(transport: &mut T) -> Result<()> {
    let sig = read_id(transport, opcodes::READ_ID_ONFI, 4)?;
    if sig.as_slice() != opcodes::ONFI_SIGNATURE.as_slice() {
        log::error!("READ ID returned {:02X?}, expected ONFI signature", sig);
        return Err(Error::NotOnfi);
    }
    Ok(())
}

// ============================================================================
// Session-level operations
// ============================================================================

/// Read the status register
pub fn read_status<T: Transport>(nand: &mut NandSession<T>) -> Result<Status> {
    let status = read_status_raw(nand.transport_mut())?;
    log::trace!("status {}", status);
    Ok(status)
}

/// Poll the status register until ready, bounded by the session config
pub fn wait_ready<T: Transport>(nand: &mut NandSession<T>) -> Result<Status> {
    let max_polls = nand.config().max_status_polls;
    poll_ready(nand.transport_mut(), max_polls)
}

/// Load `page` from the array into the page register
///
/// Sends the address with READ MODE, then READ START, then polls status
/// until ready. Returns the final status; fails with [`Error::Read`] if the
/// device reports the error bit.
pub fn load_page<T: Transport>(nand: &mut NandSession<T>, page: u32) -> Result<Status> {
    nand.geometry().check_page(page)?;
    let addr = nand.geometry().page_address(page);

    nand.execute(&CommandFrame::with_address(opcodes::READ_MODE, &addr))?;
    nand.set_state(ChipState::AddressLoaded);

    nand.execute(&CommandFrame::simple(opcodes::READ_START))?;
    let status = match wait_ready(nand) {
        Ok(status) => status,
        Err(e) => {
            nand.set_state(ChipState::Idle);
            return Err(e);
        }
    };

    if status.is_error() {
        log::debug!("page {} load failed, status {}", page, status);
        nand.set_state(ChipState::Idle);
        return Err(Error::Read { page });
    }

    nand.set_state(ChipState::Reading);
    Ok(status)
}

/// Read bytes out of the page register
///
/// `start` is the column to begin at. `size` defaults to the rest of the
/// page including the spare area.
pub fn read_data<T: Transport>(
    nand: &mut NandSession<T>,
    start: u16,
    size: Option<usize>,
) -> Result<Vec<u8>> {
    if nand.state() != ChipState::Reading {
        return Err(Error::NoPageLoaded);
    }

    let raw_page = nand.geometry().raw_page_size();
    let start_col = start as usize;
    if start_col > raw_page {
        return Err(Error::AddressOutOfRange);
    }
    let size = size.unwrap_or(raw_page - start_col);
    let read_len = u16::try_from(size).map_err(|_| Error::FrameTooLarge)?;

    if start == 0 {
        nand.execute(&CommandFrame::read(opcodes::READ_MODE, read_len))
    } else {
        nand.execute(&CommandFrame::simple(opcodes::READ_MODE))?;
        let column = start.to_le_bytes();
        nand.execute(&CommandFrame::with_address(opcodes::CHANGE_READ_COLUMN, &column))?;
        nand.execute(&CommandFrame::read(opcodes::CHANGE_READ_COLUMN_START, read_len))
    }
}

/// Load `page` and read all of it, spare area included
pub fn read_page<T: Transport>(nand: &mut NandSession<T>, page: u32) -> Result<Vec<u8>> {
    load_page(nand, page)?;
    read_data(nand, 0, None)
}

/// Erase `block`
///
/// Returns the status after the erase completes. The error bit is not
/// turned into an `Err`; the caller decides what a failed erase means.
pub fn erase_block<T: Transport>(nand: &mut NandSession<T>, block: u32) -> Result<Status> {
    nand.geometry().check_block(block)?;
    let first_page = nand.geometry().first_page(block);
    let addr = nand.geometry().row_address(first_page);

    nand.set_state(ChipState::Erasing);
    nand.execute(&CommandFrame::with_address(opcodes::ERASE_SETUP, &addr))?;
    nand.execute(&CommandFrame::simple(opcodes::ERASE_CONFIRM))?;
    let status = wait_ready(nand)?;
    nand.set_state(ChipState::Idle);

    if status.is_error() {
        log::warn!("erase of block {} failed, status {}", block, status);
    } else {
        log::debug!("erased block {}", block);
    }
    Ok(status)
}

/// Program `data` into `page` starting at column 0
///
/// Checks the write-enable bit first and fails with
/// [`Error::WriteProtected`] if it is clear. Returns the status after the
/// program completes.
pub fn program_page<T: Transport>(nand: &mut NandSession<T>, page: u32, data: &[u8]) -> Result<Status> {
    nand.geometry().check_page(page)?;
    if data.len() > nand.geometry().raw_page_size() {
        return Err(Error::ImageTooLarge);
    }

    let status = read_status(nand)?;
    if !status.is_write_enabled() {
        return Err(Error::WriteProtected);
    }

    let addr = nand.geometry().page_address(page);
    nand.set_state(ChipState::Programming);
    nand.execute(&CommandFrame::write(opcodes::PROGRAM_SETUP, &addr, data))?;
    nand.execute(&CommandFrame::simple(opcodes::PROGRAM_CONFIRM))?;
    let status = wait_ready(nand)?;
    nand.set_state(ChipState::Idle);

    if status.is_error() {
        log::debug!("program of page {} reported failure, status {}", page, status);
    }
    Ok(status)
}

/// Program `page` and read it back
///
/// Fails with [`Error::RewriteRecommended`] if the reload flags the page,
/// or [`Error::VerifyMismatch`] if the readback differs from `data`.
pub fn program_with_verify<T: Transport>(
    nand: &mut NandSession<T>,
    page: u32,
    data: &[u8],
) -> Result<Status> {
    program_page(nand, page, data)?;

    let status = load_page(nand, page)?;
    if status.rewrite_recommended() {
        return Err(Error::RewriteRecommended { page });
    }

    let readback = read_data(nand, 0, Some(data.len()))?;
    if let Some(offset) = first_difference(&readback, data) {
        log::debug!(
            "verify page {}: offset {} read 0x{:02X}, wrote 0x{:02X}",
            page,
            offset,
            readback.get(offset).copied().unwrap_or(0),
            data[offset]
        );
        return Err(Error::VerifyMismatch { page, offset });
    }

    Ok(status)
}

fn first_difference(have: &[u8], want: &[u8]) -> Option<usize> {
    want.iter()
        .enumerate()
        .position(|(i, &w)| have.get(i) != Some(&w))
}
