//! ONFI NAND command opcodes
//!
//! The bridge forwards the opcode byte to the chip's command latch, so these
//! are the chip's native command cycles.

// ============================================================================
// Identification
// ============================================================================

/// Read Parameter Page
pub const READ_PARAM_PAGE: u8 = 0xEC;
/// Read ID (address 0x00 = JEDEC id, address 0x20 = ONFI signature)
pub const READ_ID: u8 = 0x90;
/// Reset
pub const RESET: u8 = 0xFF;

/// READ ID address selecting the manufacturer/device id
pub const READ_ID_JEDEC: u8 = 0x00;
/// READ ID address selecting the ONFI signature
pub const READ_ID_ONFI: u8 = 0x20;
/// Signature returned for [`READ_ID_ONFI`]
pub const ONFI_SIGNATURE: &[u8; 4] = b"ONFI";

// ============================================================================
// Features
// ============================================================================

/// Set Features (feature address, then four parameter bytes)
pub const SET_FEATURES: u8 = 0xEF;
/// Micron feature address: array operation mode
pub const FEATURE_ARRAY_OPERATION_MODE: u8 = 0x90;
/// Array operation mode parameter enabling on-die ECC
pub const ARRAY_MODE_INTERNAL_ECC: [u8; 4] = [0x08, 0x00, 0x00, 0x00];

/// Micron manufacturer id
pub const MICRON_ID: u8 = 0x2C;
/// Parts whose on-die ECC is switched on at open
pub const INTERNAL_ECC_DEVICES: &[(u8, u8)] = &[(MICRON_ID, 0xDA)];
/// Length of the READ ID 0x00 response carrying the ECC state
pub const JEDEC_ID_LEN: u16 = 5;
/// Byte of the JEDEC id reporting the on-die ECC state
pub const ID_ECC_BYTE: usize = 4;
/// Bit of [`ID_ECC_BYTE`] set while on-die ECC is enabled
pub const ID_ECC_ENABLED: u8 = 0x80;
/// SET FEATURES attempts before giving up on enabling ECC
pub const INTERNAL_ECC_ATTEMPTS: u32 = 5;

// ============================================================================
// Page read
// ============================================================================

/// Load address / switch back to read mode
pub const READ_MODE: u8 = 0x00;
/// Read request (second cycle, starts the array-to-register transfer)
pub const READ_START: u8 = 0x30;
/// Change read column (first cycle)
pub const CHANGE_READ_COLUMN: u8 = 0x05;
/// Change read column (second cycle, data follows)
pub const CHANGE_READ_COLUMN_START: u8 = 0xE0;

// ============================================================================
// Erase
// ============================================================================

/// Block erase setup
pub const ERASE_SETUP: u8 = 0x60;
/// Block erase confirm
pub const ERASE_CONFIRM: u8 = 0xD0;

// ============================================================================
// Program
// ============================================================================

/// Page program setup
pub const PROGRAM_SETUP: u8 = 0x80;
/// Page program confirm
pub const PROGRAM_CONFIRM: u8 = 0x10;

// ============================================================================
// Status
// ============================================================================

/// Read Status
pub const READ_STATUS: u8 = 0x70;
