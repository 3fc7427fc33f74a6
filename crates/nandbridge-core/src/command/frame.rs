//! Command frame structure

use crate::error::{Error, Result};

/// Size of the fixed frame header on the wire
pub const HEADER_LEN: usize = 6;

/// Maximum number of address cycles a frame can carry
pub const MAX_ADDRESS_BYTES: usize = 8;

/// A single bridge request
///
/// Borrows its address and output data, so building a frame never allocates.
/// A frame is built per operation and consumed by [`execute`](super::execute).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandFrame<'a> {
    /// The opcode byte latched as a command cycle
    pub opcode: u8,

    /// Address cycles sent after the opcode
    pub address: &'a [u8],

    /// Data bytes clocked out after the address
    pub out_data: &'a [u8],

    /// Number of bytes the bridge reads back from the chip
    pub read_len: u16,
}

impl<'a> CommandFrame<'a> {
    /// Create a command with no address or data (e.g., READ_START)
    pub fn simple(opcode: u8) -> Self {
        Self {
            opcode,
            address: &[],
            out_data: &[],
            read_len: 0,
        }
    }

    /// Create a command carrying only address cycles (e.g., ERASE_SETUP)
    pub fn with_address(opcode: u8, address: &'a [u8]) -> Self {
        Self {
            opcode,
            address,
            out_data: &[],
            read_len: 0,
        }
    }

    /// Create a command that reads `read_len` bytes back (e.g., READ_STATUS)
    pub fn read(opcode: u8, read_len: u16) -> Self {
        Self {
            opcode,
            address: &[],
            out_data: &[],
            read_len,
        }
    }

    /// Create a command with address cycles and output data (e.g., PROGRAM_SETUP)
    pub fn write(opcode: u8, address: &'a [u8], out_data: &'a [u8]) -> Self {
        Self {
            opcode,
            address,
            out_data,
            read_len: 0,
        }
    }

    /// Set the response length
    pub fn with_read_len(mut self, read_len: u16) -> Self {
        self.read_len = read_len;
        self
    }

    /// Check that the address and data lengths fit their header fields
    pub fn validate(&self) -> Result<()> {
        if self.address.len() > MAX_ADDRESS_BYTES || self.out_data.len() > u16::MAX as usize {
            return Err(Error::FrameTooLarge);
        }
        Ok(())
    }

    /// Total bytes this frame occupies on the wire
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.address.len() + self.out_data.len()
    }

    /// Encode the fixed header
    ///
    /// Layout (little-endian): opcode:u8, address length:u8,
    /// data length:u16, read length:u16. Call [`validate`](Self::validate)
    /// first; lengths are truncated otherwise.
    pub fn encode_header(&self) -> [u8; HEADER_LEN] {
        let out_len = (self.out_data.len() as u16).to_le_bytes();
        let read_len = self.read_len.to_le_bytes();
        [
            self.opcode,
            self.address.len() as u8,
            out_len[0],
            out_len[1],
            read_len[0],
            read_len[1],
        ]
    }

    /// Encode header, address and output data into `buf`
    ///
    /// Returns the number of bytes written. `buf` must be at least
    /// [`encoded_len`](Self::encoded_len) bytes.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        self.validate()?;
        let len = self.encoded_len();
        if buf.len() < len {
            return Err(Error::FrameTooLarge);
        }

        buf[..HEADER_LEN].copy_from_slice(&self.encode_header());
        let addr_end = HEADER_LEN + self.address.len();
        buf[HEADER_LEN..addr_end].copy_from_slice(self.address);
        buf[addr_end..len].copy_from_slice(self.out_data);
        Ok(len)
    }

    /// Parse a frame as the bridge receives it
    ///
    /// `buf` must hold exactly one frame: the header lengths have to account
    /// for every byte after it.
    pub fn decode(buf: &'a [u8]) -> Result<Self> {
        if buf.len() < HEADER_LEN {
            return Err(Error::Protocol);
        }
        let addr_len = buf[1] as usize;
        let out_len = u16::from_le_bytes([buf[2], buf[3]]) as usize;
        let read_len = u16::from_le_bytes([buf[4], buf[5]]);
        let addr_end = HEADER_LEN + addr_len;
        if addr_len > MAX_ADDRESS_BYTES || buf.len() != addr_end + out_len {
            return Err(Error::Protocol);
        }
        Ok(Self {
            opcode: buf[0],
            address: &buf[HEADER_LEN..addr_end],
            out_data: &buf[addr_end..],
            read_len,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let frame = CommandFrame::write(0x80, &[0, 0, 0x40, 0, 0], &[0xAA; 0x0102]);
        assert_eq!(frame.encode_header(), [0x80, 5, 0x02, 0x01, 0, 0]);

        let frame = CommandFrame::read(0x70, 1);
        assert_eq!(frame.encode_header(), [0x70, 0, 0, 0, 1, 0]);
    }

    #[test]
    fn test_encode_concatenates_sections() {
        let frame = CommandFrame::write(0x80, &[1, 2], &[9, 8, 7]).with_read_len(0x0300);
        let mut buf = [0u8; 16];
        let len = frame.encode(&mut buf).unwrap();
        assert_eq!(len, 11);
        assert_eq!(&buf[..len], &[0x80, 2, 3, 0, 0x00, 0x03, 1, 2, 9, 8, 7]);
    }

    #[test]
    fn test_oversized_address_rejected() {
        let addr = [0u8; 9];
        let frame = CommandFrame::with_address(0x60, &addr);
        assert_eq!(frame.validate(), Err(Error::FrameTooLarge));
    }

    #[test]
    fn test_decode_matches_encode() {
        let frame = CommandFrame::write(0x80, &[0, 0, 7, 0, 0], &[1, 2, 3]).with_read_len(2);
        let mut buf = [0u8; 32];
        let len = frame.encode(&mut buf).unwrap();
        assert_eq!(CommandFrame::decode(&buf[..len]).unwrap(), frame);
    }

    #[test]
    fn test_decode_rejects_length_mismatch() {
        assert_eq!(CommandFrame::decode(&[0x70, 0, 0]), Err(Error::Protocol));
        // Header claims two data bytes, only one follows
        assert_eq!(CommandFrame::decode(&[0x80, 0, 2, 0, 0, 0, 9]), Err(Error::Protocol));
    }

    #[test]
    fn test_encode_needs_room() {
        let frame = CommandFrame::with_address(0x60, &[1, 2, 3]);
        let mut buf = [0u8; 8];
        assert_eq!(frame.encode(&mut buf), Err(Error::FrameTooLarge));
    }
}
