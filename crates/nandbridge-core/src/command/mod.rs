//! Command codec
//!
//! Every flash operation reaches the bridge as one [`CommandFrame`]: a
//! six-byte header, the address cycles, the output data, all sent as one
//! transport write. The bridge answers with exactly `read_len` bytes.
//!
//! Retry policy does not live here. A failed or short transfer is returned
//! to the caller as [`Error::Transport`](crate::Error::Transport).

mod frame;
pub mod opcodes;

pub use frame::{CommandFrame, HEADER_LEN, MAX_ADDRESS_BYTES};

use alloc::vec;
use alloc::vec::Vec;

use crate::error::Result;
use crate::transport::Transport;

/// Send one frame and read back its response
///
/// Returns the `read_len` response bytes verbatim (empty if `read_len` is 0).
pub fn execute<T: Transport + ?Sized>(transport: &mut T, frame: &CommandFrame<'_>) -> Result<Vec<u8>> {
    let mut wire = vec![0u8; frame.encoded_len()];
    frame.encode(&mut wire)?;

    log::trace!(
        "frame op=0x{:02X} addr={:02X?} out={} read={}",
        frame.opcode,
        frame.address,
        frame.out_data.len(),
        frame.read_len
    );

    transport.write(&wire)?;

    let mut response = vec![0u8; frame.read_len as usize];
    if !response.is_empty() {
        transport.read(&mut response)?;
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::mock::ScriptedTransport;

    #[test]
    fn test_execute_writes_one_frame() {
        let mut t = ScriptedTransport::new(|_frame| vec![0x40]);
        let resp = execute(&mut t, &CommandFrame::read(opcodes::READ_STATUS, 1)).unwrap();
        assert_eq!(resp, vec![0x40]);
        assert_eq!(t.writes.len(), 1);
        assert_eq!(t.writes[0], vec![0x70, 0, 0, 0, 1, 0]);
    }

    #[test]
    fn test_execute_without_response_skips_read() {
        let mut t = ScriptedTransport::new(|_frame| Vec::new());
        let resp = execute(&mut t, &CommandFrame::simple(opcodes::READ_START)).unwrap();
        assert!(resp.is_empty());
        assert_eq!(t.reads, 0);
    }

    #[test]
    fn test_short_response_is_transport_error() {
        let mut t = ScriptedTransport::new(|_frame| vec![1, 2]);
        let err = execute(&mut t, &CommandFrame::read(opcodes::READ_MODE, 4)).unwrap_err();
        assert_eq!(err, Error::Transport);
    }

    #[test]
    fn test_invalid_frame_never_reaches_transport() {
        let mut t = ScriptedTransport::new(|_frame| Vec::new());
        let addr = [0u8; 9];
        let err = execute(&mut t, &CommandFrame::with_address(opcodes::ERASE_SETUP, &addr)).unwrap_err();
        assert_eq!(err, Error::FrameTooLarge);
        assert!(t.writes.is_empty());
    }
}
