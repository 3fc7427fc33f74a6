//! Byte-stream transport abstraction
//!
//! The bridge microcontroller is reached over a duplex byte channel. The
//! core never sees USB endpoints or serial ports, only this trait.

use crate::error::Result;

use alloc::boxed::Box;

/// Duplex byte channel to the bridge
///
/// Implementations map their own failures (USB stalls, timeouts, short
/// transfers) to [`Error::Transport`](crate::Error::Transport) and are
/// expected to log the underlying cause.
pub trait Transport {
    /// Write all bytes as one logical write
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Read exactly `buf.len()` bytes
    ///
    /// Blocks until the buffer is full. Fewer bytes than requested is an
    /// error, not a partial success.
    fn read(&mut self, buf: &mut [u8]) -> Result<()>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        (**self).write(data)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        (**self).read(buf)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        (**self).write(data)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        (**self).read(buf)
    }
}
