//! Scripted transport used by the unit tests

use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::vec::Vec;

use crate::error::{Error, Result};
use crate::transport::Transport;

/// Transport that answers each written frame through a closure
///
/// The closure sees the raw frame bytes and returns the bytes the bridge
/// would send back. Reads drain those bytes; asking for more than is queued
/// fails like a short USB read.
pub struct ScriptedTransport {
    responder: Box<dyn FnMut(&[u8]) -> Vec<u8>>,
    pending: VecDeque<u8>,
    /// Every frame written, in order
    pub writes: Vec<Vec<u8>>,
    /// Number of read calls
    pub reads: usize,
}

impl ScriptedTransport {
    pub fn new(responder: impl FnMut(&[u8]) -> Vec<u8> + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            pending: VecDeque::new(),
            writes: Vec::new(),
            reads: 0,
        }
    }

    /// Opcodes of every frame written so far
    pub fn opcodes(&self) -> Vec<u8> {
        self.writes.iter().map(|w| w[0]).collect()
    }
}

impl Transport for ScriptedTransport {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.writes.push(data.to_vec());
        let response = (self.responder)(data);
        self.pending.extend(response);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        self.reads += 1;
        if self.pending.len() < buf.len() {
            self.pending.clear();
            return Err(Error::Transport);
        }
        for b in buf.iter_mut() {
            *b = self.pending.pop_front().ok_or(Error::Transport)?;
        }
        Ok(())
    }
}
