//! Inbound frame accumulation and the current/previous frame pair

use crate::codec::{InboundFrame, INBOUND_LEN};

/// Accumulates bytes until one inbound frame is complete
#[derive(Debug, Default)]
pub struct FrameReader {
    buf: [u8; INBOUND_LEN],
    len: usize,
}

impl FrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unfilled tail of the buffer
    pub fn spare(&mut self) -> &mut [u8] {
        &mut self.buf[self.len..]
    }

    pub fn advance(&mut self, n: usize) {
        self.len = (self.len + n).min(INBOUND_LEN);
    }

    pub fn is_full(&self) -> bool {
        self.len == INBOUND_LEN
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }
}

/// Two frame slots; `current` flips after each accepted frame
///
/// Until a frame has been accepted there is no previous frame, and the first
/// frame only primes the pair.
#[derive(Debug, Default)]
pub struct FramePair {
    slots: [InboundFrame; 2],
    current: bool,
    primed: bool,
}

impl FramePair {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write into the current slot
    pub fn store(&mut self, frame: InboundFrame) {
        self.slots[usize::from(self.current)] = frame;
    }

    pub fn current(&self) -> &InboundFrame {
        &self.slots[usize::from(self.current)]
    }

    pub fn previous(&self) -> Option<&InboundFrame> {
        self.primed.then(|| &self.slots[usize::from(!self.current)])
    }

    /// The current frame becomes the previous one
    pub fn swap(&mut self) {
        self.current = !self.current;
        self.primed = true;
    }

    /// Forget the previous frame (after a reconnect nothing is comparable)
    pub fn clear_previous(&mut self) {
        self.primed = false;
    }
}
