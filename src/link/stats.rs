//! Link counters
//!
//! Lock-free atomics, readable from any thread while the driver runs.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct LinkStats {
    /// Frames decoded with a valid checksum
    frames_in: AtomicU64,
    /// Frames discarded on checksum mismatch
    frames_corrupt: AtomicU64,
    /// Outbound frames fully written
    frames_out: AtomicU64,
    reconnects: AtomicU64,
}

impl LinkStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn add_frame_in(&self) {
        self.frames_in.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_corrupt(&self) {
        self.frames_corrupt.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_frame_out(&self) {
        self.frames_out.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frames_in(&self) -> u64 {
        self.frames_in.load(Ordering::Relaxed)
    }

    pub fn frames_corrupt(&self) -> u64 {
        self.frames_corrupt.load(Ordering::Relaxed)
    }

    pub fn frames_out(&self) -> u64 {
        self.frames_out.load(Ordering::Relaxed)
    }

    pub fn reconnects(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }
}

impl fmt::Display for LinkStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} frames in ({} corrupt), {} frames out, {} reconnects",
            self.frames_in(),
            self.frames_corrupt(),
            self.frames_out(),
            self.reconnects()
        )
    }
}
