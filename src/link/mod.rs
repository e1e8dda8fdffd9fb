//! Half-duplex link cycle
//!
//! The powerbase answers one outbound frame with one inbound frame and ignores
//! writes while it is talking, so the link strictly alternates:
//!
//! ```text
//! WRITE (9 bytes) -> READ (15 bytes) -> WRITE -> ...
//! ```
//!
//! A completed read is decoded and, when its checksum holds, handed to the race
//! state machine together with the previously accepted frame. A corrupt frame
//! is dropped without touching race state. Either way the cycle moves on to
//! WRITE.
//!
//! The cycle is driven by a blocking thread (`Link::spawn_driver`) and may be
//! reconnected from the watchdog at any time: both go through the same lock,
//! so a reconnect always lands between two steps.

pub mod device;
pub mod frames;
pub mod stats;

pub use device::{Device, DeviceOpener, SerialOpener};
pub use frames::{FramePair, FrameReader};
pub use stats::LinkStats;

use crate::codec::{InboundFrame, OUTBOUND_LEN};
use crate::constants::IDLE_POLL_MS;
use crate::error::{PowerbaseError, Result};
use crate::race::{RaceControl, Scheduler};
use parking_lot::{Mutex, MutexGuard};
use std::io::{self, ErrorKind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Read,
    Write,
}

/// Outcome of one `LinkCycle::step`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// No bytes moved (timeout or would block)
    Pending,
    /// Bytes moved, frame not complete yet
    Partial,
    /// Inbound frame decoded and processed
    Accepted,
    /// Inbound frame failed its checksum and was dropped
    Discarded,
    /// Outbound frame fully written
    Written,
    /// No device open; waiting for a reconnect
    Closed,
}

/// Timeouts and interrupted calls are not failures of a polling read
fn is_pending(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
    )
}

/// Link state for one powerbase
pub struct LinkCycle {
    opener: Box<dyn DeviceOpener>,
    device: Option<Box<dyn Device>>,
    phase: Phase,
    reader: FrameReader,
    frames: FramePair,
    /// Encoded frame being written, prepared once per WRITE phase
    out: Option<[u8; OUTBOUND_LEN]>,
    written: usize,
    last_update: Instant,
    connected: bool,
    race: RaceControl,
    scheduler: Arc<dyn Scheduler>,
    stats: Arc<LinkStats>,
}

impl LinkCycle {
    pub fn new(
        opener: Box<dyn DeviceOpener>,
        race: RaceControl,
        scheduler: Arc<dyn Scheduler>,
        stats: Arc<LinkStats>,
    ) -> Self {
        Self {
            opener,
            device: None,
            phase: Phase::Write,
            reader: FrameReader::new(),
            frames: FramePair::new(),
            out: None,
            written: 0,
            last_update: Instant::now(),
            connected: false,
            race,
            scheduler,
            stats,
        }
    }

    /// First open; unlike `reconnect` a failure is returned
    pub fn open(&mut self, now: Instant) -> Result<()> {
        let device = self.opener.open()?;
        self.device = Some(device);
        self.reset_cursors(now);
        Ok(())
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn last_update(&self) -> Instant {
        self.last_update
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_open(&self) -> bool {
        self.device.is_some()
    }

    /// Advance the cycle by at most one read or write call
    ///
    /// An I/O error closes the device and is returned; recovery is left to
    /// the watchdog.
    pub fn step(&mut self, now: Instant) -> Result<Progress> {
        match self.phase {
            Phase::Read => self.step_read(now),
            Phase::Write => self.step_write(),
        }
    }

    fn step_read(&mut self, now: Instant) -> Result<Progress> {
        let Some(device) = self.device.as_mut() else {
            return Ok(Progress::Closed);
        };
        match device.read(self.reader.spare()) {
            // A hung-up tty reads as end of file
            Ok(0) => {
                self.device = None;
                Err(PowerbaseError::Read {
                    source: io::Error::from(ErrorKind::UnexpectedEof),
                })
            }
            Ok(n) => {
                self.reader.advance(n);
                if self.reader.is_full() {
                    Ok(self.complete_read(now))
                } else {
                    Ok(Progress::Partial)
                }
            }
            Err(e) if is_pending(&e) => Ok(Progress::Pending),
            Err(source) => {
                self.device = None;
                Err(PowerbaseError::Read { source })
            }
        }
    }

    fn complete_read(&mut self, now: Instant) -> Progress {
        let progress = match InboundFrame::decode(self.reader.bytes()) {
            Ok(frame) => {
                self.accept(frame, now);
                Progress::Accepted
            }
            Err(e) => {
                trace!("discarding inbound frame: {}", e);
                self.stats.add_corrupt();
                Progress::Discarded
            }
        };
        self.reader.clear();
        self.phase = Phase::Write;
        progress
    }

    fn accept(&mut self, frame: InboundFrame, now: Instant) {
        self.stats.add_frame_in();
        self.last_update = now;
        if !self.connected {
            self.connected = true;
            info!("powerbase connected on {}", self.opener.describe());
            self.race.lock().on_link_restored();
        }

        self.frames.store(frame);
        if let Some(prev) = self.frames.previous() {
            let prev = *prev;
            self.race.lock().on_frame(&frame, &prev, now);
        }
        self.race.schedule_deferred(self.scheduler.as_ref());
        self.frames.swap();
    }

    fn step_write(&mut self) -> Result<Progress> {
        if self.device.is_none() {
            return Ok(Progress::Closed);
        }
        let out = match self.out {
            Some(out) => out,
            None => {
                let out = self.race.lock().next_outbound().encode();
                self.out = Some(out);
                self.written = 0;
                out
            }
        };

        let Some(device) = self.device.as_mut() else {
            return Ok(Progress::Closed);
        };
        match device.write(&out[self.written..]) {
            Ok(0) => Ok(Progress::Pending),
            Ok(n) => {
                self.written += n;
                if self.written < OUTBOUND_LEN {
                    return Ok(Progress::Partial);
                }
                if let Err(source) = device.flush() {
                    self.device = None;
                    return Err(PowerbaseError::Write { source });
                }
                self.out = None;
                self.written = 0;
                self.phase = Phase::Read;
                self.stats.add_frame_out();
                Ok(Progress::Written)
            }
            Err(e) if is_pending(&e) => Ok(Progress::Pending),
            Err(source) => {
                self.device = None;
                Err(PowerbaseError::Write { source })
            }
        }
    }

    /// Close and reopen the device, restarting the cycle at WRITE
    ///
    /// A failed reopen leaves the link closed until the next call.
    pub fn reconnect(&mut self, now: Instant) {
        if self.connected {
            warn!("powerbase disconnected from {}", self.opener.describe());
        }
        self.connected = false;
        self.device = None;
        self.stats.add_reconnect();

        match self.opener.open() {
            Ok(device) => {
                info!("reopened {}", self.opener.describe());
                self.device = Some(device);
            }
            Err(e) => warn!("reopen failed: {}", e),
        }
        self.reset_cursors(now);
    }

    fn reset_cursors(&mut self, now: Instant) {
        self.reader.clear();
        self.out = None;
        self.written = 0;
        self.phase = Phase::Write;
        self.last_update = now;
        self.frames.clear_previous();
    }
}

/// Shared handle to a `LinkCycle`
#[derive(Clone)]
pub struct Link {
    inner: Arc<Mutex<LinkCycle>>,
    stats: Arc<LinkStats>,
}

impl Link {
    /// Open the device and build the link around it
    pub fn open(
        opener: Box<dyn DeviceOpener>,
        race: RaceControl,
        scheduler: Arc<dyn Scheduler>,
    ) -> Result<Self> {
        let stats = Arc::new(LinkStats::new());
        let mut cycle = LinkCycle::new(opener, race, scheduler, stats.clone());
        cycle.open(Instant::now())?;
        Ok(Self {
            inner: Arc::new(Mutex::new(cycle)),
            stats,
        })
    }

    pub fn lock(&self) -> MutexGuard<'_, LinkCycle> {
        self.inner.lock()
    }

    pub fn step(&self, now: Instant) -> Result<Progress> {
        self.inner.lock().step(now)
    }

    pub fn reconnect(&self, now: Instant) {
        self.inner.lock().reconnect(now);
    }

    /// Time of the last accepted frame (or of the last reopen)
    pub fn last_update(&self) -> Instant {
        self.inner.lock().last_update()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.lock().is_connected()
    }

    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    /// Drive the cycle on a dedicated thread until `shutdown` is set
    ///
    /// The lock is released fairly after every step so the watchdog gets in
    /// between two steps even while the device keeps the thread busy.
    pub fn spawn_driver(&self, shutdown: Arc<AtomicBool>) -> io::Result<JoinHandle<()>> {
        let inner = self.inner.clone();
        std::thread::Builder::new()
            .name("powerbase-link".to_string())
            .spawn(move || {
                while !shutdown.load(Ordering::Relaxed) {
                    let mut cycle = inner.lock();
                    match cycle.step(Instant::now()) {
                        Ok(Progress::Closed) => {
                            drop(cycle);
                            std::thread::sleep(Duration::from_millis(IDLE_POLL_MS));
                        }
                        Ok(_) => MutexGuard::unlock_fair(cycle),
                        Err(e) => {
                            drop(cycle);
                            warn!("powerbase link failed: {}", e);
                        }
                    }
                }
            })
    }
}
