//! Powerbase link
//!
//! Drives a 6-car digital slot-car powerbase over its half-duplex serial
//! link and runs the race on top of it:
//!
//! - `codec` - 15-byte inbound and 9-byte outbound frames, CRC-8
//! - `link` - READ/WRITE cycle against the device, reconnect
//! - `race` - game state machine, laps, positions, drive outputs
//! - `events` - ordered delivery of race notifications to an `EventSink`
//! - `watchdog` - reopens the device when the powerbase goes silent
//! - `director` - button handling and countdown for the command-line front end

pub mod cli;
pub mod codec;
pub mod config;
pub mod constants;
pub mod director;
pub mod error;
pub mod events;
pub mod link;
pub mod logging;
pub mod powerbase;
pub mod race;
pub mod watchdog;

pub use error::{PowerbaseError, Result};
pub use events::{EventQueue, EventSink, RaceEvent};
pub use powerbase::Powerbase;
pub use race::{GameState, RaceControl};
