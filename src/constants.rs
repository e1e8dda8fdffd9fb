//! Application-wide constants
//!
//! Centralized constants to avoid duplication and ensure consistency.

// =============================================================================
// Serial
// =============================================================================

/// Powerbase line speed (8N1)
pub const BAUD_RATE: u32 = 19_200;

/// Read/write timeout on the serial device (milliseconds)
pub const SERIAL_TIMEOUT_MS: u64 = 10;

/// Sleep between driver iterations while no device is open (milliseconds)
pub const IDLE_POLL_MS: u64 = 10;

// =============================================================================
// Cars
// =============================================================================

/// Number of car slots on the powerbase
pub const CAR_COUNT: usize = 6;

/// Default power rate (percent)
pub const DEFAULT_POWER_RATE: u8 = 100;

/// Default number of laps for a race
pub const DEFAULT_LAPS: u8 = 3;

// =============================================================================
// Timing - Link
// =============================================================================

/// Watchdog period (milliseconds)
pub const WATCHDOG_PERIOD_MS: u64 = 1_000;

/// Link silence before forcing a reconnect (milliseconds)
pub const SILENCE_TIMEOUT_MS: u64 = 1_000;

// =============================================================================
// Timing - Race (game time, microseconds)
// =============================================================================

/// Interval between game update events
pub const GAME_UPDATE_INTERVAL_US: u64 = 1_000_000;

/// A finished car keeps coasting for this long
pub const COAST_WINDOW_US: u64 = 1_500_000;

/// Power applied while coasting after the finish line
pub const COAST_POWER: u8 = 40;

// =============================================================================
// Timing - Race (wall clock)
// =============================================================================

/// Delay between the last car finishing and the race-finished event (seconds)
pub const FINISH_GRACE_SECS: u64 = 2;

/// Duration of the binding LED pattern before returning to training (seconds)
pub const BIND_TIMEOUT_SECS: u64 = 3;

// =============================================================================
// Countdown choreography (seconds)
// =============================================================================

/// Hold on the first countdown light (sound intro)
pub const COUNTDOWN_INTRO_SECS: u64 = 11;

/// Hold between the remaining countdown lights
pub const COUNTDOWN_STEP_SECS: u64 = 2;
