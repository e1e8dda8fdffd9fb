//! Per-slot car data

use crate::constants::DEFAULT_POWER_RATE;
use serde::Serialize;

/// Race bookkeeping for one car slot
///
/// Times are game time in microseconds (lap timer derived).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CarState {
    /// Selected for the current race
    pub active: bool,
    pub finished: bool,
    /// Percentage applied to handset power (1..=100)
    pub power_rate: u8,
    /// Time of the first crossing
    pub start_time_us: u64,
    pub last_crossing_us: u64,
    /// Best lap, 0 while no lap has been completed
    pub best_lap_us: u64,
    pub laps: u8,
}

impl Default for CarState {
    fn default() -> Self {
        Self {
            active: false,
            finished: false,
            power_rate: DEFAULT_POWER_RATE,
            start_time_us: 0,
            last_crossing_us: 0,
            best_lap_us: 0,
            laps: 0,
        }
    }
}

impl CarState {
    /// Clear lap data, keeping selection and power rate
    pub fn reset(&mut self) {
        self.finished = false;
        self.start_time_us = 0;
        self.last_crossing_us = 0;
        self.best_lap_us = 0;
        self.laps = 0;
    }

    /// Scale a handset power value by this car's power rate
    pub fn scaled_power(&self, power: u8) -> u8 {
        (u16::from(power) * u16::from(self.power_rate) / 100) as u8
    }
}
