//! Game states and LED reset sequencing

use serde::Serialize;
use std::fmt;

/// Race/game state of the powerbase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameState {
    /// All cars cut off
    Stopped,
    /// Cars selected, lights counting down; any crossing is a false start
    Countdown,
    /// Race running
    Race,
    /// Start requested, promoted to `Race` on the next LED reset boundary
    Starting,
    /// Free driving, every handset drives its car
    Training,
    /// Showing the bind pattern for one handset
    Binding,
}

impl GameState {
    /// Entering this state clears laps, best times and finish flags
    pub fn resets_race_data(self) -> bool {
        matches!(
            self,
            GameState::Countdown | GameState::Starting | GameState::Training | GameState::Binding
        )
    }

    /// A crossing in this state is a false start
    pub fn is_pre_race(self) -> bool {
        matches!(self, GameState::Countdown | GameState::Starting)
    }

    /// Crossings in this state are timed
    pub fn is_timed(self) -> bool {
        matches!(self, GameState::Race | GameState::Training)
    }
}

impl fmt::Display for GameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GameState::Stopped => "STOPPED",
            GameState::Countdown => "COUNTDOWN",
            GameState::Race => "RACE",
            GameState::Starting => "STARTING",
            GameState::Training => "TRAINING",
            GameState::Binding => "BINDING",
        };
        f.write_str(name)
    }
}

/// Two-cycle LED reset applied on the outbound path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LedReset {
    #[default]
    Idle,
    /// Next write forces both state LEDs on
    BothOn,
    /// Next write turns red off and may promote `Starting`
    RedOff,
}
