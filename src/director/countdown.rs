//! Start light countdown
//!
//! 4 is shown while drivers line up, then 3 and 2, then 1 together with
//! `start()`, then 0. A false start moves the game out of COUNTDOWN; the
//! sequence stops at the next step when that happens.

use super::output::{DirectorMessage, JsonLines};
use crate::constants::{COUNTDOWN_INTRO_SECS, COUNTDOWN_STEP_SECS};
use crate::race::{GameState, RaceControl};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountdownTiming {
    /// Hold on 4
    pub intro: Duration,
    /// Hold on 3, 2 and 1
    pub step: Duration,
}

impl Default for CountdownTiming {
    fn default() -> Self {
        Self {
            intro: Duration::from_secs(COUNTDOWN_INTRO_SECS),
            step: Duration::from_secs(COUNTDOWN_STEP_SECS),
        }
    }
}

/// Clears the running flag when the countdown ends, however it ends
struct Running(Arc<AtomicBool>);

impl Drop for Running {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Claim the running flag; false if a countdown is already in progress
pub fn try_claim(running: &AtomicBool) -> bool {
    running
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_ok()
}

fn show(value: u8, output: Option<&JsonLines>) {
    info!("countdown {}", value);
    if let Some(output) = output {
        output.emit(&DirectorMessage::Countdown { value });
    }
}

/// Run the sequence; `running` must already be claimed
pub async fn run(
    race: RaceControl,
    output: Option<JsonLines>,
    timing: CountdownTiming,
    running: Arc<AtomicBool>,
) {
    let _running = Running(running);

    show(4, output.as_ref());
    tokio::time::sleep(timing.intro).await;

    for value in [3, 2] {
        if race.game_state() != GameState::Countdown {
            debug!("countdown aborted before {}", value);
            return;
        }
        show(value, output.as_ref());
        tokio::time::sleep(timing.step).await;
    }

    if race.game_state() != GameState::Countdown {
        debug!("countdown aborted before 1");
        return;
    }
    show(1, output.as_ref());
    race.start();
    tokio::time::sleep(timing.step).await;
    show(0, output.as_ref());
}
