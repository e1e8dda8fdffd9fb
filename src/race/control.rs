//! Shared handle to the race state machine
//!
//! The link driver thread, the watchdog, grace-delay timers and the caller's
//! control surface all reach the same `RaceMachine` through one
//! `parking_lot::Mutex`. Every operation holds the lock only for local CPU
//! work.

use super::{CarState, GameState, RaceMachine};
use crate::constants::{CAR_COUNT, FINISH_GRACE_SECS};
use crate::error::Result;
use crate::events::EventQueue;
use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Timed work raised by the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deferred {
    /// Every active car is through: publish the result after the grace delay
    FinishRace { game_time_us: u64 },
}

impl Deferred {
    pub fn delay(&self) -> Duration {
        match self {
            Deferred::FinishRace { .. } => Duration::from_secs(FINISH_GRACE_SECS),
        }
    }
}

/// Runs a task once after a delay, without blocking the caller
pub trait Scheduler: Send + Sync {
    fn schedule(&self, delay: Duration, task: Box<dyn FnOnce() + Send>);
}

/// Scheduler backed by tokio timers
///
/// Pending tasks are dropped with the runtime.
pub struct TokioScheduler {
    handle: tokio::runtime::Handle,
}

impl TokioScheduler {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: Box<dyn FnOnce() + Send>) {
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            task();
        });
    }
}

/// Serializable view of the race, e.g. for a UI that just connected
#[derive(Debug, Clone, Serialize)]
pub struct RaceSnapshot {
    pub state: GameState,
    pub target_laps: u8,
    pub game_time_us: u64,
    pub finished_cars: u8,
    pub positions: Vec<u8>,
    pub cars: [CarState; CAR_COUNT],
}

/// Cloneable control surface over the race state machine
#[derive(Clone)]
pub struct RaceControl {
    inner: Arc<Mutex<RaceMachine>>,
}

impl RaceControl {
    pub fn new(events: EventQueue) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RaceMachine::new(events))),
        }
    }

    /// Direct access for the link cycle
    pub fn lock(&self) -> MutexGuard<'_, RaceMachine> {
        self.inner.lock()
    }

    pub fn stop(&self) {
        self.inner.lock().stop();
    }

    pub fn init(&self, laps: u8, car_ids: &[u8]) -> Result<()> {
        self.inner.lock().init(laps, car_ids)
    }

    pub fn start(&self) {
        self.inner.lock().start();
    }

    pub fn bind(&self, car_id: u8) -> Result<()> {
        self.inner.lock().bind(car_id)
    }

    pub fn train(&self) {
        self.inner.lock().train();
    }

    pub fn set_power_rate(&self, car_id: u8, percentage: u8) -> Result<()> {
        self.inner.lock().set_power_rate(car_id, percentage)
    }

    pub fn set_power(&self, car_id: u8, power: u8) -> Result<()> {
        self.inner.lock().set_power(car_id, power)
    }

    pub fn set_brake(&self, car_id: u8, enable: bool) -> Result<()> {
        self.inner.lock().set_brake(car_id, enable)
    }

    pub fn set_lane_change(&self, car_id: u8, enable: bool) -> Result<()> {
        self.inner.lock().set_lane_change(car_id, enable)
    }

    pub fn game_state(&self) -> GameState {
        self.inner.lock().game_state()
    }

    pub fn snapshot(&self) -> RaceSnapshot {
        let race = self.inner.lock();
        let game = race.game();
        let training = game.state == GameState::Training;
        RaceSnapshot {
            state: game.state,
            target_laps: game.target_laps,
            game_time_us: game.game_time_us,
            finished_cars: game.finished_cars,
            positions: game
                .positions
                .iter()
                .filter(|&&slot| training || race.car(slot).active)
                .map(|&slot| slot as u8)
                .collect(),
            cars: *race.cars(),
        }
    }

    /// Hand pending timed work to `scheduler`
    pub fn schedule_deferred(&self, scheduler: &dyn Scheduler) {
        let pending = self.inner.lock().take_deferred();
        for work in pending {
            let race = self.clone();
            scheduler.schedule(work.delay(), Box::new(move || race.run_deferred(work)));
        }
    }

    fn run_deferred(&self, work: Deferred) {
        match work {
            Deferred::FinishRace { game_time_us } => self.inner.lock().finish_race(game_time_us),
        }
    }
}
