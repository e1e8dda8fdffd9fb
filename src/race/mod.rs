//! Race state machine
//!
//! Consumes consecutive inbound frames (current and previous) and turns their
//! differences into race semantics: handset edges become drive bits, lap timer
//! changes become crossings, laps, records and finish order, button edges
//! become button events. It also owns the outbound frame fields and the LED
//! reset sequence applied on the write path.
//!
//! Notifications go through the `EventQueue`; timed follow-ups (the finish
//! grace delay) are queued as `Deferred` work for the caller to schedule.

pub mod car;
pub mod control;
pub mod ranking;
pub mod state;

pub use car::CarState;
pub use control::{Deferred, RaceControl, RaceSnapshot, Scheduler, TokioScheduler};
pub use state::{GameState, LedReset};

use crate::codec::outbound::{handset_led, BRAKE, LANE_CHANGE, LED_GREEN, LED_RED, MAX_POWER};
use crate::codec::{InboundFrame, OutboundFrame};
use crate::constants::{
    BIND_TIMEOUT_SECS, CAR_COUNT, COAST_POWER, COAST_WINDOW_US, GAME_UPDATE_INTERVAL_US,
};
use crate::error::{PowerbaseError, Result};
use crate::events::{EventQueue, RaceEvent};
use std::time::{Duration, Instant};
use tracing::debug;

/// Game-wide bookkeeping
#[derive(Debug, Clone)]
pub struct GameData {
    pub state: GameState,
    pub target_laps: u8,
    pub active_cars: u8,
    pub finished_cars: u8,
    /// Last lap timer value, microseconds
    pub game_time_us: u64,
    /// Every slot, leader first
    pub positions: [usize; CAR_COUNT],
}

/// Race state machine for one powerbase
pub struct RaceMachine {
    cars: [CarState; CAR_COUNT],
    game: GameData,
    out: OutboundFrame,
    led_reset: LedReset,
    next_game_update_us: u64,
    handset_connected: [bool; CAR_COUNT],
    binding: Option<(usize, Instant)>,
    events: EventQueue,
    deferred: Vec<Deferred>,
}

fn check_car(car_id: u8) -> Result<usize> {
    if usize::from(car_id) < CAR_COUNT {
        Ok(usize::from(car_id))
    } else {
        Err(PowerbaseError::InvalidCarId { car_id })
    }
}

impl RaceMachine {
    /// Start in training with an LED reset pending
    pub fn new(events: EventQueue) -> Self {
        let mut machine = Self {
            cars: [CarState::default(); CAR_COUNT],
            game: GameData {
                state: GameState::Training,
                target_laps: crate::constants::DEFAULT_LAPS,
                active_cars: 0,
                finished_cars: 0,
                game_time_us: 0,
                positions: std::array::from_fn(|i| i),
            },
            out: OutboundFrame::new(),
            led_reset: LedReset::BothOn,
            next_game_update_us: 0,
            handset_connected: [false; CAR_COUNT],
            binding: None,
            events,
            deferred: Vec::new(),
        };
        machine.reset_game_data();
        machine
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn game_state(&self) -> GameState {
        self.game.state
    }

    pub fn game(&self) -> &GameData {
        &self.game
    }

    pub fn car(&self, slot: usize) -> &CarState {
        &self.cars[slot]
    }

    pub fn cars(&self) -> &[CarState; CAR_COUNT] {
        &self.cars
    }

    /// Current outbound fields, without advancing the LED reset sequence
    pub fn outbound(&self) -> &OutboundFrame {
        &self.out
    }

    pub fn led_reset(&self) -> LedReset {
        self.led_reset
    }

    /// Take timed work raised since the last call
    pub fn take_deferred(&mut self) -> Vec<Deferred> {
        std::mem::take(&mut self.deferred)
    }

    // =========================================================================
    // Control operations
    // =========================================================================

    /// Stop the game and cut every car
    pub fn stop(&mut self) {
        self.set_game_state(GameState::Stopped);
        self.led_reset = LedReset::BothOn;
    }

    /// Select cars and enter the countdown
    ///
    /// Duplicate ids count once. Nothing changes when the input is rejected.
    pub fn init(&mut self, laps: u8, car_ids: &[u8]) -> Result<()> {
        if car_ids.is_empty() {
            return Err(PowerbaseError::NoCarsSelected);
        }
        let slots = car_ids
            .iter()
            .map(|&id| check_car(id))
            .collect::<Result<Vec<_>>>()?;

        self.game.target_laps = laps;
        for car in &mut self.cars {
            car.active = false;
        }
        for slot in slots {
            self.cars[slot].active = true;
        }
        self.game.active_cars = self.cars.iter().filter(|c| c.active).count() as u8;
        self.set_game_state(GameState::Countdown);
        self.led_reset = LedReset::BothOn;
        Ok(())
    }

    /// Leave the countdown; the race begins on the next LED reset boundary
    pub fn start(&mut self) {
        if self.game.state == GameState::Countdown {
            self.set_game_state(GameState::Starting);
            self.led_reset = LedReset::BothOn;
        }
    }

    /// Show the bind pattern for `car_id`, then fall back to training
    pub fn bind(&mut self, car_id: u8) -> Result<()> {
        self.bind_at(car_id, Instant::now())
    }

    pub(crate) fn bind_at(&mut self, car_id: u8, now: Instant) -> Result<()> {
        let slot = check_car(car_id)?;
        self.set_game_state(GameState::Stopped);
        self.set_game_state(GameState::Binding);
        self.led_reset = LedReset::BothOn;
        self.binding = Some((slot, now));
        Ok(())
    }

    /// Free driving for every handset
    pub fn train(&mut self) {
        self.set_game_state(GameState::Training);
        self.led_reset = LedReset::BothOn;
    }

    pub fn set_power_rate(&mut self, car_id: u8, percentage: u8) -> Result<()> {
        let slot = check_car(car_id)?;
        if percentage == 0 || percentage > 100 {
            return Err(PowerbaseError::InvalidPowerRate { percentage });
        }
        self.cars[slot].power_rate = percentage;
        Ok(())
    }

    /// Command power (0..=63), scaled by the car's power rate
    pub fn set_power(&mut self, car_id: u8, power: u8) -> Result<()> {
        let slot = check_car(car_id)?;
        if power > MAX_POWER {
            return Err(PowerbaseError::InvalidPower { power });
        }
        self.apply_power(slot, power);
        Ok(())
    }

    pub fn set_brake(&mut self, car_id: u8, enable: bool) -> Result<()> {
        let slot = check_car(car_id)?;
        self.out.set_drive_flag(slot, BRAKE, enable);
        Ok(())
    }

    pub fn set_lane_change(&mut self, car_id: u8, enable: bool) -> Result<()> {
        let slot = check_car(car_id)?;
        self.out.set_drive_flag(slot, LANE_CHANGE, enable);
        Ok(())
    }

    // =========================================================================
    // Link hooks
    // =========================================================================

    /// Process one accepted frame against the previously accepted one
    pub fn on_frame(&mut self, cur: &InboundFrame, prev: &InboundFrame, now: Instant) {
        if self.game.state == GameState::Binding {
            self.update_binding(now);
        } else {
            self.update_connectivity(cur);
            self.update_handsets(cur, prev);
            self.update_game(cur, prev);
            self.update_buttons(cur, prev);
        }

        if cur.aux_current != prev.aux_current {
            debug!(
                "aux current changed: {} -> {}",
                prev.aux_current, cur.aux_current
            );
        }
    }

    /// Fields for the next write, applying the LED reset sequence
    pub fn next_outbound(&mut self) -> OutboundFrame {
        match self.led_reset {
            LedReset::BothOn => {
                self.out.led_status |= LED_GREEN | LED_RED;
                self.led_reset = LedReset::RedOff;
            }
            LedReset::RedOff => {
                self.out.led_status |= LED_GREEN;
                self.out.led_status &= !LED_RED;
                self.led_reset = LedReset::Idle;
                self.next_game_update_us = 0;
                if self.game.state == GameState::Starting {
                    self.set_game_state(GameState::Race);
                }
            }
            LedReset::Idle => {
                if self.game.state == GameState::Race {
                    self.out.led_status |= LED_RED;
                    self.out.led_status &= !LED_GREEN;
                }
            }
        }
        self.out
    }

    /// The link came back after a reconnect: hardware state is unknown
    pub fn on_link_restored(&mut self) {
        self.binding = None;
        self.reset_game_data();
        self.led_reset = LedReset::BothOn;
        self.set_game_state(GameState::Training);
    }

    /// End the race: stop and publish the final positions
    ///
    /// Runs after the finish grace delay. A late call after a manual stop only
    /// repeats the stop.
    pub fn finish_race(&mut self, game_time_us: u64) {
        let positions = self.reported_positions();
        self.set_game_state(GameState::Stopped);
        self.events.push(RaceEvent::GameFinished {
            game_time_us,
            positions,
        });
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn set_game_state(&mut self, state: GameState) {
        if self.game.state == state {
            return;
        }
        self.game.state = state;
        if state == GameState::Stopped {
            for slot in 0..CAR_COUNT {
                self.out.set_drive_power(slot, 0);
                self.out.set_drive_flag(slot, LANE_CHANGE, false);
            }
        }
        if state.resets_race_data() {
            self.reset_game_data();
        }
        if state != GameState::Race {
            self.led_reset = LedReset::BothOn;
        }
        debug!("game state -> {}", state);
        self.events.push(RaceEvent::GameState { state });
    }

    fn reset_game_data(&mut self) {
        for car in &mut self.cars {
            car.reset();
        }
        self.game.game_time_us = 0;
        self.game.finished_cars = 0;
        self.game.positions = ranking::rank(&self.cars);
    }

    fn apply_power(&mut self, slot: usize, power: u8) {
        let scaled = self.cars[slot].scaled_power(power);
        self.out.set_drive_power(slot, scaled);
    }

    /// Ranked slots as reported to consumers
    fn reported_positions(&mut self) -> Vec<u8> {
        self.game.positions = ranking::rank(&self.cars);
        let all = self.game.state == GameState::Training;
        self.game
            .positions
            .iter()
            .filter(|&&slot| all || self.cars[slot].active)
            .map(|&slot| slot as u8)
            .collect()
    }

    fn update_binding(&mut self, now: Instant) {
        match self.binding {
            Some((slot, started))
                if now.saturating_duration_since(started)
                    < Duration::from_secs(BIND_TIMEOUT_SECS) =>
            {
                self.out.led_status = LED_RED | handset_led(slot);
            }
            _ => {
                self.binding = None;
                self.set_game_state(GameState::Training);
                self.led_reset = LedReset::BothOn;
            }
        }
    }

    fn update_connectivity(&mut self, cur: &InboundFrame) {
        let mut leds = 0;
        for slot in 0..CAR_COUNT {
            let connected = cur.handset_connected(slot);
            if connected {
                leds |= handset_led(slot);
            }
            if self.handset_connected[slot] != connected {
                self.handset_connected[slot] = connected;
                self.events.push(RaceEvent::ControllerChanged {
                    car_id: slot as u8,
                    connected,
                });
            }
        }
        self.out.led_status = leds;
    }

    fn update_handsets(&mut self, cur: &InboundFrame, prev: &InboundFrame) {
        if self.game.state == GameState::Stopped {
            return;
        }
        let training = self.game.state == GameState::Training;
        for slot in 0..CAR_COUNT {
            let car = self.cars[slot];
            if training || (car.active && !car.finished) {
                let now = cur.handset(slot);
                let last = prev.handset(slot);
                if now.brake != last.brake {
                    debug!("handset {}: brake {}", slot, now.brake);
                    self.out.set_drive_flag(slot, BRAKE, now.brake);
                }
                if now.lane_change != last.lane_change {
                    debug!("handset {}: lane change {}", slot, now.lane_change);
                    self.out.set_drive_flag(slot, LANE_CHANGE, now.lane_change);
                }
                if now.power != last.power {
                    debug!("handset {}: power {}", slot, now.power);
                    self.apply_power(slot, now.power);
                }
            } else if car.active && car.finished && self.out.drive_power(slot) > 0 {
                let since_finish = self.game.game_time_us.saturating_sub(car.last_crossing_us);
                let power = if since_finish < COAST_WINDOW_US {
                    COAST_POWER
                } else {
                    0
                };
                self.apply_power(slot, power);
            }
        }
    }

    fn update_game(&mut self, cur: &InboundFrame, prev: &InboundFrame) {
        if cur.lap_timer == prev.lap_timer {
            return;
        }
        let now_us = cur.lap_timer_us();
        self.game.game_time_us = now_us;

        if let Some(slot) = cur.crossing_car() {
            let state = self.game.state;
            if state.is_timed() {
                self.record_crossing(slot, now_us);
            } else if state.is_pre_race() {
                self.events.push(RaceEvent::FalseStart {
                    car_id: slot as u8,
                });
                self.set_game_state(GameState::Stopped);
            }
        }

        if now_us > self.next_game_update_us {
            let positions = self.reported_positions();
            self.events.push(RaceEvent::GameUpdate {
                game_time_us: now_us,
                positions,
            });
            self.next_game_update_us = now_us + GAME_UPDATE_INTERVAL_US;
        }
    }

    fn record_crossing(&mut self, slot: usize, now_us: u64) {
        let racing = self.game.state == GameState::Race;
        let car = &mut self.cars[slot];
        if racing && (!car.active || car.finished) {
            debug!("ignoring crossing of car {} (not racing)", slot);
            return;
        }

        let lap_time = now_us.saturating_sub(car.last_crossing_us);
        car.last_crossing_us = now_us;
        if car.laps > 0 {
            let record = car.best_lap_us == 0 || lap_time < car.best_lap_us;
            if record {
                car.best_lap_us = lap_time;
            }
            self.events.push(RaceEvent::LapCount {
                car_id: slot as u8,
                lap: car.laps,
                lap_time_us: lap_time,
                record,
            });
        } else {
            car.start_time_us = now_us;
        }

        if racing && car.laps >= self.game.target_laps {
            car.finished = true;
            self.game.finished_cars += 1;
            if self.game.finished_cars == self.game.active_cars {
                self.deferred.push(Deferred::FinishRace {
                    game_time_us: now_us,
                });
            }
        } else {
            car.laps = car.laps.saturating_add(1);
        }
    }

    fn update_buttons(&mut self, cur: &InboundFrame, prev: &InboundFrame) {
        if cur.button_status == prev.button_status {
            return;
        }
        if let Some(button) = cur.pressed_button() {
            debug!("button {:?}", button);
            self.events.push(RaceEvent::Button { button });
        }
    }
}
