//! Race director: the event sink behind the command-line front end
//!
//! Turns powerbase buttons into race control: START in training selects the
//! connected handsets and runs the countdown, START anywhere else returns to
//! training. While a countdown task is alive, aborted or not, START is
//! ignored. UP/DOWN change the lap count for the next race and persist it.
//! Every event is logged and, with `--json`, written as a JSON line.

pub mod countdown;
pub mod output;

pub use countdown::CountdownTiming;
pub use output::{DirectorMessage, JsonLines};

use crate::codec::Button;
use crate::config::{self, Config};
use crate::constants::CAR_COUNT;
use crate::events::{EventSink, RaceEvent};
use crate::race::{GameState, RaceControl};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

pub struct Director {
    race: RaceControl,
    runtime: Handle,
    connected: [bool; CAR_COUNT],
    laps: u8,
    config: Config,
    /// Where lap changes are saved; `None` keeps them in memory
    config_path: Option<PathBuf>,
    output: Option<JsonLines>,
    timing: CountdownTiming,
    countdown_running: Arc<AtomicBool>,
}

impl Director {
    pub fn new(race: RaceControl, runtime: Handle, config: Config, laps: u8) -> Self {
        Self {
            race,
            runtime,
            connected: [false; CAR_COUNT],
            laps: laps.max(1),
            config,
            config_path: None,
            output: None,
            timing: CountdownTiming::default(),
            countdown_running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Persist lap changes to `path`
    pub fn with_config_path(mut self, path: PathBuf) -> Self {
        self.config_path = Some(path);
        self
    }

    pub fn with_output(mut self, output: JsonLines) -> Self {
        self.output = Some(output);
        self
    }

    pub fn with_timing(mut self, timing: CountdownTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn laps(&self) -> u8 {
        self.laps
    }

    /// Car slots with a handset currently connected
    pub fn connected_cars(&self) -> Vec<u8> {
        (0..CAR_COUNT)
            .filter(|&slot| self.connected[slot])
            .map(|slot| slot as u8)
            .collect()
    }

    fn emit(&self, event: &RaceEvent) {
        if let Some(output) = &self.output {
            output.emit(event);
        }
    }

    fn driver_name(&self, car_id: u8) -> String {
        self.config
            .driver_for(car_id)
            .map(|d| d.name.clone())
            .unwrap_or_else(|| format!("car {}", car_id + 1))
    }

    fn on_start_button(&mut self) {
        // Held until the countdown task ends, even after a false start
        if self.countdown_running.load(Ordering::Acquire) {
            debug!("countdown still running, START ignored");
            return;
        }
        match self.race.game_state() {
            GameState::Training => {
                if !countdown::try_claim(&self.countdown_running) {
                    return;
                }
                let cars = self.connected_cars();
                if let Err(e) = self.race.init(self.laps, &cars) {
                    self.countdown_running.store(false, Ordering::Release);
                    warn!("cannot start race: {}", e);
                    return;
                }
                info!("race of {} laps for cars {:?}", self.laps, cars);
                self.runtime.spawn(countdown::run(
                    self.race.clone(),
                    self.output.clone(),
                    self.timing,
                    self.countdown_running.clone(),
                ));
            }
            _ => self.race.train(),
        }
    }

    fn change_laps(&mut self, laps: u8) {
        let laps = laps.max(1);
        if laps == self.laps {
            return;
        }
        self.laps = laps;
        info!("laps: {}", laps);
        if let Some(output) = &self.output {
            output.emit(&DirectorMessage::LapsUpdate { laps });
        }

        self.config.race.laps = laps;
        if let Some(path) = &self.config_path {
            if let Err(e) = config::save(path, &self.config) {
                warn!("failed to save laps: {}", e);
            }
        }
    }
}

impl EventSink for Director {
    fn on_button(&mut self, button: Button) {
        self.emit(&RaceEvent::Button { button });
        match button {
            Button::Start => self.on_start_button(),
            Button::Up => self.change_laps(self.laps.saturating_add(1)),
            Button::Down => self.change_laps(self.laps.saturating_sub(1)),
            _ => debug!("button {:?} unused", button),
        }
    }

    fn on_lap(&mut self, car_id: u8, lap: u8, lap_time_us: u64, record: bool) {
        info!(
            "{}: lap {} in {:.3}s{}",
            self.driver_name(car_id),
            lap,
            lap_time_us as f64 / 1_000_000.0,
            if record { " (best)" } else { "" }
        );
        self.emit(&RaceEvent::LapCount {
            car_id,
            lap,
            lap_time_us,
            record,
        });
    }

    fn on_false_start(&mut self, car_id: u8) {
        warn!("false start by {}", self.driver_name(car_id));
        self.emit(&RaceEvent::FalseStart { car_id });
    }

    fn on_game_finished(&mut self, game_time_us: u64, positions: &[u8]) {
        let podium: Vec<String> = positions
            .iter()
            .enumerate()
            .map(|(i, &car)| format!("{}. {}", i + 1, self.driver_name(car)))
            .collect();
        info!("race finished: {}", podium.join(", "));
        self.emit(&RaceEvent::GameFinished {
            game_time_us,
            positions: positions.to_vec(),
        });
    }

    fn on_game_update(&mut self, game_time_us: u64, positions: &[u8]) {
        debug!("game time {} us, positions {:?}", game_time_us, positions);
        self.emit(&RaceEvent::GameUpdate {
            game_time_us,
            positions: positions.to_vec(),
        });
    }

    fn on_state_change(&mut self, state: GameState) {
        info!("game state: {}", state);
        self.emit(&RaceEvent::GameState { state });
    }

    fn on_connectivity_change(&mut self, car_id: u8, connected: bool) {
        if let Some(slot) = self.connected.get_mut(usize::from(car_id)) {
            *slot = connected;
        }
        info!(
            "handset {} {}",
            car_id + 1,
            if connected { "connected" } else { "disconnected" }
        );
        self.emit(&RaceEvent::ControllerChanged { car_id, connected });
    }
}
