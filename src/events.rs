//! Race notifications and their ordered delivery
//!
//! The race state machine never calls consumers inline. It pushes a
//! `RaceEvent` into an `EventQueue` (an unbounded channel, so pushing never
//! blocks the serial cycle) and a dedicated dispatcher thread hands the events
//! to an `EventSink` one by one, in the order they were raised.

use crate::codec::Button;
use crate::race::GameState;
use serde::Serialize;
use std::thread::JoinHandle;
use tokio::sync::mpsc;
use tracing::trace;

/// Consumer of race notifications (UI bridge, CLI, tests)
///
/// Every callback receives fully computed values and runs on the dispatcher
/// thread. A slow callback delays later events but never the serial link.
pub trait EventSink: Send + 'static {
    fn on_button(&mut self, button: Button);
    fn on_lap(&mut self, car_id: u8, lap: u8, lap_time_us: u64, record: bool);
    fn on_false_start(&mut self, car_id: u8);
    fn on_game_finished(&mut self, game_time_us: u64, positions: &[u8]);
    fn on_game_update(&mut self, game_time_us: u64, positions: &[u8]);
    fn on_state_change(&mut self, state: GameState);
    fn on_connectivity_change(&mut self, car_id: u8, connected: bool);
}

/// One notification raised by the race state machine
///
/// Car ids are 0-based slot indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RaceEvent {
    Button {
        button: Button,
    },
    LapCount {
        car_id: u8,
        lap: u8,
        lap_time_us: u64,
        record: bool,
    },
    FalseStart {
        car_id: u8,
    },
    GameFinished {
        game_time_us: u64,
        positions: Vec<u8>,
    },
    GameUpdate {
        game_time_us: u64,
        positions: Vec<u8>,
    },
    GameState {
        state: GameState,
    },
    ControllerChanged {
        car_id: u8,
        connected: bool,
    },
}

impl RaceEvent {
    /// Hand the event to the matching sink callback
    pub fn deliver(&self, sink: &mut dyn EventSink) {
        match self {
            RaceEvent::Button { button } => sink.on_button(*button),
            RaceEvent::LapCount {
                car_id,
                lap,
                lap_time_us,
                record,
            } => sink.on_lap(*car_id, *lap, *lap_time_us, *record),
            RaceEvent::FalseStart { car_id } => sink.on_false_start(*car_id),
            RaceEvent::GameFinished {
                game_time_us,
                positions,
            } => sink.on_game_finished(*game_time_us, positions),
            RaceEvent::GameUpdate {
                game_time_us,
                positions,
            } => sink.on_game_update(*game_time_us, positions),
            RaceEvent::GameState { state } => sink.on_state_change(*state),
            RaceEvent::ControllerChanged { car_id, connected } => {
                sink.on_connectivity_change(*car_id, *connected)
            }
        }
    }
}

/// Sending half of the ordered event queue
#[derive(Debug, Clone)]
pub struct EventQueue {
    tx: mpsc::UnboundedSender<RaceEvent>,
}

impl EventQueue {
    /// Create a queue and its receiving end
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<RaceEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Submit an event (dropped silently once the dispatcher is gone)
    pub fn push(&self, event: RaceEvent) {
        if let Err(e) = self.tx.send(event) {
            trace!("event dropped, dispatcher closed: {:?}", e.0);
        }
    }
}

/// Run `sink` on a dedicated thread until every `EventQueue` is dropped
///
/// Returns the sink when the queue closes.
pub fn spawn_dispatcher<S: EventSink>(
    mut rx: mpsc::UnboundedReceiver<RaceEvent>,
    mut sink: S,
) -> std::io::Result<JoinHandle<S>> {
    std::thread::Builder::new()
        .name("powerbase-events".to_string())
        .spawn(move || {
            while let Some(event) = rx.blocking_recv() {
                event.deliver(&mut sink);
            }
            sink
        })
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Sink that records every callback as the event it came from
    #[derive(Default)]
    pub struct RecordingSink {
        pub events: Vec<RaceEvent>,
    }

    impl EventSink for RecordingSink {
        fn on_button(&mut self, button: Button) {
            self.events.push(RaceEvent::Button { button });
        }

        fn on_lap(&mut self, car_id: u8, lap: u8, lap_time_us: u64, record: bool) {
            self.events.push(RaceEvent::LapCount {
                car_id,
                lap,
                lap_time_us,
                record,
            });
        }

        fn on_false_start(&mut self, car_id: u8) {
            self.events.push(RaceEvent::FalseStart { car_id });
        }

        fn on_game_finished(&mut self, game_time_us: u64, positions: &[u8]) {
            self.events.push(RaceEvent::GameFinished {
                game_time_us,
                positions: positions.to_vec(),
            });
        }

        fn on_game_update(&mut self, game_time_us: u64, positions: &[u8]) {
            self.events.push(RaceEvent::GameUpdate {
                game_time_us,
                positions: positions.to_vec(),
            });
        }

        fn on_state_change(&mut self, state: GameState) {
            self.events.push(RaceEvent::GameState { state });
        }

        fn on_connectivity_change(&mut self, car_id: u8, connected: bool) {
            self.events.push(RaceEvent::ControllerChanged { car_id, connected });
        }
    }
}
