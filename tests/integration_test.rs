//! Integration tests for the link cycle
//!
//! Drives the full READ/WRITE cycle against an in-memory powerbase: inbound
//! frames are queued by the test, outbound frames are captured.

use parking_lot::Mutex;
use powerbase_link::codec::outbound::LANE_CHANGE;
use powerbase_link::codec::{InboundFrame, OutboundFrame, INBOUND_LEN, OUTBOUND_LEN};
use powerbase_link::error::Result;
use powerbase_link::events::{EventQueue, RaceEvent};
use powerbase_link::link::{Device, DeviceOpener, Link, Progress};
use powerbase_link::race::{GameState, RaceControl, Scheduler};
use powerbase_link::watchdog;
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedReceiver;

// =============================================================================
// Mock powerbase
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Read(usize),
    Write(usize),
}

#[derive(Default)]
struct Wire {
    /// Bytes the device will send, served in chunks of at most `chunk`
    inbound: VecDeque<u8>,
    chunk: usize,
    outbound: Vec<u8>,
    ops: Vec<Op>,
    opens: u32,
}

#[derive(Clone, Default)]
struct MockPowerbase {
    wire: Arc<Mutex<Wire>>,
}

impl MockPowerbase {
    fn with_chunk(chunk: usize) -> Self {
        let mock = Self::default();
        mock.wire.lock().chunk = chunk;
        mock
    }

    fn send(&self, frame: &InboundFrame) {
        self.send_raw(&frame.encode());
    }

    fn send_raw(&self, bytes: &[u8]) {
        self.wire.lock().inbound.extend(bytes.iter().copied());
    }

    fn outbound_frames(&self) -> Vec<OutboundFrame> {
        self.wire
            .lock()
            .outbound
            .chunks(OUTBOUND_LEN)
            .map(|chunk| OutboundFrame::decode(chunk).unwrap())
            .collect()
    }

    fn ops(&self) -> Vec<Op> {
        self.wire.lock().ops.clone()
    }

    fn opens(&self) -> u32 {
        self.wire.lock().opens
    }
}

struct MockDevice {
    wire: Arc<Mutex<Wire>>,
}

impl io::Read for MockDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut wire = self.wire.lock();
        if wire.inbound.is_empty() {
            return Err(io::Error::from(io::ErrorKind::TimedOut));
        }
        let limit = if wire.chunk == 0 { buf.len() } else { wire.chunk };
        let n = buf.len().min(limit).min(wire.inbound.len());
        for slot in buf.iter_mut().take(n) {
            *slot = wire.inbound.pop_front().unwrap_or(0);
        }
        wire.ops.push(Op::Read(n));
        Ok(n)
    }
}

impl io::Write for MockDevice {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut wire = self.wire.lock();
        wire.outbound.extend_from_slice(buf);
        wire.ops.push(Op::Write(buf.len()));
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl DeviceOpener for MockPowerbase {
    fn open(&self) -> Result<Box<dyn Device>> {
        self.wire.lock().opens += 1;
        Ok(Box::new(MockDevice {
            wire: self.wire.clone(),
        }))
    }

    fn describe(&self) -> &str {
        "mock"
    }
}

/// Keeps grace-delay tasks until the test fires them
#[derive(Default)]
struct HeldTimers {
    tasks: Mutex<Vec<(Duration, Box<dyn FnOnce() + Send>)>>,
}

impl HeldTimers {
    fn fire_all(&self) -> Vec<Duration> {
        let tasks = std::mem::take(&mut *self.tasks.lock());
        tasks
            .into_iter()
            .map(|(delay, task)| {
                task();
                delay
            })
            .collect()
    }
}

impl Scheduler for HeldTimers {
    fn schedule(&self, delay: Duration, task: Box<dyn FnOnce() + Send>) {
        self.tasks.lock().push((delay, task));
    }
}

// =============================================================================
// Harness
// =============================================================================

struct Bench {
    mock: MockPowerbase,
    link: Link,
    race: RaceControl,
    timers: Arc<HeldTimers>,
    rx: UnboundedReceiver<RaceEvent>,
    now: Instant,
}

impl Bench {
    fn new(chunk: usize) -> Self {
        let mock = MockPowerbase::with_chunk(chunk);
        let (events, rx) = EventQueue::channel();
        let race = RaceControl::new(events);
        let timers = Arc::new(HeldTimers::default());
        let link = Link::open(Box::new(mock.clone()), race.clone(), timers.clone()).unwrap();
        Self {
            mock,
            link,
            race,
            timers,
            rx,
            now: Instant::now(),
        }
    }

    /// Step until one inbound frame is complete (accepted or discarded)
    fn exchange(&mut self) -> Progress {
        self.now += Duration::from_millis(5);
        for _ in 0..64 {
            match self.link.step(self.now).unwrap() {
                p @ (Progress::Accepted | Progress::Discarded) => return p,
                Progress::Pending => panic!("device ran dry"),
                _ => {}
            }
        }
        panic!("no frame completed");
    }

    /// Step until the pending write is out
    fn write(&mut self) {
        for _ in 0..8 {
            if self.link.step(self.now).unwrap() == Progress::Written {
                return;
            }
        }
        panic!("write did not complete");
    }

    fn deliver(&mut self, frame: InboundFrame) -> Progress {
        self.mock.send(&frame);
        self.exchange()
    }

    fn events(&mut self) -> Vec<RaceEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}

/// Lap timer ticks for a time in microseconds (multiples of 32 us are exact)
fn ticks(us: u64) -> u32 {
    (us * 10 / 64) as u32
}

fn crossing(base: &InboundFrame, car_id: u8, at_us: u64) -> InboundFrame {
    let mut frame = *base;
    frame.carid_and_flag = car_id + 1;
    frame.lap_timer = ticks(at_us);
    frame
}

// =============================================================================
// Tests
// =============================================================================

#[test]
fn test_half_duplex_alternation() {
    let mut bench = Bench::new(4);
    for _ in 0..3 {
        bench.deliver(InboundFrame::default());
    }
    bench.write();

    let ops = bench.mock.ops();
    // Every write is one whole frame, and reads never overlap a write
    let mut read_total = 0;
    let mut writes = 0;
    for op in &ops {
        match *op {
            Op::Write(n) => {
                assert_eq!(n, OUTBOUND_LEN);
                assert_eq!(read_total % INBOUND_LEN, 0, "write during a read");
                writes += 1;
            }
            Op::Read(n) => {
                assert!(n <= 4);
                read_total += n;
            }
        }
    }
    assert_eq!(ops.first(), Some(&Op::Write(OUTBOUND_LEN)));
    assert_eq!(read_total, 3 * INBOUND_LEN);
    assert_eq!(writes, 4);
    assert_eq!(bench.link.stats().frames_in(), 3);
    assert_eq!(bench.link.stats().frames_out(), 4);
}

#[test]
fn test_led_reset_sequence_on_the_wire() {
    let mut bench = Bench::new(0);
    for _ in 0..3 {
        bench.deliver(InboundFrame::default());
    }
    bench.write();

    let frames = bench.mock.outbound_frames();
    assert_eq!(frames[0], OutboundFrame::new());
    // Connecting restarts the reset: both on, then green only
    assert_eq!(frames[1].led_status, 0xC0);
    assert_eq!(frames[2].led_status, 0x80);
    // Then the handset LEDs alone, none connected
    assert_eq!(frames[3].led_status, 0x00);
}

#[test]
fn test_first_frame_connects_and_only_primes() {
    let mut bench = Bench::new(0);
    assert!(!bench.link.is_connected());

    let mut frame = InboundFrame::default();
    frame.handset[3] = 0xBF;
    assert_eq!(bench.deliver(frame), Progress::Accepted);
    assert!(bench.link.is_connected());
    assert_eq!(bench.link.last_update(), bench.now);
    assert!(bench.events().is_empty());
    assert_eq!(bench.race.lock().outbound().drive[3], 0xFF);
}

#[test]
fn test_training_lane_change_edge() {
    let mut bench = Bench::new(0);
    bench.deliver(InboundFrame::default());

    let mut frame = InboundFrame::default();
    frame.handset[3] = 0xBF;
    bench.deliver(frame);
    bench.write();
    let last = *bench.mock.outbound_frames().last().unwrap();
    assert_eq!(last.drive[3], 0xBF);

    // Released elsewhere; the unchanged handset byte must not re-assert it
    bench.race.set_lane_change(3, false).unwrap();
    bench.deliver(frame);
    bench.write();
    let last = *bench.mock.outbound_frames().last().unwrap();
    assert!(!last.drive_flag(3, LANE_CHANGE));
}

#[test]
fn test_corrupt_frame_leaves_state() {
    let mut bench = Bench::new(0);
    bench.deliver(InboundFrame::default());
    let accepted_at = bench.link.last_update();

    let mut bytes = crossing(&InboundFrame::default(), 2, 1_000_000).encode();
    bytes[5] ^= 0x01;
    bench.mock.send_raw(&bytes);
    assert_eq!(bench.exchange(), Progress::Discarded);

    assert_eq!(bench.link.last_update(), accepted_at);
    assert_eq!(bench.race.snapshot().cars[2].laps, 0);
    assert!(bench.events().is_empty());
    assert_eq!(bench.link.stats().frames_corrupt(), 1);

    // The cycle carries on with the next frame
    assert_eq!(
        bench.deliver(crossing(&InboundFrame::default(), 2, 1_000_000)),
        Progress::Accepted
    );
    assert_eq!(bench.race.snapshot().cars[2].laps, 1);
}

#[test]
fn test_false_start_scenario() {
    let mut bench = Bench::new(0);
    bench.deliver(InboundFrame::default());
    bench.events();

    bench.race.init(3, &[0, 1]).unwrap();
    assert_eq!(bench.race.game_state(), GameState::Countdown);
    bench.race.start();
    assert_eq!(bench.race.game_state(), GameState::Starting);

    bench.deliver(crossing(&InboundFrame::default(), 0, 1_000_000));
    let events = bench.events();
    let false_starts: Vec<&RaceEvent> = events
        .iter()
        .filter(|e| matches!(e, RaceEvent::FalseStart { .. }))
        .collect();
    assert_eq!(false_starts, vec![&RaceEvent::FalseStart { car_id: 0 }]);
    assert!(!events
        .iter()
        .any(|e| matches!(e, RaceEvent::LapCount { .. })));
    assert!(!events.contains(&RaceEvent::GameState {
        state: GameState::Race
    }));

    for _ in 0..3 {
        bench.deliver(InboundFrame::default());
    }
    let snapshot = bench.race.snapshot();
    assert_eq!(snapshot.state, GameState::Stopped);
    assert_eq!(snapshot.finished_cars, 0);
}

#[test]
fn test_race_to_finish_through_link() {
    let mut bench = Bench::new(5);
    let idle = InboundFrame::default();
    bench.deliver(idle);

    bench.race.init(1, &[1, 4]).unwrap();
    bench.race.start();
    bench.deliver(idle);
    bench.deliver(idle);
    assert_eq!(bench.race.game_state(), GameState::Race);
    bench.events();

    bench.deliver(crossing(&idle, 1, 1_000_000));
    bench.deliver(crossing(&idle, 4, 1_100_000));
    bench.deliver(crossing(&idle, 4, 4_900_000));
    bench.deliver(crossing(&idle, 1, 5_200_000));
    assert_eq!(bench.race.snapshot().finished_cars, 2);

    assert_eq!(bench.timers.fire_all(), vec![Duration::from_secs(2)]);
    let events = bench.events();
    assert!(events.contains(&RaceEvent::LapCount {
        car_id: 4,
        lap: 1,
        lap_time_us: 3_800_000,
        record: true,
    }));
    assert_eq!(
        events.last(),
        Some(&RaceEvent::GameFinished {
            game_time_us: 5_200_000,
            positions: vec![4, 1],
        })
    );
    assert_eq!(bench.race.game_state(), GameState::Stopped);
}

#[test]
fn test_watchdog_reconnect_resets_race() {
    let mut bench = Bench::new(0);
    bench.deliver(InboundFrame::default());
    bench.deliver(crossing(&InboundFrame::default(), 0, 1_000_000));
    bench.race.stop();
    assert_eq!(bench.race.snapshot().cars[0].laps, 1);
    bench.events();

    // Half a frame arrives, then the powerbase goes quiet
    let partial = InboundFrame::default().encode();
    bench.mock.send_raw(&partial[..7]);
    bench.link.step(bench.now).unwrap();
    bench.link.step(bench.now).unwrap();

    let silence = Duration::from_secs(1);
    assert!(!watchdog::check(&bench.link, silence, bench.now + silence));
    let later = bench.now + Duration::from_millis(1500);
    assert!(watchdog::check(&bench.link, silence, later));
    assert_eq!(bench.mock.opens(), 2);
    assert!(!bench.link.is_connected());
    assert_eq!(bench.link.last_update(), later);
    assert_eq!(bench.link.stats().reconnects(), 1);

    // Fresh start: write first, stale half frame is gone
    bench.now = later;
    let mut frame = InboundFrame::default();
    frame.handset[2] = !20;
    assert_eq!(bench.deliver(frame), Progress::Accepted);
    assert!(bench.link.is_connected());
    assert_eq!(bench.mock.ops().last(), Some(&Op::Read(INBOUND_LEN)));

    let snapshot = bench.race.snapshot();
    assert_eq!(snapshot.state, GameState::Training);
    assert_eq!(snapshot.cars[0].laps, 0);
    // First frame after the reopen only primes the edge detector
    assert_eq!(bench.race.lock().outbound().drive_power(2), 0);
    assert!(bench.events().contains(&RaceEvent::GameState {
        state: GameState::Training
    }));
}
