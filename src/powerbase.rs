//! One running powerbase: race state, link driver and watchdog
//!
//! Owns the context that used to be process-wide: construct it once at
//! startup, hand out `RaceControl` clones to whoever needs to drive the race,
//! and `close` it on shutdown.

use crate::constants::CAR_COUNT;
use crate::error::{PowerbaseError, Result};
use crate::events::EventQueue;
use crate::link::{DeviceOpener, Link, LinkStats};
use crate::race::{GameState, RaceControl, RaceSnapshot, Scheduler, TokioScheduler};
use crate::watchdog::{self, WatchdogConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;
use tokio::runtime::Handle;
use tracing::warn;

pub struct Powerbase {
    race: RaceControl,
    link: Link,
    shutdown: Arc<AtomicBool>,
    driver: Option<JoinHandle<()>>,
    watchdog: tokio::task::JoinHandle<()>,
}

impl Powerbase {
    /// Open the device and start the link driver and watchdog
    ///
    /// Race events are pushed into `events`; timers run on `runtime`.
    /// `power_rates` are in place before the first frame is decoded.
    pub fn open(
        opener: Box<dyn DeviceOpener>,
        events: EventQueue,
        runtime: &Handle,
        watchdog: WatchdogConfig,
        power_rates: &[u8; CAR_COUNT],
    ) -> Result<Self> {
        let race = RaceControl::new(events);
        for (car_id, &rate) in (0u8..).zip(power_rates) {
            race.set_power_rate(car_id, rate)?;
        }
        let scheduler: Arc<dyn Scheduler> = Arc::new(TokioScheduler::new(runtime.clone()));
        let link = Link::open(opener, race.clone(), scheduler)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let driver = link
            .spawn_driver(shutdown.clone())
            .map_err(|source| PowerbaseError::Runtime { source })?;
        let watchdog = watchdog::spawn(runtime, link.clone(), watchdog, shutdown.clone());

        Ok(Self {
            race,
            link,
            shutdown,
            driver: Some(driver),
            watchdog,
        })
    }

    pub fn race(&self) -> &RaceControl {
        &self.race
    }

    pub fn stop(&self) {
        self.race.stop();
    }

    pub fn init(&self, laps: u8, car_ids: &[u8]) -> Result<()> {
        self.race.init(laps, car_ids)
    }

    pub fn start(&self) {
        self.race.start();
    }

    pub fn bind(&self, car_id: u8) -> Result<()> {
        self.race.bind(car_id)
    }

    pub fn train(&self) {
        self.race.train();
    }

    pub fn set_power_rate(&self, car_id: u8, percentage: u8) -> Result<()> {
        self.race.set_power_rate(car_id, percentage)
    }

    pub fn game_state(&self) -> GameState {
        self.race.game_state()
    }

    pub fn snapshot(&self) -> RaceSnapshot {
        self.race.snapshot()
    }

    /// Time of the last valid inbound frame
    pub fn last_update(&self) -> Instant {
        self.link.last_update()
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    pub fn stats(&self) -> &LinkStats {
        self.link.stats()
    }

    /// Stop the watchdog and the link driver, then release the device
    pub fn close(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.watchdog.abort();
        if let Some(driver) = self.driver.take() {
            if driver.join().is_err() {
                warn!("link driver panicked");
            }
        }
    }
}

impl Drop for Powerbase {
    fn drop(&mut self) {
        self.halt();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::Device;
    use parking_lot::Mutex;
    use std::io;
    use std::time::Duration;

    struct Quiet;

    impl io::Read for Quiet {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            std::thread::sleep(Duration::from_millis(1));
            Err(io::Error::from(io::ErrorKind::TimedOut))
        }
    }

    impl io::Write for Quiet {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct QuietOpener {
        opens: Arc<Mutex<u32>>,
    }

    impl DeviceOpener for QuietOpener {
        fn open(&self) -> Result<Box<dyn Device>> {
            *self.opens.lock() += 1;
            Ok(Box::new(Quiet))
        }

        fn describe(&self) -> &str {
            "quiet"
        }
    }

    fn watchdog() -> WatchdogConfig {
        WatchdogConfig {
            period: Duration::from_secs(60),
            silence_timeout: Duration::from_secs(60),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_power_rates_applied_on_open() {
        let (events, _rx) = EventQueue::channel();
        let powerbase = Powerbase::open(
            Box::new(QuietOpener::default()),
            events,
            &Handle::current(),
            watchdog(),
            &[50, 100, 100, 100, 100, 25],
        )
        .unwrap();

        let cars = powerbase.snapshot().cars;
        assert_eq!(cars[0].power_rate, 50);
        assert_eq!(cars[1].power_rate, 100);
        assert_eq!(cars[5].power_rate, 25);
        assert!(!powerbase.is_connected());
        powerbase.close();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_invalid_power_rate_rejected_before_open() {
        let opener = QuietOpener::default();
        let (events, _rx) = EventQueue::channel();
        let result = Powerbase::open(
            Box::new(opener.clone()),
            events,
            &Handle::current(),
            watchdog(),
            &[100, 0, 100, 100, 100, 100],
        );

        assert!(result.is_err_and(|e| e.is_invalid_argument()));
        assert_eq!(*opener.opens.lock(), 0);
    }
}
