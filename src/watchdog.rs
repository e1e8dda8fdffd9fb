//! Link watchdog
//!
//! Every period, compares the link's `last_update` against the silence
//! timeout and forces a full reconnect when the powerbase has gone quiet. A
//! failed reopen is retried on the next period; there is no backoff.

use crate::link::Link;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogConfig {
    pub period: Duration,
    pub silence_timeout: Duration,
}

/// Reconnect `link` if it has been silent for longer than `silence_timeout`
///
/// Returns whether a reconnect was issued. The comparison and the reopen
/// share one lock, so a frame accepted in between cannot be torn down.
pub fn check(link: &Link, silence_timeout: Duration, now: Instant) -> bool {
    let mut cycle = link.lock();
    let silent_for = now.saturating_duration_since(cycle.last_update());
    if silent_for > silence_timeout {
        debug!("no valid frame for {:?}, reconnecting", silent_for);
        cycle.reconnect(now);
        true
    } else {
        false
    }
}

/// Run the watchdog on `runtime` until `shutdown` is set
pub fn spawn(
    runtime: &Handle,
    link: Link,
    config: WatchdogConfig,
    shutdown: Arc<AtomicBool>,
) -> JoinHandle<()> {
    runtime.spawn(async move {
        let start = time::Instant::now() + config.period;
        let mut interval = time::interval_at(start, config.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if shutdown.load(Ordering::Relaxed) {
                break;
            }
            // The link lock may be held for a serial read timeout
            let link = link.clone();
            let silence = config.silence_timeout;
            let checked =
                tokio::task::spawn_blocking(move || check(&link, silence, Instant::now())).await;
            if let Err(e) = checked {
                debug!("watchdog check aborted: {}", e);
            }
        }
    })
}
