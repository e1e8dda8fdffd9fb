//! JSON-lines event output
//!
//! One object per line, stamped with the local time:
//!
//! ```text
//! {"timestamp":"14:02:11.204","type":"lap_count","car_id":1,"lap":2,...}
//! ```

use parking_lot::Mutex;
use serde::Serialize;
use std::io::{self, Write};
use std::sync::Arc;
use tracing::warn;

/// Messages the director adds on top of race events
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DirectorMessage {
    /// Countdown light, 4 down to 0
    Countdown { value: u8 },
    /// Default lap count changed from the powerbase buttons
    LapsUpdate { laps: u8 },
}

#[derive(Serialize)]
struct Line<'a, T: Serialize> {
    timestamp: String,
    #[serde(flatten)]
    body: &'a T,
}

/// Cloneable line writer shared by the dispatcher and countdown tasks
#[derive(Clone)]
pub struct JsonLines {
    out: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl JsonLines {
    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Arc::new(Mutex::new(Box::new(out))),
        }
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    pub fn emit<T: Serialize>(&self, body: &T) {
        let line = Line {
            timestamp: chrono::Local::now().format("%H:%M:%S%.3f").to_string(),
            body,
        };
        let result = serde_json::to_string(&line)
            .map_err(io::Error::other)
            .and_then(|json| {
                let mut out = self.out.lock();
                writeln!(out, "{}", json)?;
                out.flush()
            });
        if let Err(e) = result {
            warn!("event output failed: {}", e);
        }
    }
}
