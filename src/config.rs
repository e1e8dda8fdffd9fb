//! Configuration management
//!
//! One TOML document holds the serial port, the default lap count, the driver
//! profiles and which driver holds which controller. Every section is
//! `#[serde(default)]`, so a partial or empty file loads.
//!
//! ```toml
//! [link]
//! port = "/dev/ttyS0"
//!
//! [race]
//! laps = 5
//!
//! [[drivers]]
//! id = 1
//! name = "Ayrton"
//! power = 80
//!
//! [[controllers]]
//! id = 0
//! driver = 1
//! ```

use crate::constants::{
    CAR_COUNT, DEFAULT_LAPS, DEFAULT_POWER_RATE, SILENCE_TIMEOUT_MS, WATCHDOG_PERIOD_MS,
};
use crate::error::{PowerbaseError, Result};
use crate::watchdog::WatchdogConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub link: LinkConfig,
    pub race: RaceConfig,
    pub drivers: Vec<Driver>,
    pub controllers: Vec<Controller>,
}

// =============================================================================
// Sections
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Serial device path (the `--port` flag overrides it)
    pub port: String,
    /// How often the watchdog looks at the link
    pub watchdog_period_ms: u64,
    /// Silence after which the link is reopened
    pub silence_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaceConfig {
    /// Target laps for the next race
    pub laps: u8,
}

/// Driver profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    pub id: u32,
    pub name: String,
    /// Power rate in percent, applied to the driver's handset
    #[serde(default = "default_power")]
    pub power: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Controller slot bound to a driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Controller {
    /// Car slot, 0..6
    pub id: u8,
    pub driver: u32,
}

fn default_power() -> u8 {
    DEFAULT_POWER_RATE
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            watchdog_period_ms: WATCHDOG_PERIOD_MS,
            silence_timeout_ms: SILENCE_TIMEOUT_MS,
        }
    }
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self { laps: DEFAULT_LAPS }
    }
}

impl LinkConfig {
    pub fn watchdog(&self) -> WatchdogConfig {
        WatchdogConfig {
            period: Duration::from_millis(self.watchdog_period_ms),
            silence_timeout: Duration::from_millis(self.silence_timeout_ms),
        }
    }
}

impl Config {
    /// Reject values the powerbase cannot take
    pub fn validate(&self) -> Result<()> {
        if self.race.laps == 0 {
            return Err(PowerbaseError::ConfigValidation {
                field: "race.laps",
                reason: "must be at least 1".into(),
            });
        }
        if self.link.watchdog_period_ms == 0 {
            return Err(PowerbaseError::ConfigValidation {
                field: "link.watchdog_period_ms",
                reason: "must be positive".into(),
            });
        }
        for driver in &self.drivers {
            if driver.power == 0 || driver.power > 100 {
                return Err(PowerbaseError::ConfigValidation {
                    field: "drivers.power",
                    reason: format!("driver {}: {} not in 1..=100", driver.id, driver.power),
                });
            }
        }
        for controller in &self.controllers {
            if usize::from(controller.id) >= CAR_COUNT {
                return Err(PowerbaseError::ConfigValidation {
                    field: "controllers.id",
                    reason: format!("{} not in 0..{}", controller.id, CAR_COUNT),
                });
            }
        }
        Ok(())
    }

    pub fn driver(&self, id: u32) -> Option<&Driver> {
        self.drivers.iter().find(|d| d.id == id)
    }

    /// Driver bound to a controller slot
    pub fn driver_for(&self, controller: u8) -> Option<&Driver> {
        self.controllers
            .iter()
            .find(|c| c.id == controller)
            .and_then(|c| self.driver(c.driver))
    }

    /// Power rate for a controller slot; unbound slots run at full power
    pub fn power_rate_for(&self, controller: u8) -> u8 {
        self.driver_for(controller)
            .map(|d| d.power)
            .unwrap_or(DEFAULT_POWER_RATE)
    }
}

/// Load config from `path`; a missing file yields the defaults
pub fn load(path: &Path) -> Result<Config> {
    if !path.exists() {
        debug!("no config at {:?}, using defaults", path);
        return Ok(Config::default());
    }

    let content = fs::read_to_string(path).map_err(|source| PowerbaseError::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;
    let config: Config = toml::from_str(&content).map_err(|e| PowerbaseError::ConfigValidation {
        field: "document",
        reason: e.to_string(),
    })?;
    config.validate()?;
    Ok(config)
}

/// Save config to `path`
pub fn save(path: &Path, config: &Config) -> Result<()> {
    let content =
        toml::to_string_pretty(config).map_err(|e| PowerbaseError::ConfigValidation {
            field: "document",
            reason: e.to_string(),
        })?;
    fs::write(path, content).map_err(|source| PowerbaseError::ConfigWrite {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("powerbase-{}-{}.toml", name, std::process::id()))
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.link.port, "");
        assert_eq!(config.link.watchdog_period_ms, 1000);
        assert_eq!(config.link.silence_timeout_ms, 1000);
        assert_eq!(config.race.laps, DEFAULT_LAPS);
        assert!(config.drivers.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_empty_file() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_config_partial_sections() {
        let partial_toml = r#"
[link]
port = "/dev/ttyUSB0"

[[drivers]]
id = 7
name = "Jo"
"#;
        let config: Config = toml::from_str(partial_toml).unwrap();
        assert_eq!(config.link.port, "/dev/ttyUSB0");
        assert_eq!(config.link.silence_timeout_ms, SILENCE_TIMEOUT_MS);
        assert_eq!(config.race.laps, DEFAULT_LAPS);
        assert_eq!(config.drivers[0].power, DEFAULT_POWER_RATE);
        assert_eq!(config.drivers[0].image, None);
    }

    #[test]
    fn test_power_rate_resolution() {
        let config: Config = toml::from_str(
            r#"
[[drivers]]
id = 1
name = "A"
power = 60

[[drivers]]
id = 2
name = "B"
power = 90
image = "b.png"

[[controllers]]
id = 0
driver = 2

[[controllers]]
id = 3
driver = 1

[[controllers]]
id = 4
driver = 99
"#,
        )
        .unwrap();

        assert_eq!(config.power_rate_for(0), 90);
        assert_eq!(config.power_rate_for(3), 60);
        // Unbound slot and dangling driver reference
        assert_eq!(config.power_rate_for(1), 100);
        assert_eq!(config.power_rate_for(4), 100);
        assert_eq!(config.driver_for(0).map(|d| d.name.as_str()), Some("B"));
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let mut config = Config::default();
        config.drivers.push(Driver {
            id: 1,
            name: "X".into(),
            power: 101,
            image: None,
        });
        assert!(matches!(
            config.validate(),
            Err(PowerbaseError::ConfigValidation {
                field: "drivers.power",
                ..
            })
        ));

        let mut config = Config::default();
        config.controllers.push(Controller { id: 6, driver: 1 });
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.race.laps = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let path = temp_path("missing");
        let _ = fs::remove_file(&path);
        assert_eq!(load(&path).unwrap(), Config::default());
    }

    #[test]
    fn test_load_invalid_document() {
        let path = temp_path("invalid");
        fs::write(&path, "[race]\nlaps = \"three\"\n").unwrap();
        let err = load(&path).unwrap_err();
        let _ = fs::remove_file(&path);
        assert!(matches!(
            err,
            PowerbaseError::ConfigValidation {
                field: "document",
                ..
            }
        ));
    }

    #[test]
    fn test_save_then_load() {
        let path = temp_path("roundtrip");
        let mut config = Config::default();
        config.link.port = "/dev/ttyS1".into();
        config.race.laps = 8;
        config.drivers.push(Driver {
            id: 3,
            name: "Niki".into(),
            power: 75,
            image: Some("niki.png".into()),
        });
        config.controllers.push(Controller { id: 2, driver: 3 });

        save(&path, &config).unwrap();
        let restored = load(&path).unwrap();
        let _ = fs::remove_file(&path);
        assert_eq!(restored, config);
    }
}
