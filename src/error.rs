//! Centralized error types for the powerbase link
//!
//! All link, race and config errors are represented by the `PowerbaseError` enum.
//! Use `Result<T>` as shorthand for `std::result::Result<T, PowerbaseError>`.
//!
//! Corrupt frames are not errors at this level: they are recovered inside the
//! link cycle (see `codec::FrameError`).

use std::fmt;
use std::path::PathBuf;

/// All powerbase errors
#[derive(Debug)]
pub enum PowerbaseError {
    // === Serial device ===
    /// Failed to open the serial device
    SerialOpen {
        port: String,
        source: std::io::Error,
    },
    /// Read from the device failed
    Read { source: std::io::Error },
    /// Write to the device failed
    Write { source: std::io::Error },

    // === Rejected control operations ===
    /// Car slot outside 0..6
    InvalidCarId { car_id: u8 },
    /// Power value above the 6-bit maximum
    InvalidPower { power: u8 },
    /// Power rate outside 1..=100
    InvalidPowerRate { percentage: u8 },
    /// `init` called without any car
    NoCarsSelected,

    // === Config ===
    /// Config file could not be read
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Config file could not be written
    ConfigWrite {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Invalid config value
    ConfigValidation { field: &'static str, reason: String },

    // === Runtime ===
    /// Tokio runtime or thread creation failed
    Runtime { source: std::io::Error },
}

impl PowerbaseError {
    /// True for errors raised by device I/O (the watchdog recovers these)
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            Self::SerialOpen { .. } | Self::Read { .. } | Self::Write { .. }
        )
    }

    /// True for rejected control operations
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            Self::InvalidCarId { .. }
                | Self::InvalidPower { .. }
                | Self::InvalidPowerRate { .. }
                | Self::NoCarsSelected
        )
    }
}

impl std::error::Error for PowerbaseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::SerialOpen { source, .. }
            | Self::Read { source }
            | Self::Write { source }
            | Self::ConfigRead { source, .. }
            | Self::ConfigWrite { source, .. }
            | Self::Runtime { source } => Some(source),
            _ => None,
        }
    }
}

impl fmt::Display for PowerbaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SerialOpen { port, source } => {
                write!(f, "Cannot open serial device {}: {}", port, source)
            }
            Self::Read { source } => write!(f, "Serial read failed: {}", source),
            Self::Write { source } => write!(f, "Serial write failed: {}", source),
            Self::InvalidCarId { car_id } => write!(f, "Invalid car id {}", car_id),
            Self::InvalidPower { power } => write!(f, "Invalid power value {}", power),
            Self::InvalidPowerRate { percentage } => {
                write!(f, "Invalid power rate {}%", percentage)
            }
            Self::NoCarsSelected => write!(f, "At least one car is needed to start a race"),
            Self::ConfigRead { path, .. } => write!(f, "Cannot read config: {}", path.display()),
            Self::ConfigWrite { path, .. } => {
                write!(f, "Cannot write config: {}", path.display())
            }
            Self::ConfigValidation { field, reason } => {
                write!(f, "Invalid {}: {}", field, reason)
            }
            Self::Runtime { source } => write!(f, "Failed to start runtime: {}", source),
        }
    }
}

/// Alias for Result with PowerbaseError
pub type Result<T> = std::result::Result<T, PowerbaseError>;
