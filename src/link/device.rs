//! Byte device behind the link
//!
//! The link only needs `Read + Write`; opening is behind `DeviceOpener` so the
//! cycle can close and reopen the device on its own, and tests can substitute
//! an in-memory device.

use crate::constants::{BAUD_RATE, SERIAL_TIMEOUT_MS};
use crate::error::{PowerbaseError, Result};
use serialport::{DataBits, FlowControl, Parity, StopBits};
use std::io::{Read, Write};
use std::time::Duration;

/// Bidirectional byte stream to a powerbase
pub trait Device: Read + Write + Send {}

impl<T: Read + Write + Send + ?Sized> Device for T {}

/// Opens (and reopens) the device with fixed parameters
pub trait DeviceOpener: Send {
    fn open(&self) -> Result<Box<dyn Device>>;

    /// Human readable target, for logs
    fn describe(&self) -> &str;
}

/// Serial port at 19200 baud, 8N1, no flow control
pub struct SerialOpener {
    port_name: String,
}

impl SerialOpener {
    pub fn new(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
        }
    }
}

impl DeviceOpener for SerialOpener {
    fn open(&self) -> Result<Box<dyn Device>> {
        let port = serialport::new(&self.port_name, BAUD_RATE)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(SERIAL_TIMEOUT_MS))
            .open()
            .map_err(|e| PowerbaseError::SerialOpen {
                port: self.port_name.clone(),
                source: std::io::Error::other(e.to_string()),
            })?;
        Ok(Box::new(port))
    }

    fn describe(&self) -> &str {
        &self.port_name
    }
}
