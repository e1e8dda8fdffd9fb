//! Powerbase wire format
//!
//! Both directions use fixed-size frames terminated by a CRC-8 over every
//! preceding byte:
//! - **Inbound** (device -> host, 15 bytes): handsets, lap timer, buttons
//! - **Outbound** (host -> device, 9 bytes): drive bytes and LEDs
//!
//! Every bit mask of the protocol lives in this module. Callers only see
//! decoded values (`HandsetInput`, `Button`, crossing car, ...).

pub mod inbound;
pub mod outbound;

pub use inbound::{Button, HandsetInput, InboundFrame, INBOUND_LEN};
pub use outbound::{OpMode, OutboundFrame, OUTBOUND_LEN};

use crc::{Crc, CRC_8_SMBUS};
use std::fmt;

/// CRC-8 (poly 0x07, init 0x00), shared by both directions
const CRC8: Crc<u8> = Crc::<u8>::new(&CRC_8_SMBUS);

/// Compute the frame checksum over `data`
#[inline]
#[must_use]
pub fn checksum(data: &[u8]) -> u8 {
    CRC8.checksum(data)
}

/// Reasons a received frame is discarded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Buffer is not exactly one frame long
    Length { expected: usize, actual: usize },
    /// Trailing checksum does not match the payload
    Checksum { expected: u8, actual: u8 },
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Length { expected, actual } => {
                write!(f, "Frame length {} (expected {})", actual, expected)
            }
            Self::Checksum { expected, actual } => write!(
                f,
                "Checksum mismatch: 0x{:02x} (expected 0x{:02x})",
                actual, expected
            ),
        }
    }
}

impl std::error::Error for FrameError {}

/// Verify the trailing checksum of a complete frame
fn verify(bytes: &[u8], len: usize) -> Result<(), FrameError> {
    if bytes.len() != len {
        return Err(FrameError::Length {
            expected: len,
            actual: bytes.len(),
        });
    }
    let expected = checksum(&bytes[..len - 1]);
    let actual = bytes[len - 1];
    if expected != actual {
        return Err(FrameError::Checksum { expected, actual });
    }
    Ok(())
}
