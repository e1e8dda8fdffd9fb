//! Outbound control frame (host -> device)
//!
//! Layout (9 bytes):
//!
//! | Offset | Field      | Notes                                               |
//! |--------|------------|-----------------------------------------------------|
//! | 0      | op_mode    | 0xFF drive mode, 0xBF aux mode                      |
//! | 1..7   | drive[6]   | active-low: bit7 brake, bit6 lane change, bits0..5 power |
//! | 7      | led_status | bit7 green, bit6 red, bits0..5 handset LEDs 1..6    |
//! | 8      | checksum   | CRC-8 over bytes 0..8                               |
//!
//! Drive bytes are edited through their complement so unrelated bits stay
//! untouched.

use super::{checksum, verify, FrameError};
use crate::constants::CAR_COUNT;

/// Outbound frame size in bytes
pub const OUTBOUND_LEN: usize = 9;

/// Drive bit: brake
pub const BRAKE: u8 = 1 << 7;
/// Drive bit: lane change
pub const LANE_CHANGE: u8 = 1 << 6;
/// Drive bits: 6-bit power
pub const POWER_MASK: u8 = 0x3F;
/// Maximum power value
pub const MAX_POWER: u8 = POWER_MASK;

/// Green state LED
pub const LED_GREEN: u8 = 1 << 7;
/// Red state LED
pub const LED_RED: u8 = 1 << 6;

/// LED bit for the handset in `slot` (0-based)
#[inline]
pub const fn handset_led(slot: usize) -> u8 {
    1 << slot
}

/// Powerbase operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpMode {
    Drive,
    Aux,
}

impl OpMode {
    const DRIVE: u8 = 0xFF;
    const AUX: u8 = 0xBF;

    pub const fn to_wire(self) -> u8 {
        match self {
            OpMode::Drive => Self::DRIVE,
            OpMode::Aux => Self::AUX,
        }
    }

    pub const fn from_wire(byte: u8) -> Option<Self> {
        match byte {
            Self::DRIVE => Some(OpMode::Drive),
            Self::AUX => Some(OpMode::Aux),
            _ => None,
        }
    }
}

/// One outbound control frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutboundFrame {
    pub op_mode: u8,
    pub drive: [u8; CAR_COUNT],
    pub led_status: u8,
}

impl Default for OutboundFrame {
    fn default() -> Self {
        Self::new()
    }
}

impl OutboundFrame {
    /// Drive mode, nothing asserted, both state LEDs on
    pub const fn new() -> Self {
        Self {
            op_mode: OpMode::Drive.to_wire(),
            drive: [0xFF; CAR_COUNT],
            led_status: LED_GREEN | LED_RED,
        }
    }

    /// Serialize with a fresh checksum
    pub fn encode(&self) -> [u8; OUTBOUND_LEN] {
        let mut out = [0u8; OUTBOUND_LEN];
        out[0] = self.op_mode;
        out[1..7].copy_from_slice(&self.drive);
        out[7] = self.led_status;
        out[OUTBOUND_LEN - 1] = checksum(&out[..OUTBOUND_LEN - 1]);
        out
    }

    /// Decode a complete frame, validating its checksum
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        verify(bytes, OUTBOUND_LEN)?;
        let mut drive = [0u8; CAR_COUNT];
        drive.copy_from_slice(&bytes[1..7]);
        Ok(Self {
            op_mode: bytes[0],
            drive,
            led_status: bytes[7],
        })
    }

    /// Assert or release a drive bit (`BRAKE` or `LANE_CHANGE`)
    pub fn set_drive_flag(&mut self, slot: usize, mask: u8, enable: bool) {
        let mut asserted = !self.drive[slot];
        if enable {
            asserted |= mask;
        } else {
            asserted &= !mask;
        }
        self.drive[slot] = !asserted;
    }

    /// Drive bit is asserted
    pub fn drive_flag(&self, slot: usize, mask: u8) -> bool {
        !self.drive[slot] & mask != 0
    }

    /// Write the 6-bit power value, keeping brake and lane change
    pub fn set_drive_power(&mut self, slot: usize, power: u8) {
        let mut asserted = !self.drive[slot];
        asserted &= !POWER_MASK;
        asserted |= power & POWER_MASK;
        self.drive[slot] = !asserted;
    }

    /// Commanded power for `slot`
    pub fn drive_power(&self, slot: usize) -> u8 {
        !self.drive[slot] & POWER_MASK
    }

    pub fn led(&self, mask: u8) -> bool {
        self.led_status & mask != 0
    }
}
