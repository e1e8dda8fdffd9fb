//! Inbound telemetry frame (device -> host)
//!
//! Layout (15 bytes):
//!
//! | Offset | Field          | Notes                                        |
//! |--------|----------------|----------------------------------------------|
//! | 0      | status         | bit0 track power, bits1..6 handsets 1..6, bit7 analog/digital |
//! | 1..7   | handset[6]     | active-low: bit7 brake, bit6 lane change, bits0..5 power |
//! | 7      | aux_current    | raw, passed through                          |
//! | 8      | carid_and_flag | bits0..2: 1-based car that last crossed (0 none, 7 invalid) |
//! | 9..13  | lap_timer      | u32 little-endian, 1 tick = 6.4 us           |
//! | 13     | button_status  | active-low powerbase buttons                 |
//! | 14     | checksum       | CRC-8 over bytes 0..14                       |

use super::{checksum, verify, FrameError};
use crate::constants::CAR_COUNT;

/// Inbound frame size in bytes
pub const INBOUND_LEN: usize = 15;

const TRACK_POWER: u8 = 1;
const ANALOG_DIGITAL: u8 = 1 << 7;

const HANDSET_BRAKE: u8 = 1 << 7;
const HANDSET_LANE_CHANGE: u8 = 1 << 6;
const HANDSET_POWER: u8 = 0x3F;

const CARID_MASK: u8 = 0x07;
const CARID_INVALID: u8 = 7;

/// Decoded handset state (already inverted from active-low)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HandsetInput {
    pub brake: bool,
    pub lane_change: bool,
    /// Trigger position 0..=63
    pub power: u8,
}

impl HandsetInput {
    fn from_wire(byte: u8) -> Self {
        let asserted = !byte;
        Self {
            brake: asserted & HANDSET_BRAKE != 0,
            lane_change: asserted & HANDSET_LANE_CHANGE != 0,
            power: asserted & HANDSET_POWER,
        }
    }

    /// Encode back to the active-low wire byte
    pub fn to_wire(self) -> u8 {
        let mut asserted = self.power & HANDSET_POWER;
        if self.brake {
            asserted |= HANDSET_BRAKE;
        }
        if self.lane_change {
            asserted |= HANDSET_LANE_CHANGE;
        }
        !asserted
    }
}

/// Powerbase front-panel buttons, in reporting priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Button {
    Start,
    Right,
    Up,
    Enter,
    Left,
    Down,
}

impl Button {
    /// All buttons, highest priority first
    pub const PRIORITY: [Button; 6] = [
        Button::Start,
        Button::Right,
        Button::Up,
        Button::Enter,
        Button::Left,
        Button::Down,
    ];

    /// Bit of this button in `button_status`
    pub const fn code(self) -> u8 {
        match self {
            Button::Start => 1,
            Button::Right => 1 << 1,
            Button::Up => 1 << 2,
            Button::Enter => 1 << 3,
            Button::Left => 1 << 4,
            Button::Down => 1 << 5,
        }
    }
}

/// One inbound telemetry frame
///
/// Fields hold the raw wire bytes; accessors apply the bit layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InboundFrame {
    pub status: u8,
    pub handset: [u8; CAR_COUNT],
    pub aux_current: u8,
    pub carid_and_flag: u8,
    pub lap_timer: u32,
    pub button_status: u8,
}

impl Default for InboundFrame {
    /// Idle powerbase: nothing pressed, no crossing, timer at zero
    fn default() -> Self {
        Self {
            status: 0,
            handset: [0xFF; CAR_COUNT],
            aux_current: 0,
            carid_and_flag: 0,
            lap_timer: 0,
            button_status: 0xFF,
        }
    }
}

impl InboundFrame {
    /// Decode a complete frame, validating its checksum
    ///
    /// A frame failing validation yields no fields at all.
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        verify(bytes, INBOUND_LEN)?;
        let mut handset = [0u8; CAR_COUNT];
        handset.copy_from_slice(&bytes[1..7]);
        Ok(Self {
            status: bytes[0],
            handset,
            aux_current: bytes[7],
            carid_and_flag: bytes[8],
            lap_timer: u32::from_le_bytes([bytes[9], bytes[10], bytes[11], bytes[12]]),
            button_status: bytes[13],
        })
    }

    /// Serialize with a fresh checksum
    pub fn encode(&self) -> [u8; INBOUND_LEN] {
        let mut out = [0u8; INBOUND_LEN];
        out[0] = self.status;
        out[1..7].copy_from_slice(&self.handset);
        out[7] = self.aux_current;
        out[8] = self.carid_and_flag;
        out[9..13].copy_from_slice(&self.lap_timer.to_le_bytes());
        out[13] = self.button_status;
        out[INBOUND_LEN - 1] = checksum(&out[..INBOUND_LEN - 1]);
        out
    }

    /// Track power is on
    pub fn track_power(&self) -> bool {
        self.status & TRACK_POWER != 0
    }

    /// Powerbase reports digital car mode
    pub fn digital_mode(&self) -> bool {
        self.status & ANALOG_DIGITAL != 0
    }

    /// Handset in `slot` (0-based) is connected
    pub fn handset_connected(&self, slot: usize) -> bool {
        slot < CAR_COUNT && self.status & (1 << (slot + 1)) != 0
    }

    /// Decoded handset state for `slot` (0-based)
    pub fn handset(&self, slot: usize) -> HandsetInput {
        HandsetInput::from_wire(self.handset[slot])
    }

    /// 0-based index of the car that last crossed the line, if any
    pub fn crossing_car(&self) -> Option<usize> {
        match self.carid_and_flag & CARID_MASK {
            0 | CARID_INVALID => None,
            id => Some(id as usize - 1),
        }
    }

    /// Lap timer converted to microseconds (1 tick = 6.4 us, truncated)
    pub fn lap_timer_us(&self) -> u64 {
        u64::from(self.lap_timer) * 64 / 10
    }

    /// Highest priority button currently held, if any
    pub fn pressed_button(&self) -> Option<Button> {
        let pressed = !self.button_status;
        Button::PRIORITY
            .into_iter()
            .find(|button| pressed & button.code() != 0)
    }
}
