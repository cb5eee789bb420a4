//! Ramp, clamp and door-interlock arithmetic for the motor level.
//!
//! The motor unit takes an inverted level: [`STOPPED`] (`0x80`) is stop and
//! lower values run faster, down to [`FULL_SPEED`] (`0x00`). [`DriveState`]
//! turns one [`ControllerReading`] per tick into the next motor level:
//!
//! - Accelerating from a stop snaps to [`DEPARTURE_LEVEL`], then gains one
//!   step every N ticks, N = 10, 8, 6, 4, 2 for notches 1..5
//! - Braking loses one step every `11 - notch` ticks (10 down to 2) and
//!   snaps to a stop once past [`STOP_SNAP_LEVEL`]
//! - An emergency reading stops immediately
//! - While stopped with the door open, departure is refused
//!
//! # Example
//!
//! ```rust
//! use rs_trainz_ble::drive::{DriveState, DEPARTURE_LEVEL};
//! use rs_trainz_ble::ControllerReading;
//!
//! let mut drive = DriveState::new();
//! let notch_3 = ControllerReading { accel: 3, changed: true, ..Default::default() };
//!
//! let update = drive.update(&notch_3);
//! assert_eq!(update.speed, DEPARTURE_LEVEL);
//! assert!(update.changed);
//! ```

use crate::reader::ControllerReading;
use crate::traits::STOP_LEVEL;

/// Motor level meaning "stopped".
pub const STOPPED: u8 = STOP_LEVEL;

/// Fastest motor level.
pub const FULL_SPEED: u8 = 0x00;

/// First running level when departing from a stop.
pub const DEPARTURE_LEVEL: u8 = 0x70;

/// Braking past this level stops the train outright.
pub const STOP_SNAP_LEVEL: u8 = 0x7a;

/// Ticks per speed step for accelerator notches 1..5.
pub const ACCEL_STEP_TICKS: [u8; 5] = [10, 8, 6, 4, 2];

/// Ticks per speed step for an accelerator notch (1..5).
pub fn accel_step_ticks(notch: u8) -> u8 {
    let index = notch.clamp(1, ACCEL_STEP_TICKS.len() as u8) - 1;
    ACCEL_STEP_TICKS[index as usize]
}

/// Ticks per speed step for a brake notch (1..9).
pub fn brake_step_ticks(notch: u8) -> u8 {
    11 - notch.clamp(1, 9)
}

/// Result of one drive update.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DriveUpdate {
    /// Motor level after this tick.
    pub speed: u8,
    /// Whether the level differs from the previous tick (send it).
    pub changed: bool,
    /// New emergency lamp state, if this tick decided one.
    pub emergency_lamp: Option<bool>,
}

/// Drive state held by the control loop between ticks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DriveState {
    current_speed: u8,
    signed_accel: i8,
    accel_counter: u8,
    brake_counter: u8,
    emergency_latched: bool,
    door_open: bool,
}

impl Default for DriveState {
    fn default() -> Self {
        Self::new()
    }
}

impl DriveState {
    /// Stopped, no lever applied, door closed.
    pub const fn new() -> Self {
        Self {
            current_speed: STOPPED,
            signed_accel: 0,
            accel_counter: 0,
            brake_counter: 0,
            emergency_latched: false,
            door_open: false,
        }
    }

    /// Advance one tick.
    pub fn update(&mut self, reading: &ControllerReading) -> DriveUpdate {
        let mut speed = self.current_speed as i16;
        let mut emergency_lamp = None;

        if reading.changed {
            if reading.emergency {
                speed = STOPPED as i16;
                self.reset_counters();
            }
            self.emergency_latched = reading.emergency;
            emergency_lamp = Some(reading.emergency);

            self.signed_accel = reading.signed_level();
            if self.signed_accel == 0 {
                self.reset_counters();
            }
        }

        if self.signed_accel > 0 {
            if speed == STOPPED as i16 {
                speed = DEPARTURE_LEVEL as i16;
            } else {
                self.accel_counter += 1;
                if self.accel_counter >= accel_step_ticks(self.signed_accel as u8) {
                    self.accel_counter = 0;
                    speed -= 1;
                }
            }
        } else if self.signed_accel < 0 {
            self.brake_counter += 1;
            if self.brake_counter >= brake_step_ticks(self.signed_accel.unsigned_abs()) {
                self.brake_counter = 0;
                speed += 1;
            }
            if speed > STOP_SNAP_LEVEL as i16 {
                speed = STOPPED as i16;
            }
        }

        let mut speed = speed.clamp(FULL_SPEED as i16, STOPPED as i16) as u8;

        if self.current_speed == STOPPED && speed != STOPPED && self.door_open {
            log::warn!("door open: departure refused");
            emergency_lamp = Some(true);
            speed = STOPPED;
        }

        let changed = speed != self.current_speed;
        self.current_speed = speed;

        DriveUpdate {
            speed,
            changed,
            emergency_lamp,
        }
    }

    fn reset_counters(&mut self) {
        self.accel_counter = 0;
        self.brake_counter = 0;
    }

    /// Mark the door open or closed.
    pub fn set_door_open(&mut self, open: bool) {
        self.door_open = open;
    }

    /// Current motor level.
    #[inline]
    pub const fn current_speed(&self) -> u8 {
        self.current_speed
    }

    /// Signed lever value in effect (-9..=5).
    #[inline]
    pub const fn signed_accel(&self) -> i8 {
        self.signed_accel
    }

    /// Whether the last reading reported the emergency latch.
    #[inline]
    pub const fn emergency_latched(&self) -> bool {
        self.emergency_latched
    }

    /// Whether the door is marked open.
    #[inline]
    pub const fn door_open(&self) -> bool {
        self.door_open
    }

    /// True at [`STOPPED`].
    #[inline]
    pub const fn is_stopped(&self) -> bool {
        self.current_speed == STOPPED
    }
}

/// Convert a motor level to a 0-100 throttle percentage for display.
pub fn throttle_percent(level: u8) -> u8 {
    let level = level.min(STOPPED) as u16;
    ((STOPPED as u16 - level) * 100 / STOPPED as u16) as u8
}
