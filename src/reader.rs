//! Hand-controller bus reader.
//!
//! Decodes the two-lever train controller (accelerator notches 0-5, brake
//! notches 0-8 plus the emergency position) from the 5-byte bus response.
//!
//! # Frame Layout
//!
//! Every poll clocks out [`READ_COMMAND`] and receives five bytes. Button
//! lines are active low, so both raw codes are taken from the inverted
//! bytes 3 and 4:
//!
//! ```text
//! accel code = ((!b3 & 0x0f) << 1) | ((!b4 & 0x08) >> 3)   (5 bits)
//! brake code =  (!b4 & 0xf0) >> 4                          (4 bits)
//! ```
//!
//! An accelerator code missing from [`ACCEL_CODES`] holds the previous
//! level. A brake code missing from [`BRAKE_CODES`] is the emergency
//! position ([`PANIC_BRAKE`]).
//!
//! # Lever Policy
//!
//! [`LeverState`] applies one decoded frame at a time:
//!
//! 1. Emergency brake latches, forcing the accelerator to 0
//! 2. While latched, only both levers at neutral releases the latch
//! 3. From neutral, brake wins over accelerator
//! 4. While braking, releasing the brake hands over to the accelerator
//! 5. While accelerating, releasing the accelerator hands over to the brake
//!
//! # Example
//!
//! ```rust
//! use rs_trainz_ble::reader::{frame_for_levels, LeverState};
//!
//! let mut levers = LeverState::new();
//!
//! let reading = levers.apply_frame(&frame_for_levels(0, 3));
//! assert!(reading.changed);
//! assert_eq!(reading.brake, 3);
//!
//! // Emergency position latches until both levers return to neutral
//! let reading = levers.apply_frame(&frame_for_levels(0, 9));
//! assert!(reading.emergency);
//! let reading = levers.apply_frame(&frame_for_levels(2, 0));
//! assert!(reading.emergency);
//! assert_eq!(reading.accel, 0);
//! ```

use crate::traits::{ControllerBus, FRAME_LEN};

/// Query frame clocked out on every poll.
pub const READ_COMMAND: [u8; FRAME_LEN] = [0x80, 0x42, 0x00, 0x00, 0x00];

/// Highest accelerator notch.
pub const MAX_ACCEL: u8 = 5;

/// Brake level reported for the emergency position.
pub const PANIC_BRAKE: u8 = 9;

/// Raw accelerator codes, indexed by notch.
pub const ACCEL_CODES: [u8; 6] = [0x1e, 0x1d, 0x1c, 0x17, 0x16, 0x15];

/// Raw brake codes, indexed by notch. Anything else is the emergency position.
pub const BRAKE_CODES: [u8; 9] = [0x0d, 0x07, 0x05, 0x0e, 0x0c, 0x06, 0x04, 0x0b, 0x09];

/// A brake code outside [`BRAKE_CODES`], used when synthesising frames.
pub const PANIC_BRAKE_CODE: u8 = 0x0f;

/// One decoded controller reading.
///
/// Produced once per poll; `changed` tells the control loop whether the
/// lever levels differ from the previous reading.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ControllerReading {
    /// Accelerator notch (0-5).
    pub accel: u8,
    /// Brake notch (0-9, 9 = emergency).
    pub brake: u8,
    /// Emergency latch state.
    pub emergency: bool,
    /// Whether this reading differs from the last one.
    pub changed: bool,
}

impl ControllerReading {
    /// True while the brake lever is applied.
    #[inline]
    pub const fn is_braking(&self) -> bool {
        self.brake > 0
    }

    /// True while the accelerator is applied and the brake is not.
    #[inline]
    pub const fn is_accelerating(&self) -> bool {
        self.brake == 0 && self.accel > 0
    }

    /// Signed lever value: `-brake` while braking, `+accel` while
    /// accelerating, 0 at neutral.
    pub const fn signed_level(&self) -> i8 {
        if self.brake > 0 {
            -(self.brake as i8)
        } else {
            self.accel as i8
        }
    }
}

/// Extract the 5-bit raw accelerator code.
#[inline]
pub const fn accel_code(frame: &[u8; FRAME_LEN]) -> u8 {
    ((!frame[3] & 0x0f) << 1) | ((!frame[4] & 0x08) >> 3)
}

/// Extract the 4-bit raw brake code.
#[inline]
pub const fn brake_code(frame: &[u8; FRAME_LEN]) -> u8 {
    (!frame[4] & 0xf0) >> 4
}

/// Look up the accelerator notch, `None` for unmatched codes.
pub fn decode_accel(frame: &[u8; FRAME_LEN]) -> Option<u8> {
    let code = accel_code(frame);
    ACCEL_CODES.iter().position(|&c| c == code).map(|i| i as u8)
}

/// Look up the brake notch; unmatched codes decode as [`PANIC_BRAKE`].
pub fn decode_brake(frame: &[u8; FRAME_LEN]) -> u8 {
    let code = brake_code(frame);
    BRAKE_CODES
        .iter()
        .position(|&c| c == code)
        .map_or(PANIC_BRAKE, |i| i as u8)
}

/// Build a response frame carrying the given raw codes.
///
/// Inverse of [`accel_code`] / [`brake_code`]; bytes 0-2 carry a plausible
/// header and are ignored by the decoder.
pub const fn encode_frame(accel_code: u8, brake_code: u8) -> [u8; FRAME_LEN] {
    let b3 = !((accel_code >> 1) & 0x0f);
    let b4 = !(((brake_code & 0x0f) << 4) | ((accel_code & 0x01) << 3));
    [0xff, 0x41, 0x5a, b3, b4]
}

/// Build a response frame for lever notches.
///
/// Accelerator notches above [`MAX_ACCEL`] are clamped; brake notches of 9
/// or more produce the emergency position.
pub fn frame_for_levels(accel: u8, brake: u8) -> [u8; FRAME_LEN] {
    let accel_code = ACCEL_CODES[accel.min(MAX_ACCEL) as usize];
    let brake_code = BRAKE_CODES
        .get(brake as usize)
        .copied()
        .unwrap_or(PANIC_BRAKE_CODE);
    encode_frame(accel_code, brake_code)
}

/// Lever state machine with hysteresis and the emergency latch.
///
/// Pure: the output depends only on the frame and the previous state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LeverState {
    accel: u8,
    brake: u8,
    emergency: bool,
}

impl LeverState {
    /// Both levers at neutral, not latched.
    pub const fn new() -> Self {
        Self {
            accel: 0,
            brake: 0,
            emergency: false,
        }
    }

    /// Apply one response frame and return the resulting reading.
    pub fn apply_frame(&mut self, frame: &[u8; FRAME_LEN]) -> ControllerReading {
        let accel = decode_accel(frame).unwrap_or(self.accel);
        let brake = decode_brake(frame);
        let changed = self.apply_levels(accel, brake);
        self.reading(changed)
    }

    fn apply_levels(&mut self, accel: u8, brake: u8) -> bool {
        if !self.emergency && brake == PANIC_BRAKE {
            self.emergency = true;
            self.accel = 0;
            self.brake = PANIC_BRAKE;
            return true;
        }

        if self.emergency {
            // Both levers must be back at neutral before driving resumes
            if accel == 0 && brake == 0 {
                self.emergency = false;
                self.accel = 0;
                self.brake = 0;
                return true;
            }
            return false;
        }

        if self.accel == 0 && self.brake == 0 {
            if brake > 0 {
                self.brake = brake;
                true
            } else if accel > 0 {
                self.accel = accel;
                true
            } else {
                false
            }
        } else if self.brake > 0 {
            if brake > 0 {
                let changed = self.brake != brake;
                self.brake = brake;
                changed
            } else {
                self.accel = accel;
                self.brake = 0;
                true
            }
        } else {
            // Accelerating
            if accel > 0 {
                let changed = self.accel != accel;
                self.accel = accel;
                changed
            } else {
                self.accel = 0;
                self.brake = brake;
                true
            }
        }
    }

    /// Current levels as an unchanged reading.
    pub const fn current(&self) -> ControllerReading {
        self.reading(false)
    }

    /// Whether the emergency latch is set.
    #[inline]
    pub const fn is_emergency(&self) -> bool {
        self.emergency
    }

    const fn reading(&self, changed: bool) -> ControllerReading {
        ControllerReading {
            accel: self.accel,
            brake: self.brake,
            emergency: self.emergency,
            changed,
        }
    }
}

/// Polls the controller bus and keeps the lever state.
///
/// # Example
///
/// ```rust
/// use rs_trainz_ble::reader::{frame_for_levels, BusReader};
/// use rs_trainz_ble::hal::MockBus;
///
/// let mut reader = BusReader::new(MockBus::with_frame(frame_for_levels(4, 0)));
/// let reading = reader.poll();
/// assert_eq!(reading.accel, 4);
/// assert!(reading.changed);
///
/// // Same frame again: no change
/// assert!(!reader.poll().changed);
/// ```
pub struct BusReader<B: ControllerBus> {
    bus: B,
    levers: LeverState,
    response: [u8; FRAME_LEN],
    failed_transfers: u32,
}

impl<B: ControllerBus> BusReader<B> {
    /// Create a reader with both levers at neutral.
    pub fn new(bus: B) -> Self {
        Self {
            bus,
            levers: LeverState::new(),
            response: [0; FRAME_LEN],
            failed_transfers: 0,
        }
    }

    /// Issue one transfer and decode it.
    ///
    /// A failed transfer holds the previous levels and reports no change.
    pub fn poll(&mut self) -> ControllerReading {
        match self.bus.transfer(&READ_COMMAND, &mut self.response) {
            Ok(()) => {
                let reading = self.levers.apply_frame(&self.response);
                if reading.changed {
                    log::debug!(
                        "controller: accel={} brake={} emergency={}",
                        reading.accel,
                        reading.brake,
                        reading.emergency
                    );
                }
                reading
            }
            Err(e) => {
                self.failed_transfers = self.failed_transfers.saturating_add(1);
                log::trace!("controller transfer failed: {:?}", e);
                self.levers.current()
            }
        }
    }

    /// The latest levels without touching the bus.
    pub fn current(&self) -> ControllerReading {
        self.levers.current()
    }

    /// Number of bus transfers that returned an error.
    pub fn failed_transfers(&self) -> u32 {
        self.failed_transfers
    }

    /// Get a reference to the bus.
    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Get a mutable reference to the bus.
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }
}
