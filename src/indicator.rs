//! Status and emergency lamps.
//!
//! The status lamp runs a small blink state machine advanced once per
//! control tick; the emergency lamp is driven directly.
//!
//! # Example
//!
//! ```rust
//! use rs_trainz_ble::indicator::{IndicatorStatus, StatusIndicator, SCANNING_BLINK_TICKS};
//! use rs_trainz_ble::hal::MockLine;
//!
//! let mut indicator = StatusIndicator::new(MockLine::new(), MockLine::new()).unwrap();
//! indicator.set_status(IndicatorStatus::ScanningBlink);
//!
//! for _ in 0..SCANNING_BLINK_TICKS {
//!     indicator.tick().unwrap();
//! }
//! assert!(indicator.status_line().level);
//! ```

use crate::traits::IndicatorLine;

/// Ticks between toggles while initialising.
pub const INIT_BLINK_TICKS: u16 = 20;

/// Ticks between toggles while scanning.
pub const SCANNING_BLINK_TICKS: u16 = 8;

/// What the status lamp shows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum IndicatorStatus {
    /// Lamp dark.
    #[default]
    Off,
    /// Slow blink during startup.
    InitBlink,
    /// Fast blink while looking for the train.
    ScanningBlink,
    /// Lamp lit while the link is up.
    SteadyOn,
}

impl IndicatorStatus {
    /// Ticks between toggles, for the blinking states.
    pub const fn blink_ticks(&self) -> Option<u16> {
        match self {
            IndicatorStatus::InitBlink => Some(INIT_BLINK_TICKS),
            IndicatorStatus::ScanningBlink => Some(SCANNING_BLINK_TICKS),
            IndicatorStatus::Off | IndicatorStatus::SteadyOn => None,
        }
    }
}

/// Status lamp state machine plus the independent emergency lamp.
pub struct StatusIndicator<O: IndicatorLine> {
    status_line: O,
    emergency_line: O,
    status: IndicatorStatus,
    counter: u16,
    lit: bool,
    emergency: bool,
}

impl<O: IndicatorLine> StatusIndicator<O> {
    /// Take both lines and drive them low.
    pub fn new(mut status_line: O, mut emergency_line: O) -> Result<Self, O::Error> {
        status_line.set_level(false)?;
        emergency_line.set_level(false)?;
        Ok(Self {
            status_line,
            emergency_line,
            status: IndicatorStatus::Off,
            counter: 0,
            lit: false,
            emergency: false,
        })
    }

    /// Switch the status pattern. Restarts the blink counter on change only.
    pub fn set_status(&mut self, status: IndicatorStatus) {
        if status == self.status {
            return;
        }
        log::debug!("indicator: {:?} -> {:?}", self.status, status);
        self.counter = 0;
        self.status = status;
    }

    /// Advance one tick and write the status line.
    pub fn tick(&mut self) -> Result<(), O::Error> {
        match self.status.blink_ticks() {
            Some(period) => {
                self.counter += 1;
                if self.counter >= period {
                    self.lit = !self.lit;
                    self.counter = 0;
                }
            }
            None => self.lit = self.status == IndicatorStatus::SteadyOn,
        }
        self.status_line.set_level(self.lit)
    }

    /// Drive the emergency lamp.
    pub fn set_emergency(&mut self, on: bool) -> Result<(), O::Error> {
        self.emergency = on;
        self.emergency_line.set_level(on)
    }

    /// Drive both lamps low, e.g. on shutdown.
    pub fn all_off(&mut self) -> Result<(), O::Error> {
        self.status = IndicatorStatus::Off;
        self.counter = 0;
        self.lit = false;
        self.status_line.set_level(false)?;
        self.set_emergency(false)
    }

    /// Current status pattern.
    pub fn status(&self) -> IndicatorStatus {
        self.status
    }

    /// Whether the status lamp is currently lit.
    pub fn is_lit(&self) -> bool {
        self.lit
    }

    /// Last value written to the emergency lamp.
    pub fn emergency(&self) -> bool {
        self.emergency
    }

    /// Get a reference to the status line.
    pub fn status_line(&self) -> &O {
        &self.status_line
    }

    /// Get a reference to the emergency line.
    pub fn emergency_line(&self) -> &O {
        &self.emergency_line
    }

    /// Get a mutable reference to the status line.
    pub fn status_line_mut(&mut self) -> &mut O {
        &mut self.status_line
    }

    /// Get a mutable reference to the emergency line.
    pub fn emergency_line_mut(&mut self) -> &mut O {
        &mut self.emergency_line
    }
}
