//! Main throttle controller that ties everything together.
//!
//! This module provides [`ThrottleController`], the fixed-period control loop
//! that coordinates the bus reader, the drive arithmetic, the motor link and
//! the lamps.
//!
//! # Overview
//!
//! Each call to [`ThrottleController::tick`]:
//! - Starts a connection (scanning blink, emergency lamp off) when the link
//!   is neither connected nor connecting
//! - When connected, polls the controller, advances the ramp and sends the
//!   new motor level only if it changed
//! - Advances the status lamp's blink pattern
//!
//! # Example
//!
//! ```rust
//! use rs_trainz_ble::{ThrottleController, IndicatorStatus};
//! use rs_trainz_ble::hal::{MockBus, MockLine, MockLink};
//!
//! let link = MockLink::new();
//! let mut throttle =
//!     ThrottleController::new(link, MockBus::with_levels(2, 0), MockLine::new(), MockLine::new())
//!         .unwrap();
//!
//! // Not connected: the first tick starts scanning
//! throttle.tick().unwrap();
//! assert_eq!(throttle.state().indicator, IndicatorStatus::ScanningBlink);
//! assert_eq!(throttle.link().connect_calls(), 1);
//!
//! // Once the link is up the lever drives the train
//! throttle.link().set_connected(true);
//! throttle.tick().unwrap();
//! assert_eq!(throttle.current_speed(), 0x70);
//! ```

use crate::drive::{throttle_percent, DriveState, DriveUpdate};
use crate::indicator::{IndicatorStatus, StatusIndicator};
use crate::reader::BusReader;
use crate::traits::{ControllerBus, IndicatorLine, MotorLink};

/// What one control tick did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// Link was idle; a connection was started.
    Connecting,
    /// Link is scanning or discovering; nothing driven.
    Waiting,
    /// Link is ready; the drive was updated.
    Drove(DriveUpdate),
}

/// Main throttle controller.
///
/// # Type Parameters
///
/// - `L`: The motor link ([`MotorLink`] trait)
/// - `B`: The hand controller bus ([`ControllerBus`] trait)
/// - `O`: The lamp outputs ([`IndicatorLine`] trait)
///
/// # Thread Safety
///
/// The controller is driven from a single task. The link it holds may be
/// shared (e.g. `&LinkManager`) with code that awaits link operations.
pub struct ThrottleController<L: MotorLink, B: ControllerBus, O: IndicatorLine> {
    link: L,
    reader: BusReader<B>,
    indicator: StatusIndicator<O>,
    drive: DriveState,
}

impl<L: MotorLink, B: ControllerBus, O: IndicatorLine> ThrottleController<L, B, O> {
    /// Create a controller. Both lamps start low, the status lamp in the
    /// initialising blink.
    pub fn new(link: L, bus: B, status_line: O, emergency_line: O) -> Result<Self, O::Error> {
        let mut indicator = StatusIndicator::new(status_line, emergency_line)?;
        indicator.set_status(IndicatorStatus::InitBlink);
        Ok(Self {
            link,
            reader: BusReader::new(bus),
            indicator,
            drive: DriveState::new(),
        })
    }

    /// Run one control period.
    pub fn tick(&mut self) -> Result<TickOutcome, O::Error> {
        let outcome = if !self.link.is_connected() && !self.link.is_connecting() {
            self.indicator.set_status(IndicatorStatus::ScanningBlink);
            self.indicator.set_emergency(false)?;
            self.link.connect();
            TickOutcome::Connecting
        } else if self.link.is_connected() {
            self.indicator.set_status(IndicatorStatus::SteadyOn);
            TickOutcome::Drove(self.drive()?)
        } else {
            TickOutcome::Waiting
        };

        self.indicator.tick()?;
        Ok(outcome)
    }

    fn drive(&mut self) -> Result<DriveUpdate, O::Error> {
        let reading = self.reader.poll();
        let update = self.drive.update(&reading);

        // Motor first: a failing lamp must not swallow a stop command
        if update.changed {
            log::trace!("motor level {:#04x}", update.speed);
            self.link.set_motor_speed(update.speed as i32);
        }
        if let Some(on) = update.emergency_lamp {
            self.indicator.set_emergency(on)?;
        }
        Ok(update)
    }

    /// Advance only the status lamp, e.g. while waiting in
    /// `LinkManager::initialize`.
    pub fn tick_indicator(&mut self) -> Result<(), O::Error> {
        self.indicator.tick()
    }

    /// Mark the door open or closed for the departure interlock.
    pub fn set_door_open(&mut self, open: bool) {
        if open != self.drive.door_open() {
            log::info!("door {}", if open { "opened" } else { "closed" });
        }
        self.drive.set_door_open(open);
    }

    /// Drive both lamps low.
    pub fn lamps_off(&mut self) -> Result<(), O::Error> {
        self.indicator.all_off()
    }

    /// Get the current state for display.
    pub fn state(&self) -> ThrottleState {
        let reading = self.reader.current();
        let speed = self.drive.current_speed();
        ThrottleState {
            speed,
            throttle_percent: throttle_percent(speed),
            accel: reading.accel,
            brake: reading.brake,
            emergency: reading.emergency,
            door_open: self.drive.door_open(),
            indicator: self.indicator.status(),
            connected: self.link.is_connected(),
        }
    }

    /// Get just the current motor level
    pub fn current_speed(&self) -> u8 {
        self.drive.current_speed()
    }

    /// Get a reference to the link.
    pub fn link(&self) -> &L {
        &self.link
    }

    /// Get a reference to the bus reader.
    pub fn reader(&self) -> &BusReader<B> {
        &self.reader
    }

    /// Get a mutable reference to the bus reader.
    pub fn reader_mut(&mut self) -> &mut BusReader<B> {
        &mut self.reader
    }

    /// Get a reference to the lamps.
    pub fn indicator(&self) -> &StatusIndicator<O> {
        &self.indicator
    }

    /// Get a mutable reference to the lamps.
    pub fn indicator_mut(&mut self) -> &mut StatusIndicator<O> {
        &mut self.indicator
    }
}

/// State snapshot for display.
///
/// Implements `serde::Serialize` when the `serde` feature is enabled.
///
/// # Example
///
/// ```rust
/// use rs_trainz_ble::{ThrottleController, IndicatorStatus};
/// use rs_trainz_ble::hal::{MockBus, MockLine, MockLink};
///
/// let throttle =
///     ThrottleController::new(MockLink::new(), MockBus::new(), MockLine::new(), MockLine::new())
///         .unwrap();
///
/// let state = throttle.state();
/// assert_eq!(state.speed, 0x80);
/// assert_eq!(state.throttle_percent, 0);
/// assert_eq!(state.indicator, IndicatorStatus::InitBlink);
/// assert!(!state.connected);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ThrottleState {
    /// Motor level (0x80 stopped, 0x00 full speed).
    pub speed: u8,
    /// Speed as 0-100 for gauges.
    pub throttle_percent: u8,
    /// Accelerator notch in effect (0-5).
    pub accel: u8,
    /// Brake notch in effect (0-9).
    pub brake: u8,
    /// Emergency latch set.
    pub emergency: bool,
    /// Door marked open.
    pub door_open: bool,
    /// Status lamp pattern.
    pub indicator: IndicatorStatus,
    /// Link ready.
    pub connected: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drive::{DEPARTURE_LEVEL, STOPPED};
    use crate::hal::{MockBus, MockLine, MockLink};

    type TestThrottle = ThrottleController<MockLink, MockBus, MockLine>;

    fn throttle(link: MockLink, bus: MockBus) -> TestThrottle {
        ThrottleController::new(link, bus, MockLine::new(), MockLine::new()).unwrap()
    }

    #[test]
    fn new_starts_in_init_blink() {
        let t = throttle(MockLink::new(), MockBus::new());
        assert_eq!(t.indicator().status(), IndicatorStatus::InitBlink);
        assert!(!t.indicator().emergency_line().level);
    }

    #[test]
    fn idle_link_starts_connect() {
        let mut t = throttle(MockLink::new(), MockBus::with_levels(3, 0));
        assert_eq!(t.tick().unwrap(), TickOutcome::Connecting);
        assert_eq!(t.link().connect_calls(), 1);
        assert_eq!(t.indicator().status(), IndicatorStatus::ScanningBlink);
        // Bus untouched while not connected
        assert_eq!(t.reader().bus().transfers, 0);
    }

    #[test]
    fn connecting_link_waits() {
        let mut t = throttle(MockLink::new(), MockBus::new());
        t.tick().unwrap();
        for _ in 0..5 {
            assert_eq!(t.tick().unwrap(), TickOutcome::Waiting);
        }
        assert_eq!(t.link().connect_calls(), 1);
    }

    #[test]
    fn connected_link_drives() {
        let mut t = throttle(MockLink::connected(), MockBus::with_levels(1, 0));
        let outcome = t.tick().unwrap();
        assert!(matches!(outcome, TickOutcome::Drove(u) if u.speed == DEPARTURE_LEVEL));
        assert_eq!(t.link().sent(), [DEPARTURE_LEVEL as i32]);
        assert_eq!(t.indicator().status(), IndicatorStatus::SteadyOn);
        assert!(t.indicator().status_line().level);
    }

    #[test]
    fn sends_only_on_change() {
        let mut t = throttle(MockLink::connected(), MockBus::with_levels(1, 0));
        for _ in 0..11 {
            t.tick().unwrap();
        }
        // Departure, then one step ten ticks later at notch 1
        assert_eq!(t.link().sent(), [0x70, 0x6f]);
    }

    #[test]
    fn state_snapshot() {
        let mut t = throttle(MockLink::connected(), MockBus::with_levels(0, 4));
        t.set_door_open(true);
        t.tick().unwrap();
        let state = t.state();
        assert_eq!(state.speed, STOPPED);
        assert_eq!(state.brake, 4);
        assert_eq!(state.accel, 0);
        assert!(state.door_open);
        assert!(state.connected);
    }

    #[test]
    fn lamp_error_propagates() {
        let mut t = throttle(MockLink::connected(), MockBus::new());
        t.tick().unwrap();
        t.indicator.status_line_mut().fail = true;
        assert!(t.tick().is_err());
    }

    #[test]
    fn stop_sent_even_when_emergency_lamp_fails() {
        let mut t = throttle(MockLink::connected(), MockBus::with_levels(1, 0));
        t.tick().unwrap();
        t.reader.bus_mut().set_levels(0, 9);
        t.indicator.emergency_line_mut().fail = true;

        assert!(t.tick().is_err());
        assert_eq!(t.link().last_sent(), Some(0x80));
    }

    #[test]
    fn lamps_off() {
        let mut t = throttle(MockLink::connected(), MockBus::with_levels(0, 9));
        t.tick().unwrap();
        assert!(t.indicator().emergency_line().level);
        t.lamps_off().unwrap();
        assert!(!t.indicator().emergency_line().level);
        assert!(!t.indicator().status_line().level);
    }
}
