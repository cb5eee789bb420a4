//! The control loop's view of the motor link.

/// Motor-speed wire value meaning "stopped".
pub const STOP_LEVEL: u8 = 0x80;

/// Link to the train's motor controller as seen from the control loop.
///
/// Every method is non-blocking: the control loop polls connection state
/// once per tick and never waits on the radio.
///
/// Implemented by [`LinkManager`](crate::link::LinkManager) and by
/// [`MockLink`](crate::hal::MockLink) for tests.
pub trait MotorLink {
    /// True once the motor and battery characteristics are available.
    fn is_connected(&self) -> bool;

    /// True while scanning or discovering.
    fn is_connecting(&self) -> bool;

    /// Start scanning if idle; no-op otherwise.
    fn connect(&self);

    /// Send a motor level, clamped to `0..=STOP_LEVEL`.
    ///
    /// Best-effort: failures are not reported and dropped silently when
    /// the link is not ready.
    fn set_motor_speed(&self, level: i32);
}

impl<L: MotorLink + ?Sized> MotorLink for &L {
    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn is_connecting(&self) -> bool {
        (**self).is_connecting()
    }

    fn connect(&self) {
        (**self).connect()
    }

    fn set_motor_speed(&self, level: i32) {
        (**self).set_motor_speed(level)
    }
}
