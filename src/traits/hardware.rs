//! Hardware abstraction traits for the hand controller bus, lamps and door input.
//!
//! This module defines the hardware interfaces the throttle core talks to,
//! so the same logic runs against a Linux single-board computer or the
//! desktop mocks.
//!
//! # Key Traits
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`ControllerBus`] | Half-duplex query/response transfer to the hand controller |
//! | [`IndicatorLine`] | One digital output driving a lamp |
//! | [`DoorSensor`] | Door-open input consumed by the interlock |
//!
//! # Implementation
//!
//! For testing and desktop development, use the mock implementations
//! from [`crate::hal::mock`]. For Linux hardware, use the adapters from
//! `hal::linux` (requires `linux` feature).
//!
//! # Example
//!
//! ```rust
//! use rs_trainz_ble::traits::{ControllerBus, IndicatorLine};
//! use rs_trainz_ble::hal::{MockBus, MockLine};
//! use rs_trainz_ble::reader::{frame_for_levels, READ_COMMAND};
//!
//! let mut bus = MockBus::with_frame(frame_for_levels(2, 0));
//! let mut response = [0u8; 5];
//! bus.transfer(&READ_COMMAND, &mut response).unwrap();
//! assert_eq!(response, frame_for_levels(2, 0));
//!
//! let mut lamp = MockLine::new();
//! lamp.set_level(true).unwrap();
//! assert!(lamp.level);
//! ```

/// Length of one controller bus frame, query and response alike.
pub const FRAME_LEN: usize = 5;

/// Hand-controller bus trait - one fixed-size full transfer per poll.
///
/// The controller speaks a half-duplex protocol clocked over a synchronous
/// serial bus: the host shifts out a query frame while the controller
/// shifts back its response frame of the same length.
///
/// # Implementation Notes
///
/// - `transfer` must not retry; the reader treats a failure as "no new data"
/// - The response buffer content is unspecified when an error is returned
///
/// # Example Implementation
///
/// ```rust,ignore
/// use rs_trainz_ble::traits::{ControllerBus, FRAME_LEN};
///
/// struct MyBus { /* spi handle */ }
///
/// impl ControllerBus for MyBus {
///     type Error = ();
///
///     fn transfer(&mut self, query: &[u8; FRAME_LEN], response: &mut [u8; FRAME_LEN]) -> Result<(), ()> {
///         // Clock `query` out while reading into `response`...
///         Ok(())
///     }
/// }
/// ```
pub trait ControllerBus {
    /// Error type for bus transfers.
    type Error: core::fmt::Debug;

    /// Shift `query` out and read the controller's reply into `response`.
    fn transfer(
        &mut self,
        query: &[u8; FRAME_LEN],
        response: &mut [u8; FRAME_LEN],
    ) -> Result<(), Self::Error>;
}

/// A single digital output line (status lamp, emergency lamp).
pub trait IndicatorLine {
    /// Error type for output writes.
    type Error: core::fmt::Debug;

    /// Drive the line high (`true`) or low (`false`).
    fn set_level(&mut self, high: bool) -> Result<(), Self::Error>;
}

/// Door-open input for the departure interlock.
///
/// The door signal is owned by an external collaborator; the throttle
/// only reads it once per tick.
pub trait DoorSensor {
    /// Returns true while the monitored door is open.
    fn is_open(&mut self) -> bool;
}
