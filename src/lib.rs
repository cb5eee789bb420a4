//! # rs-trainz-ble
//!
//! A model train throttle that reads a physical hand controller and drives a
//! train's BLE motor unit, with status and emergency lamps.
//!
//! ## Features
//!
//! - **Hand controller decode**: Accelerator (0-5) and brake (0-9) notches from a
//!   5-byte bus frame, with lever priority and a sticky emergency latch
//! - **Ramped drive**: Tick-based acceleration and braking with clamping and a
//!   door interlock
//! - **BLE link management**: Scan, discovery with rollback, reconnection and
//!   battery telemetry for one motor unit
//! - **Lamps**: Blink-pattern status lamp plus an independent emergency lamp
//!
//! ## Architecture
//!
//! The crate is structured to allow testing on desktop without hardware:
//!
//! - `traits` - Hardware and radio abstractions
//! - `reader` - Controller bus decode and lever state machine
//! - `drive` - Ramp, clamp and interlock arithmetic
//! - `indicator` - Status lamp state machine
//! - `link` - BLE link manager (requires `std`)
//! - `throttle` - Control loop that ties everything together
//! - `hal` - Concrete implementations (mock for testing, linux for hardware)
//!
//! ## Example
//!
//! ```rust
//! use rs_trainz_ble::{ThrottleController, hal::{MockBus, MockLine, MockLink}};
//!
//! // Connected link, accelerator at notch 5
//! let link = MockLink::connected();
//! let bus = MockBus::with_levels(5, 0);
//! let mut controller = ThrottleController::new(link, bus, MockLine::new(), MockLine::new()).unwrap();
//!
//! // Call tick() every control period (e.g. 25ms)
//! for _ in 0..21 {
//!     controller.tick().unwrap();
//! }
//!
//! // Departed at 0x70, then one step every 2 ticks
//! assert_eq!(controller.current_speed(), 0x70 - 10);
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]

extern crate alloc;

/// Shared configuration for the link, bus, lamps and control loop.
pub mod config;
/// Ramp, clamp and door interlock arithmetic.
pub mod drive;
/// Hardware abstraction layer with mock implementations for testing.
pub mod hal;
/// Status and emergency lamp state machine.
pub mod indicator;
/// Hand controller bus decode and lever state machine.
pub mod reader;
/// Main throttle controller that coordinates the reader, drive, link and lamps.
pub mod throttle;
/// Core traits for hardware and radio abstraction.
pub mod traits;

/// Discovery and hardware error types.
#[cfg(feature = "std")]
pub mod error;
/// BLE link manager for one motor unit.
#[cfg(feature = "std")]
pub mod link;

// Re-exports for convenience
pub use drive::{DriveState, DriveUpdate};
pub use indicator::{IndicatorStatus, StatusIndicator};
pub use reader::{BusReader, ControllerReading, LeverState};
pub use throttle::{ThrottleController, ThrottleState, TickOutcome};
pub use traits::{
    // Hardware
    ControllerBus,
    DoorSensor,
    IndicatorLine,
    // Link
    MotorLink,
    FRAME_LEN,
    STOP_LEVEL,
};

#[cfg(feature = "std")]
pub use error::{DiscoveryError, HardwareError};
#[cfg(feature = "std")]
pub use link::{LinkManager, LinkPhase};
#[cfg(feature = "std")]
pub use traits::{GattHandle, Radio, RadioEvent};

// Config re-exports
pub use config::{BusConfig, Config, ControlConfig, IndicatorConfig, LinkConfig};
