//! Trait definitions for hardware abstraction and the wireless link.
//!
//! This module defines the core abstractions that allow rs-trainz-ble to:
//! - Run on different hardware (Linux single-board computer, desktop mock)
//! - Drive different BLE central stacks
//! - Test the control loop without a radio
//!
//! # Submodules
//!
//! - `hardware`: Controller bus, indicator lines, door sensor
//! - `link`: Motor link as seen by the control loop
//! - `radio`: BLE central capability used by the link manager (requires `std`)
//!
//! # Hardware Abstraction
//!
//! The key hardware traits are:
//!
//! - [`ControllerBus`]: 5-byte half-duplex transfer to the hand controller
//! - [`IndicatorLine`]: Digital output for the status and emergency lamps
//! - [`DoorSensor`]: Door-open input for the departure interlock
//!
//! # Link Abstraction
//!
//! - [`MotorLink`]: Connection queries and best-effort motor commands
//! - `Radio`: Scan, discover, read and write on one peripheral

pub mod hardware;
pub mod link;
#[cfg(feature = "std")]
pub mod radio;

pub use hardware::*;
pub use link::*;
#[cfg(feature = "std")]
pub use radio::*;
