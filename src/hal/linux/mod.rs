//! Linux single-board computer hardware abstraction layer.
//!
//! This module provides hardware implementations for a Raspberry Pi class
//! board wired to a PlayStation-style hand controller and two lamps, talking
//! to a bCore motor unit over BlueZ.
//!
//! # Hardware Configuration
//!
//! - **Controller bus**: spidev, SPI mode 3 at 100 kHz
//! - **Lamps**: two GPIO character device output lines
//! - **Door sensor**: optional GPIO input line
//! - **Radio**: first BlueZ adapter via `bluest`
//!
//! Default device paths and line offsets live in [`crate::config`].

mod ble;
mod gpio;
mod spi;

pub use ble::{BluestRadio, RadioError};
pub use gpio::{open_door_sensor, open_lamp, GpioDoor, GpioLine};
pub use spi::{open_controller_bus, SpiControllerBus, SPI_MODE};
