//! Configuration for the link, controller bus, lamps and control loop.
//!
//! Uses `heapless::String` for `no_std` compatibility while remaining
//! ergonomic to use on desktop with `std`.
//!
//! # Example
//!
//! ```rust
//! use rs_trainz_ble::config::{BusConfig, Config, LinkConfig};
//!
//! // Use defaults
//! let config = Config::default();
//!
//! // Or customize
//! let config = Config::default()
//!     .with_bus(BusConfig::default().with_device_path("/dev/spidev1.0"))
//!     .with_link(LinkConfig::default().with_battery_poll_ms(1000));
//! ```

use heapless::String as HString;

/// Maximum length for config strings (device paths)
pub const MAX_SHORT_STRING: usize = 64;

/// Type alias for short config strings
pub type ShortString = HString<MAX_SHORT_STRING>;

/// Motor unit service UUID (`389CAAF0-843F-4D3B-959D-C954CCE14655`).
pub const BCORE_SERVICE_UUID: u128 = 0x389caaf0_843f_4d3b_959d_c954cce14655;

/// Battery voltage characteristic UUID (`389CAAF1-...`).
pub const BCORE_BATTERY_UUID: u128 = 0x389caaf1_843f_4d3b_959d_c954cce14655;

/// Motor speed characteristic UUID (`389CAAF2-...`).
pub const BCORE_MOTOR_UUID: u128 = 0x389caaf2_843f_4d3b_959d_c954cce14655;

// ============================================================================
// Helper for creating heapless strings
// ============================================================================

/// Create a ShortString from a &str, truncating if too long
pub fn short_string(s: &str) -> ShortString {
    let mut hs = ShortString::new();
    let take = s.len().min(MAX_SHORT_STRING);
    // Find valid UTF-8 boundary
    let valid_end = s
        .char_indices()
        .take_while(|(i, c)| i + c.len_utf8() <= take)
        .last()
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);
    let _ = hs.push_str(&s[..valid_end]);
    hs
}

// ============================================================================
// Main Config
// ============================================================================

/// Complete application configuration
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    /// Wireless link configuration
    pub link: LinkConfig,
    /// Hand controller bus configuration
    pub bus: BusConfig,
    /// Lamp and door line configuration
    pub indicator: IndicatorConfig,
    /// Control loop configuration
    pub control: ControlConfig,
}

impl Config {
    /// Set link configuration
    pub fn with_link(mut self, link: LinkConfig) -> Self {
        self.link = link;
        self
    }

    /// Set bus configuration
    pub fn with_bus(mut self, bus: BusConfig) -> Self {
        self.bus = bus;
        self
    }

    /// Set indicator configuration
    pub fn with_indicator(mut self, indicator: IndicatorConfig) -> Self {
        self.indicator = indicator;
        self
    }

    /// Set control loop configuration
    pub fn with_control(mut self, control: ControlConfig) -> Self {
        self.control = control;
        self
    }
}

// ============================================================================
// Link Config
// ============================================================================

/// Wireless link configuration
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LinkConfig {
    /// Service UUID advertised by the motor unit
    pub service_uuid: u128,
    /// Battery characteristic UUID (read, 2-byte little-endian)
    pub battery_uuid: u128,
    /// Motor characteristic UUID (write without response)
    pub motor_uuid: u128,
    /// Battery refresh period in milliseconds
    pub battery_poll_ms: u32,
    /// Wait between readiness checks in `initialize()`
    pub init_poll_ms: u32,
    /// Number of readiness checks before `initialize()` gives up
    pub init_attempts: u32,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            service_uuid: BCORE_SERVICE_UUID,
            battery_uuid: BCORE_BATTERY_UUID,
            motor_uuid: BCORE_MOTOR_UUID,
            battery_poll_ms: 500,
            init_poll_ms: 100,
            init_attempts: 300,
        }
    }
}

impl LinkConfig {
    /// Set the service and characteristic UUIDs
    pub fn with_uuids(mut self, service: u128, battery: u128, motor: u128) -> Self {
        self.service_uuid = service;
        self.battery_uuid = battery;
        self.motor_uuid = motor;
        self
    }

    /// Set the battery refresh period
    pub fn with_battery_poll_ms(mut self, ms: u32) -> Self {
        self.battery_poll_ms = ms.max(1);
        self
    }

    /// Set the `initialize()` wait budget
    pub fn with_init_budget(mut self, poll_ms: u32, attempts: u32) -> Self {
        self.init_poll_ms = poll_ms;
        self.init_attempts = attempts;
        self
    }

    /// Total time `initialize()` waits, in milliseconds
    pub fn init_timeout_ms(&self) -> u64 {
        self.init_poll_ms as u64 * self.init_attempts as u64
    }
}

// ============================================================================
// Bus Config
// ============================================================================

/// Hand controller bus configuration
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BusConfig {
    /// SPI device node
    pub device_path: ShortString,
    /// Bus clock in Hz
    pub clock_hz: u32,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            device_path: short_string("/dev/spidev0.0"),
            clock_hz: 100_000,
        }
    }
}

impl BusConfig {
    /// Set the SPI device node
    pub fn with_device_path(mut self, path: &str) -> Self {
        self.device_path = short_string(path);
        self
    }

    /// Set the bus clock
    pub fn with_clock_hz(mut self, hz: u32) -> Self {
        self.clock_hz = hz;
        self
    }
}

// ============================================================================
// Indicator Config
// ============================================================================

/// Lamp and door line configuration
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IndicatorConfig {
    /// GPIO character device
    pub gpio_chip: ShortString,
    /// Status lamp line offset
    pub status_line: u32,
    /// Emergency lamp line offset
    pub emergency_line: u32,
    /// Door sensor line offset (None = no sensor, door always closed)
    pub door_line: Option<u32>,
    /// Whether the door sensor reads high when the door is open
    pub door_active_high: bool,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            gpio_chip: short_string("/dev/gpiochip0"),
            status_line: 2,
            emergency_line: 4,
            door_line: None,
            door_active_high: true,
        }
    }
}

impl IndicatorConfig {
    /// Set the GPIO character device
    pub fn with_gpio_chip(mut self, chip: &str) -> Self {
        self.gpio_chip = short_string(chip);
        self
    }

    /// Set the lamp line offsets
    pub fn with_lines(mut self, status: u32, emergency: u32) -> Self {
        self.status_line = status;
        self.emergency_line = emergency;
        self
    }

    /// Enable the door sensor on a line
    pub fn with_door_line(mut self, line: u32, active_high: bool) -> Self {
        self.door_line = Some(line);
        self.door_active_high = active_high;
        self
    }

    /// Check if a door sensor is configured
    pub fn has_door_sensor(&self) -> bool {
        self.door_line.is_some()
    }
}

// ============================================================================
// Control Config
// ============================================================================

/// Control loop configuration
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ControlConfig {
    /// Control loop period in milliseconds
    pub tick_ms: u32,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self { tick_ms: 25 }
    }
}

impl ControlConfig {
    /// Set the control loop period
    pub fn with_tick_ms(mut self, ms: u32) -> Self {
        self.tick_ms = ms.max(1);
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
