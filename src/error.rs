//! Error types using thiserror 2.0
//!
//! Two families: [`DiscoveryError`] says why a scan hit was rejected (always
//! logged and rolled back, never surfaced to the control loop), and
//! [`HardwareError`] is fatal at startup.

use alloc::string::String;
use thiserror::Error;

/// Stage at which a scan hit failed to become a ready link.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    /// The radio could not resolve the advertised address.
    #[error("peripheral resolution failed: {0}")]
    Resolve(String),

    /// The address resolved to nothing.
    #[error("advertised address no longer maps to a peripheral")]
    PeripheralNotFound,

    /// Service discovery returned an error.
    #[error("service query failed: {0}")]
    ServiceQuery(String),

    /// The motor unit service is not offered.
    #[error("service {0:032x} not offered")]
    ServiceNotFound(u128),

    /// Characteristic discovery returned an error.
    #[error("characteristic query failed: {0}")]
    CharacteristicQuery(String),

    /// The battery or motor characteristic is absent.
    #[error("characteristic {0:032x} missing")]
    CharacteristicMissing(u128),
}

/// Missing or broken hardware at startup.
#[derive(Error, Debug)]
pub enum HardwareError {
    /// No Bluetooth adapter present.
    #[error("no BLE adapter available")]
    RadioUnavailable,

    /// The adapter exists but could not be brought up.
    #[error("radio initialisation failed: {0}")]
    Radio(String),

    /// The spidev node could not be opened or configured.
    #[error("controller bus {path} unavailable")]
    BusUnavailable {
        /// Device node path.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A lamp or door line could not be requested.
    #[error("GPIO line {chip}:{line} unavailable: {message}")]
    LineUnavailable {
        /// GPIO chip path.
        chip: String,
        /// Line offset on the chip.
        line: u32,
        /// Error reported by the GPIO driver.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BCORE_MOTOR_UUID;

    #[test]
    fn discovery_error_display() {
        assert_eq!(
            DiscoveryError::CharacteristicMissing(BCORE_MOTOR_UUID).to_string(),
            "characteristic 389caaf2843f4d3b959dc954cce14655 missing"
        );
        assert_eq!(
            DiscoveryError::ServiceQuery("timeout".into()).to_string(),
            "service query failed: timeout"
        );
    }

    #[test]
    fn hardware_error_keeps_source() {
        use std::error::Error as _;

        let err = HardwareError::BusUnavailable {
            path: "/dev/spidev0.0".into(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert_eq!(err.to_string(), "controller bus /dev/spidev0.0 unavailable");
        assert!(err.source().is_some());
    }

    #[test]
    fn line_unavailable_names_line() {
        let err = HardwareError::LineUnavailable {
            chip: "/dev/gpiochip0".into(),
            line: 4,
            message: "busy".into(),
        };
        assert_eq!(
            err.to_string(),
            "GPIO line /dev/gpiochip0:4 unavailable: busy"
        );
    }
}
