//! Lamps and door sensor on GPIO character device lines.

use embedded_hal::digital::{InputPin, OutputPin, PinState};
use linux_embedded_hal::gpio_cdev::{Chip, LineRequestFlags};
use linux_embedded_hal::CdevPin;

use crate::error::HardwareError;
use crate::traits::{DoorSensor, IndicatorLine};

const CONSUMER: &str = "rs-trainz-ble";

/// Lamp on any `embedded-hal` output pin.
pub struct GpioLine<P: OutputPin> {
    pin: P,
}

impl<P: OutputPin> GpioLine<P> {
    /// Wrap an output pin.
    pub fn new(pin: P) -> Self {
        Self { pin }
    }
}

impl<P: OutputPin> IndicatorLine for GpioLine<P> {
    type Error = P::Error;

    fn set_level(&mut self, high: bool) -> Result<(), P::Error> {
        self.pin.set_state(PinState::from(high))
    }
}

/// Door sensor on any `embedded-hal` input pin.
///
/// A failed read keeps the last known state.
pub struct GpioDoor<P: InputPin> {
    pin: P,
    active_high: bool,
    open: bool,
}

impl<P: InputPin> GpioDoor<P> {
    /// Wrap an input pin. `active_high` means a high level is "door open".
    pub fn new(pin: P, active_high: bool) -> Self {
        Self {
            pin,
            active_high,
            open: false,
        }
    }
}

impl<P: InputPin> DoorSensor for GpioDoor<P> {
    fn is_open(&mut self) -> bool {
        match self.pin.is_high() {
            Ok(high) => self.open = high == self.active_high,
            Err(e) => log::debug!("door sensor read failed: {:?}", e),
        }
        self.open
    }
}

/// Request an output line driven low.
pub fn open_lamp(chip: &str, line: u32) -> Result<GpioLine<CdevPin>, HardwareError> {
    request_line(chip, line, LineRequestFlags::OUTPUT).map(GpioLine::new)
}

/// Request an input line for the door sensor.
pub fn open_door_sensor(
    chip: &str,
    line: u32,
    active_high: bool,
) -> Result<GpioDoor<CdevPin>, HardwareError> {
    request_line(chip, line, LineRequestFlags::INPUT).map(|pin| GpioDoor::new(pin, active_high))
}

fn request_line(
    chip_path: &str,
    line: u32,
    flags: LineRequestFlags,
) -> Result<CdevPin, HardwareError> {
    let unavailable = |message: String| HardwareError::LineUnavailable {
        chip: chip_path.into(),
        line,
        message,
    };

    let mut chip = Chip::new(chip_path).map_err(|e| unavailable(e.to_string()))?;
    let handle = chip
        .get_line(line)
        .and_then(|l| l.request(flags, 0, CONSUMER))
        .map_err(|e| unavailable(e.to_string()))?;
    CdevPin::new(handle).map_err(|e| unavailable(e.to_string()))
}
