//! Hand controller bus over Linux spidev.
//!
//! The controller clocks its reply back while the query is shifted out, so
//! one full-duplex transfer of five bytes is one poll.

use embedded_hal::spi::SpiDevice;
use linux_embedded_hal::spidev::{SpiModeFlags, Spidev, SpidevOptions};
use linux_embedded_hal::SpidevDevice;

use crate::config::BusConfig;
use crate::error::HardwareError;
use crate::traits::{ControllerBus, FRAME_LEN};

/// SPI mode used by the hand controller (CPOL=1, CPHA=1).
pub const SPI_MODE: SpiModeFlags = SpiModeFlags::SPI_MODE_3;

/// Hand controller bus on any `embedded-hal` SPI device.
///
/// # Example
///
/// ```ignore
/// use rs_trainz_ble::config::BusConfig;
/// use rs_trainz_ble::hal::linux::open_controller_bus;
///
/// let bus = open_controller_bus(&BusConfig::default())?;
/// ```
pub struct SpiControllerBus<S: SpiDevice> {
    spi: S,
}

impl<S: SpiDevice> SpiControllerBus<S> {
    /// Wrap an SPI device.
    pub fn new(spi: S) -> Self {
        Self { spi }
    }

    /// Release the SPI device.
    pub fn into_inner(self) -> S {
        self.spi
    }
}

impl<S: SpiDevice> ControllerBus for SpiControllerBus<S> {
    type Error = S::Error;

    fn transfer(
        &mut self,
        query: &[u8; FRAME_LEN],
        response: &mut [u8; FRAME_LEN],
    ) -> Result<(), S::Error> {
        self.spi.transfer(response, query)
    }
}

/// Open and configure the spidev node named in `config`.
pub fn open_controller_bus(
    config: &BusConfig,
) -> Result<SpiControllerBus<SpidevDevice>, HardwareError> {
    let path = config.device_path.as_str();
    let unavailable = |source| HardwareError::BusUnavailable {
        path: path.into(),
        source,
    };

    let mut spi = Spidev::open(path).map_err(unavailable)?;
    let options = SpidevOptions::new()
        .bits_per_word(8)
        .max_speed_hz(config.clock_hz)
        .mode(SPI_MODE)
        .build();
    spi.configure(&options).map_err(unavailable)?;

    log::info!("controller bus on {} at {} Hz", path, config.clock_hz);
    Ok(SpiControllerBus::new(SpidevDevice(spi)))
}
