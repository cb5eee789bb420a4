//! Linux single-board computer train throttle.
//!
//! This is the main entry point for the physical hardware controller.
//! It runs a 40Hz control loop that:
//! - Polls the hand controller over spidev
//! - Ramps the motor level and sends it to the bCore unit over BLE
//! - Blinks the status lamp and drives the emergency lamp
//! - Reads the optional door sensor for the departure interlock
//!
//! Any missing hardware (bus device, GPIO line, BLE adapter) aborts startup.
//!
//! # Configuration
//!
//! Defaults come from [`Config::default`]; these environment variables
//! override them:
//!
//! | Variable | Meaning |
//! |----------|---------|
//! | `TRAINZ_SPI_DEVICE` | spidev node |
//! | `TRAINZ_SPI_HZ` | bus clock |
//! | `TRAINZ_GPIO_CHIP` | GPIO character device |
//! | `TRAINZ_STATUS_LINE` / `TRAINZ_EMERGENCY_LINE` | lamp line offsets |
//! | `TRAINZ_DOOR_LINE` | door sensor line (unset = no sensor) |
//! | `TRAINZ_DOOR_ACTIVE_LOW` | door reads low when open |
//! | `TRAINZ_TICK_MS` | control period |
//! | `TRAINZ_BATTERY_POLL_MS` | battery refresh period |
//! | `TRAINZ_WAIT_READY` | wait for the train before driving |
//!
//! Logging follows `RUST_LOG` (default `info`).
//!
//! # Build
//!
//! ```bash
//! cargo build --release --features linux --bin throttle_main
//! ```

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use linux_embedded_hal::{CdevPin, SpidevDevice};
use rs_trainz_ble::hal::linux::{
    open_controller_bus, open_door_sensor, open_lamp, BluestRadio, GpioDoor, GpioLine,
    SpiControllerBus,
};
use rs_trainz_ble::traits::DoorSensor;
use rs_trainz_ble::{
    BusConfig, Config, ControlConfig, IndicatorConfig, LinkConfig, LinkManager, ThrottleController,
};
use tokio::time::MissedTickBehavior;

/// Battery log interval
const BATTERY_REPORT: Duration = Duration::from_secs(30);

type Throttle<'a> = ThrottleController<
    &'a LinkManager<BluestRadio>,
    SpiControllerBus<SpidevDevice>,
    GpioLine<CdevPin>,
>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("rs-trainz-ble throttle starting");

    // =========================================================================
    // Configuration
    // =========================================================================
    let config = load_config()?;
    let wait_ready = env_var::<bool>("TRAINZ_WAIT_READY")?.unwrap_or(false);

    // =========================================================================
    // Hardware (fail fast)
    // =========================================================================
    let bus = open_controller_bus(&config.bus)?;

    let chip = config.indicator.gpio_chip.as_str();
    let status = open_lamp(chip, config.indicator.status_line)?;
    let emergency = open_lamp(chip, config.indicator.emergency_line)?;
    log::info!(
        "lamps on {} lines {}/{}",
        chip,
        config.indicator.status_line,
        config.indicator.emergency_line
    );

    let mut door = match config.indicator.door_line {
        Some(line) => {
            log::info!("door sensor on {} line {}", chip, line);
            Some(open_door_sensor(
                chip,
                line,
                config.indicator.door_active_high,
            )?)
        }
        None => None,
    };

    let radio = BluestRadio::new().await?;
    let link = LinkManager::start(radio, config.link.clone()).await?;

    let mut throttle =
        ThrottleController::new(&link, bus, status, emergency).map_err(lamp_error)?;

    // =========================================================================
    // Control loop
    // =========================================================================
    let result = run(&mut throttle, door.as_mut(), &link, &config, wait_ready).await;

    link.dispose().await;
    if let Err(e) = throttle.lamps_off() {
        log::warn!("lamps off failed: {:?}", e);
    }
    log::info!("stopped");
    result
}

async fn run(
    throttle: &mut Throttle<'_>,
    mut door: Option<&mut GpioDoor<CdevPin>>,
    link: &LinkManager<BluestRadio>,
    config: &Config,
    wait_ready: bool,
) -> anyhow::Result<()> {
    let mut ticker = tokio::time::interval(Duration::from_millis(config.control.tick_ms as u64));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    if wait_ready {
        log::info!(
            "waiting up to {} ms for the motor unit",
            config.link.init_timeout_ms()
        );
        let ready = link.initialize();
        tokio::pin!(ready);
        let connected = loop {
            tokio::select! {
                connected = &mut ready => break connected,
                _ = &mut shutdown => return Ok(()),
                _ = ticker.tick() => throttle.tick_indicator().map_err(lamp_error)?,
            }
        };
        if !connected {
            log::warn!("motor unit not found, continuing to scan from the control loop");
        }
    }

    let mut connection = link.subscribe_connection();
    let mut report = tokio::time::interval(BATTERY_REPORT);
    log::info!("control loop at {} ms", config.control.tick_ms);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                log::info!("shutting down");
                return Ok(());
            }
            _ = ticker.tick() => {
                if let Some(door) = door.as_deref_mut() {
                    throttle.set_door_open(door.is_open());
                }
                throttle.tick().map_err(lamp_error)?;
            }
            Ok(()) = connection.changed() => {
                if *connection.borrow_and_update() {
                    log::info!("train connected");
                } else {
                    log::warn!("train disconnected");
                }
            }
            _ = report.tick() => {
                if let Some(mv) = link.battery_voltage() {
                    log::info!("battery {} mV, speed {}%", mv, throttle.state().throttle_percent);
                }
            }
        }
    }
}

fn lamp_error<E: core::fmt::Debug>(e: E) -> anyhow::Error {
    anyhow::anyhow!("lamp write failed: {:?}", e)
}

fn load_config() -> anyhow::Result<Config> {
    let mut bus = BusConfig::default();
    if let Some(path) = env_var::<String>("TRAINZ_SPI_DEVICE")? {
        bus = bus.with_device_path(&path);
    }
    if let Some(hz) = env_var("TRAINZ_SPI_HZ")? {
        bus = bus.with_clock_hz(hz);
    }

    let mut indicator = IndicatorConfig::default();
    if let Some(chip) = env_var::<String>("TRAINZ_GPIO_CHIP")? {
        indicator = indicator.with_gpio_chip(&chip);
    }
    let status = env_var("TRAINZ_STATUS_LINE")?.unwrap_or(indicator.status_line);
    let emergency = env_var("TRAINZ_EMERGENCY_LINE")?.unwrap_or(indicator.emergency_line);
    indicator = indicator.with_lines(status, emergency);
    if let Some(line) = env_var("TRAINZ_DOOR_LINE")? {
        let active_low = env_var::<bool>("TRAINZ_DOOR_ACTIVE_LOW")?.unwrap_or(false);
        indicator = indicator.with_door_line(line, !active_low);
    }

    let mut control = ControlConfig::default();
    if let Some(ms) = env_var("TRAINZ_TICK_MS")? {
        control = control.with_tick_ms(ms);
    }

    let mut link = LinkConfig::default();
    if let Some(ms) = env_var("TRAINZ_BATTERY_POLL_MS")? {
        link = link.with_battery_poll_ms(ms);
    }

    Ok(Config::default()
        .with_bus(bus)
        .with_indicator(indicator)
        .with_control(control)
        .with_link(link))
}

fn env_var<T>(key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{}={:?}: {}", key, raw, e)),
        Err(_) => Ok(None),
    }
}
