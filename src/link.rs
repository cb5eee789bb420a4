//! BLE link manager for one motor unit.
//!
//! [`LinkManager`] owns the scan → resolve → discover → ready lifecycle for a
//! single peripheral and exposes the [`MotorLink`] view the control loop
//! polls once per tick.
//!
//! # Lifecycle
//!
//! ```text
//! Idle ──connect()──▶ Scanning ──scan hit──▶ Resolving ──▶ DiscoveringService
//!                        ▲                                        │
//!                        │ any failure: release + rescan          ▼
//!                        ├───────────────────────── DiscoveringCharacteristics
//!                        │                                        │
//!                        └──────── link dropped ◀──── Ready ◀─────┘
//! ```
//!
//! # Concurrency
//!
//! Radio events arrive on their own task. A one-permit semaphore serialises
//! every state transition: `connect()`, `dispose()`, `initialize()`'s final
//! stop, and the scan-hit and disconnect handlers. The permit is held across
//! the whole discovery sequence, including radio awaits.
//!
//! Connection queries (`is_connected`, `is_connecting`) and
//! `set_motor_speed` never wait on the permit; they read the phase under a
//! short synchronous lock.
//!
//! Once ready, two per-session tasks run:
//!
//! - a motor writer fed by a watch channel, so only the newest level is
//!   sent when the radio is slow
//! - a battery poll on a fixed interval
//!
//! Both end when the session is released.
//!
//! # Example
//!
//! ```rust
//! use rs_trainz_ble::config::LinkConfig;
//! use rs_trainz_ble::hal::MockRadio;
//! use rs_trainz_ble::link::LinkManager;
//! use rs_trainz_ble::traits::MotorLink;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let radio = MockRadio::new();
//! let link = LinkManager::start(radio.clone(), LinkConfig::default()).await.unwrap();
//!
//! link.connect();
//! tokio::task::yield_now().await;
//! assert!(link.is_connecting());
//! # }
//! ```

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::LinkConfig;
use crate::error::DiscoveryError;
use crate::traits::{find_by_uuid, MotorLink, Radio, RadioEvent, RadioEvents, STOP_LEVEL};

/// Sentinel for "no battery reading yet".
const NO_BATTERY: u32 = u32::MAX;

/// Motor characteristic payload for a level.
pub const fn motor_command(level: u8) -> [u8; 2] {
    [0x00, level]
}

/// Decode a battery characteristic value (little-endian millivolts).
///
/// Returns `None` for responses shorter than two bytes; extra bytes are
/// ignored.
pub fn decode_battery(data: &[u8]) -> Option<u16> {
    match data {
        [lo, hi, ..] => Some(u16::from_le_bytes([*lo, *hi])),
        _ => None,
    }
}

/// Where the link manager is in its lifecycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum LinkPhase {
    /// Not scanning, no peripheral.
    #[default]
    Idle,
    /// Waiting for an advertisement.
    Scanning,
    /// Resolving the advertised address to a peripheral.
    Resolving,
    /// Querying services.
    DiscoveringService,
    /// Querying characteristics.
    DiscoveringCharacteristics,
    /// Motor and battery characteristics available.
    Ready,
}

impl LinkPhase {
    /// True while scanning or discovering.
    pub const fn is_connecting(&self) -> bool {
        matches!(
            self,
            LinkPhase::Scanning
                | LinkPhase::Resolving
                | LinkPhase::DiscoveringService
                | LinkPhase::DiscoveringCharacteristics
        )
    }

    /// True when ready.
    pub const fn is_ready(&self) -> bool {
        matches!(self, LinkPhase::Ready)
    }
}

/// Handles acquired by a successful discovery.
struct Discovered<R: Radio> {
    peripheral: R::Peripheral,
    battery: R::Characteristic,
    motor: R::Characteristic,
}

/// A ready peripheral and its tasks.
struct Session<R: Radio> {
    address: R::Address,
    peripheral: R::Peripheral,
    motor_tx: watch::Sender<Option<u8>>,
    writer: JoinHandle<()>,
    battery_poll: JoinHandle<()>,
}

impl<R: Radio> Drop for Session<R> {
    fn drop(&mut self) {
        self.writer.abort();
        self.battery_poll.abort();
    }
}

struct LinkState<R: Radio> {
    phase: LinkPhase,
    session: Option<Session<R>>,
}

struct Shared<R: Radio> {
    radio: R,
    config: LinkConfig,
    /// Serialises state transitions.
    guard: Arc<Semaphore>,
    state: Mutex<LinkState<R>>,
    battery_mv: AtomicU32,
    connection: watch::Sender<bool>,
}

/// Connection manager for one BLE motor unit.
///
/// Must be created and used inside a tokio runtime.
pub struct LinkManager<R: Radio> {
    shared: Arc<Shared<R>>,
    event_task: JoinHandle<()>,
}

impl<R: Radio> LinkManager<R> {
    /// Take the radio's event stream and start handling events. Does not
    /// start scanning; call [`MotorLink::connect`] or [`initialize`](Self::initialize).
    pub async fn start(radio: R, config: LinkConfig) -> Result<Self, R::Error> {
        let events = radio.events().await?;
        let (connection, _) = watch::channel(false);
        let shared = Arc::new(Shared {
            radio,
            config,
            guard: Arc::new(Semaphore::new(1)),
            state: Mutex::new(LinkState {
                phase: LinkPhase::Idle,
                session: None,
            }),
            battery_mv: AtomicU32::new(NO_BATTERY),
            connection,
        });
        let event_task = tokio::spawn(pump_events(Arc::downgrade(&shared), events));
        Ok(Self { shared, event_task })
    }

    /// Connect and wait for the motor unit.
    ///
    /// Waits up to `init_attempts` periods of `init_poll_ms`. On timeout the
    /// scan is stopped and the manager returns to idle. Returns whether the
    /// link is ready.
    pub async fn initialize(&self) -> bool {
        self.connect();

        let poll = Duration::from_millis(self.shared.config.init_poll_ms as u64);
        for _ in 0..self.shared.config.init_attempts {
            if self.is_connected() {
                return true;
            }
            tokio::time::sleep(poll).await;
        }

        let Ok(_permit) = self.shared.guard.acquire().await else {
            return false;
        };
        if self.shared.phase() == LinkPhase::Scanning {
            log::warn!(
                "link: no motor unit after {} ms, scan stopped",
                self.shared.config.init_timeout_ms()
            );
            self.shared.stop_scan().await;
            self.shared.set_phase(LinkPhase::Idle);
        }
        self.is_connected()
    }

    /// Release the peripheral, stop the battery poll and any scan.
    ///
    /// Safe from any state; a later `connect()` starts over.
    pub async fn dispose(&self) {
        let Ok(_permit) = self.shared.guard.acquire().await else {
            return;
        };
        let (was_scanning, session) = {
            let mut state = self.shared.lock_state();
            let was_scanning = state.phase == LinkPhase::Scanning;
            state.phase = LinkPhase::Idle;
            (was_scanning, state.session.take())
        };

        if was_scanning {
            self.shared.stop_scan().await;
        }
        if let Some(session) = session {
            self.shared.release(&session.peripheral).await;
        }
        self.shared.connection.send_replace(false);
        log::info!("link: disposed");
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> LinkPhase {
        self.shared.phase()
    }

    /// Last battery reading in millivolts, `None` until the first read.
    pub fn battery_voltage(&self) -> Option<u16> {
        match self.shared.battery_mv.load(Ordering::Relaxed) {
            NO_BATTERY => None,
            mv => Some(mv as u16),
        }
    }

    /// Watch the ready/not-ready state. The value changes on ready, drop
    /// and dispose.
    pub fn subscribe_connection(&self) -> watch::Receiver<bool> {
        self.shared.connection.subscribe()
    }

    /// The link configuration.
    pub fn config(&self) -> &LinkConfig {
        &self.shared.config
    }

    /// Get a reference to the radio.
    pub fn radio(&self) -> &R {
        &self.shared.radio
    }
}

impl<R: Radio> MotorLink for LinkManager<R> {
    fn is_connected(&self) -> bool {
        self.shared.phase().is_ready()
    }

    fn is_connecting(&self) -> bool {
        self.shared.phase().is_connecting()
    }

    fn connect(&self) {
        let Ok(permit) = Arc::clone(&self.shared.guard).try_acquire_owned() else {
            return;
        };
        {
            let mut state = self.shared.lock_state();
            if state.phase != LinkPhase::Idle {
                return;
            }
            state.phase = LinkPhase::Scanning;
        }

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let _permit = permit;
            shared.start_scan().await;
        });
    }

    fn set_motor_speed(&self, level: i32) {
        let level = level.clamp(0, STOP_LEVEL as i32) as u8;
        let state = self.shared.lock_state();
        match &state.session {
            Some(session) => {
                session.motor_tx.send_replace(Some(level));
            }
            None => log::trace!("link: not ready, motor level {:#04x} dropped", level),
        }
    }
}

impl<R: Radio> Drop for LinkManager<R> {
    fn drop(&mut self) {
        self.event_task.abort();
    }
}

impl<R: Radio> Shared<R> {
    fn lock_state(&self) -> MutexGuard<'_, LinkState<R>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn phase(&self) -> LinkPhase {
        self.lock_state().phase
    }

    fn set_phase(&self, phase: LinkPhase) {
        self.lock_state().phase = phase;
    }

    /// Start scanning. Caller holds the guard and has set `Scanning`.
    async fn start_scan(&self) {
        match self.radio.start_scan(self.config.service_uuid).await {
            Ok(()) => log::info!("link: scanning for {:032x}", self.config.service_uuid),
            Err(e) => {
                log::warn!("link: scan start failed: {}", e);
                self.set_phase(LinkPhase::Idle);
            }
        }
    }

    async fn rescan(&self) {
        self.set_phase(LinkPhase::Scanning);
        self.start_scan().await;
    }

    async fn stop_scan(&self) {
        if let Err(e) = self.radio.stop_scan().await {
            log::debug!("link: scan stop failed: {}", e);
        }
    }

    async fn release(&self, peripheral: &R::Peripheral) {
        if let Err(e) = self.radio.release(peripheral).await {
            log::debug!("link: release failed: {}", e);
        }
    }

    async fn on_advertisement(self: &Arc<Self>, address: R::Address) {
        let Ok(_permit) = self.guard.acquire().await else {
            return;
        };
        if self.phase() != LinkPhase::Scanning {
            log::trace!("link: ignoring advertisement from {:?}", address);
            return;
        }

        self.stop_scan().await;
        log::debug!("link: scan hit from {:?}", address);

        match self.discover(&address).await {
            Ok(found) => self.enter_ready(address, found),
            Err(e) => {
                log::warn!("link: {:?} rejected: {}", address, e);
                self.rescan().await;
            }
        }
    }

    async fn on_disconnected(&self, address: R::Address) {
        let Ok(_permit) = self.guard.acquire().await else {
            return;
        };
        let session = {
            let mut state = self.lock_state();
            if !state
                .session
                .as_ref()
                .is_some_and(|session| session.address == address)
            {
                return;
            }
            state.phase = LinkPhase::Scanning;
            state.session.take()
        };

        log::info!("link: {:?} dropped, rescanning", address);
        self.connection.send_replace(false);
        if let Some(session) = session {
            self.release(&session.peripheral).await;
        }
        self.start_scan().await;
    }

    /// Resolve and discover. On failure any resolved peripheral has been
    /// released.
    async fn discover(&self, address: &R::Address) -> Result<Discovered<R>, DiscoveryError> {
        self.set_phase(LinkPhase::Resolving);
        let peripheral = self
            .radio
            .resolve(address)
            .await
            .map_err(|e| DiscoveryError::Resolve(e.to_string()))?
            .ok_or(DiscoveryError::PeripheralNotFound)?;

        match self.discover_characteristics(&peripheral).await {
            Ok((battery, motor)) => Ok(Discovered {
                peripheral,
                battery,
                motor,
            }),
            Err(e) => {
                self.release(&peripheral).await;
                Err(e)
            }
        }
    }

    async fn discover_characteristics(
        &self,
        peripheral: &R::Peripheral,
    ) -> Result<(R::Characteristic, R::Characteristic), DiscoveryError> {
        let service_uuid = self.config.service_uuid;
        let battery_uuid = self.config.battery_uuid;
        let motor_uuid = self.config.motor_uuid;

        self.set_phase(LinkPhase::DiscoveringService);
        let services = self
            .radio
            .discover_services(peripheral)
            .await
            .map_err(|e| DiscoveryError::ServiceQuery(e.to_string()))?;
        let service =
            find_by_uuid(services, service_uuid).ok_or(DiscoveryError::ServiceNotFound(service_uuid))?;

        self.set_phase(LinkPhase::DiscoveringCharacteristics);
        let characteristics = self
            .radio
            .discover_characteristics(peripheral, &service)
            .await
            .map_err(|e| DiscoveryError::CharacteristicQuery(e.to_string()))?;
        let battery = find_by_uuid(characteristics.iter().cloned(), battery_uuid)
            .ok_or(DiscoveryError::CharacteristicMissing(battery_uuid))?;
        let motor = find_by_uuid(characteristics, motor_uuid)
            .ok_or(DiscoveryError::CharacteristicMissing(motor_uuid))?;

        Ok((battery, motor))
    }

    fn enter_ready(self: &Arc<Self>, address: R::Address, found: Discovered<R>) {
        let (motor_tx, motor_rx) = watch::channel(None);
        let writer = tokio::spawn(write_motor(
            Arc::downgrade(self),
            found.peripheral.clone(),
            found.motor,
            motor_rx,
        ));
        let battery_poll = tokio::spawn(poll_battery(
            Arc::downgrade(self),
            found.peripheral.clone(),
            found.battery,
            Duration::from_millis(self.config.battery_poll_ms as u64),
        ));

        log::info!("link: {:?} ready", address);
        {
            let mut state = self.lock_state();
            state.phase = LinkPhase::Ready;
            state.session = Some(Session {
                address,
                peripheral: found.peripheral,
                motor_tx,
                writer,
                battery_poll,
            });
        }
        self.connection.send_replace(true);
    }
}

async fn pump_events<R: Radio>(shared: Weak<Shared<R>>, mut events: RadioEvents<R::Address>) {
    while let Some(event) = events.recv().await {
        let Some(shared) = shared.upgrade() else {
            break;
        };
        match event {
            RadioEvent::Advertisement(address) => shared.on_advertisement(address).await,
            RadioEvent::Disconnected(address) => shared.on_disconnected(address).await,
        }
    }
    log::debug!("link: radio event stream closed");
}

async fn write_motor<R: Radio>(
    shared: Weak<Shared<R>>,
    peripheral: R::Peripheral,
    motor: R::Characteristic,
    mut levels: watch::Receiver<Option<u8>>,
) {
    while levels.changed().await.is_ok() {
        let level = *levels.borrow_and_update();
        let Some(level) = level else {
            continue;
        };
        let Some(shared) = shared.upgrade() else {
            break;
        };
        if let Err(e) = shared
            .radio
            .write_without_response(&peripheral, &motor, &motor_command(level))
            .await
        {
            log::debug!("link: motor write {:#04x} dropped: {}", level, e);
        }
    }
}

async fn poll_battery<R: Radio>(
    shared: Weak<Shared<R>>,
    peripheral: R::Peripheral,
    battery: R::Characteristic,
    period: Duration,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let Some(shared) = shared.upgrade() else {
            break;
        };
        match shared.radio.read(&peripheral, &battery).await {
            Ok(data) => match decode_battery(&data) {
                Some(mv) => {
                    shared.battery_mv.store(mv as u32, Ordering::Relaxed);
                    log::trace!("link: battery {} mV", mv);
                }
                None => log::debug!("link: short battery response ({} bytes)", data.len()),
            },
            Err(e) => log::debug!("link: battery read failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn motor_command_layout() {
        assert_eq!(motor_command(0x70), [0x00, 0x70]);
        assert_eq!(motor_command(STOP_LEVEL), [0x00, 0x80]);
    }

    #[test]
    fn decode_battery_little_endian() {
        assert_eq!(decode_battery(&[0xe8, 0x1c]), Some(7400));
        assert_eq!(decode_battery(&[0x34, 0x12, 0xff]), Some(0x1234));
    }

    #[test]
    fn decode_battery_short_response() {
        assert_eq!(decode_battery(&[]), None);
        assert_eq!(decode_battery(&[0x01]), None);
    }

    #[test]
    fn phase_predicates() {
        assert!(!LinkPhase::Idle.is_connecting());
        assert!(LinkPhase::Scanning.is_connecting());
        assert!(LinkPhase::DiscoveringCharacteristics.is_connecting());
        assert!(!LinkPhase::Ready.is_connecting());
        assert!(LinkPhase::Ready.is_ready());
        assert_eq!(LinkPhase::default(), LinkPhase::Idle);
    }
}
