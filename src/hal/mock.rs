//! Mock implementations for testing without hardware.
//!
//! This module provides test doubles for all hardware and link traits,
//! enabling development and testing on desktop without a controller,
//! lamps or a radio.
//!
//! # Available Mocks
//!
//! | Mock | Trait | Purpose |
//! |------|-------|---------|
//! | [`MockBus`] | [`ControllerBus`] | Sticky response frame plus a queue of scripted replies |
//! | [`MockLine`] | [`IndicatorLine`] | Records every level written |
//! | [`MockDoor`] | [`DoorSensor`] | Door state set by the test |
//! | [`MockLink`] | [`MotorLink`] | Connection flags and the commands sent |
//! | `MockRadio` | `Radio` | Scripted BLE central (requires `std`) |
//!
//! # Example
//!
//! ```rust
//! use rs_trainz_ble::{ThrottleController, IndicatorStatus};
//! use rs_trainz_ble::hal::{MockBus, MockLine, MockLink};
//!
//! let link = MockLink::connected();
//! let bus = MockBus::with_levels(1, 0);
//! let mut throttle = ThrottleController::new(link, bus, MockLine::new(), MockLine::new()).unwrap();
//!
//! throttle.tick().unwrap();
//!
//! let state = throttle.state();
//! assert_eq!(state.speed, 0x70);
//! assert_eq!(state.indicator, IndicatorStatus::SteadyOn);
//! assert_eq!(throttle.link().sent(), [0x70]);
//! ```
//!
//! [`ControllerBus`]: crate::traits::ControllerBus
//! [`IndicatorLine`]: crate::traits::IndicatorLine
//! [`DoorSensor`]: crate::traits::DoorSensor
//! [`MotorLink`]: crate::traits::MotorLink

use alloc::collections::VecDeque;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};

use crate::reader::frame_for_levels;
use crate::traits::{ControllerBus, DoorSensor, IndicatorLine, MotorLink, FRAME_LEN};

// ============================================================================
// Hardware Mocks
// ============================================================================

/// Mock controller bus for testing.
///
/// Replies with a sticky frame unless a scripted reply is queued. Queued
/// replies are consumed in FIFO order, one per transfer.
///
/// # Example
///
/// ```rust
/// use rs_trainz_ble::hal::MockBus;
/// use rs_trainz_ble::reader::{decode_accel, frame_for_levels, READ_COMMAND};
/// use rs_trainz_ble::traits::ControllerBus;
///
/// let mut bus = MockBus::with_levels(3, 0);
/// bus.fail_next(1);
///
/// let mut response = [0u8; 5];
/// assert!(bus.transfer(&READ_COMMAND, &mut response).is_err());
/// bus.transfer(&READ_COMMAND, &mut response).unwrap();
/// assert_eq!(decode_accel(&response), Some(3));
/// assert_eq!(bus.transfers, 2);
/// ```
#[derive(Debug)]
pub struct MockBus {
    /// Reply used when nothing is queued.
    pub frame: [u8; FRAME_LEN],
    /// Scripted replies; `None` makes the transfer fail.
    pub queued: VecDeque<Option<[u8; FRAME_LEN]>>,
    /// Number of transfers attempted.
    pub transfers: usize,
    /// Last query frame clocked out.
    pub last_query: Option<[u8; FRAME_LEN]>,
}

impl MockBus {
    /// Creates a mock bus replying with both levers at neutral.
    pub fn new() -> Self {
        Self::with_frame(frame_for_levels(0, 0))
    }

    /// Creates a mock bus replying with a fixed frame.
    pub fn with_frame(frame: [u8; FRAME_LEN]) -> Self {
        Self {
            frame,
            queued: VecDeque::new(),
            transfers: 0,
            last_query: None,
        }
    }

    /// Creates a mock bus replying with the given lever notches.
    pub fn with_levels(accel: u8, brake: u8) -> Self {
        Self::with_frame(frame_for_levels(accel, brake))
    }

    /// Replace the sticky reply.
    pub fn set_frame(&mut self, frame: [u8; FRAME_LEN]) {
        self.frame = frame;
    }

    /// Replace the sticky reply with lever notches.
    pub fn set_levels(&mut self, accel: u8, brake: u8) {
        self.frame = frame_for_levels(accel, brake);
    }

    /// Queue a one-shot reply.
    pub fn queue_frame(&mut self, frame: [u8; FRAME_LEN]) {
        self.queued.push_back(Some(frame));
    }

    /// Make the next `count` transfers fail.
    pub fn fail_next(&mut self, count: usize) {
        for _ in 0..count {
            self.queued.push_back(None);
        }
    }
}

impl Default for MockBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ControllerBus for MockBus {
    type Error = ();

    fn transfer(
        &mut self,
        query: &[u8; FRAME_LEN],
        response: &mut [u8; FRAME_LEN],
    ) -> Result<(), ()> {
        self.transfers += 1;
        self.last_query = Some(*query);
        match self.queued.pop_front() {
            Some(Some(frame)) => *response = frame,
            Some(None) => return Err(()),
            None => *response = self.frame,
        }
        Ok(())
    }
}

/// Mock digital output for testing.
///
/// Records every level written so blink patterns can be asserted.
///
/// # Example
///
/// ```rust
/// use rs_trainz_ble::hal::MockLine;
/// use rs_trainz_ble::traits::IndicatorLine;
///
/// let mut line = MockLine::new();
/// line.set_level(true).unwrap();
/// line.set_level(false).unwrap();
///
/// assert!(!line.level);
/// assert_eq!(line.history, [true, false]);
///
/// line.fail = true;
/// assert!(line.set_level(true).is_err());
/// ```
#[derive(Debug, Default)]
pub struct MockLine {
    /// Current output level.
    pub level: bool,
    /// Every level written, oldest first.
    pub history: Vec<bool>,
    /// When set, writes fail and leave the level untouched.
    pub fail: bool,
}

impl MockLine {
    /// Creates a new mock line driven low.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of low-to-high transitions recorded, starting from low.
    pub fn rising_edges(&self) -> usize {
        let mut previous = false;
        self.history
            .iter()
            .filter(|&&high| {
                let rising = high && !previous;
                previous = high;
                rising
            })
            .count()
    }
}

impl IndicatorLine for MockLine {
    type Error = ();

    fn set_level(&mut self, high: bool) -> Result<(), ()> {
        if self.fail {
            return Err(());
        }
        self.level = high;
        self.history.push(high);
        Ok(())
    }
}

/// Mock door sensor for testing.
#[derive(Debug, Default)]
pub struct MockDoor {
    /// Whether the door reads as open.
    pub open: bool,
    /// Number of times the sensor was read.
    pub reads: usize,
}

impl MockDoor {
    /// Creates a closed door.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an open door.
    pub fn opened() -> Self {
        Self {
            open: true,
            ..Default::default()
        }
    }
}

impl DoorSensor for MockDoor {
    fn is_open(&mut self) -> bool {
        self.reads += 1;
        self.open
    }
}

// ============================================================================
// Link Mocks
// ============================================================================

/// Mock motor link for testing the control loop.
///
/// `connect()` moves an idle link to connecting; the test decides when it
/// becomes connected. Every `set_motor_speed` call is recorded unclamped so
/// tests can check what the control loop actually asked for.
///
/// # Example
///
/// ```rust
/// use rs_trainz_ble::hal::MockLink;
/// use rs_trainz_ble::traits::MotorLink;
///
/// let link = MockLink::new();
/// link.connect();
/// assert!(link.is_connecting());
///
/// link.set_connected(true);
/// link.set_motor_speed(0x70);
/// assert_eq!(link.sent(), [0x70]);
/// assert_eq!(link.connect_calls(), 1);
/// ```
#[derive(Debug, Default)]
pub struct MockLink {
    connected: Cell<bool>,
    connecting: Cell<bool>,
    connect_calls: Cell<usize>,
    sent: RefCell<Vec<i32>>,
}

impl MockLink {
    /// Creates an idle link.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a link that is already connected.
    pub fn connected() -> Self {
        let link = Self::new();
        link.set_connected(true);
        link
    }

    /// Finish (or drop) the connection.
    pub fn set_connected(&self, connected: bool) {
        self.connected.set(connected);
        self.connecting.set(false);
    }

    /// Force the connecting flag.
    pub fn set_connecting(&self, connecting: bool) {
        self.connecting.set(connecting);
    }

    /// Number of `connect()` calls.
    pub fn connect_calls(&self) -> usize {
        self.connect_calls.get()
    }

    /// Every level passed to `set_motor_speed`, oldest first.
    pub fn sent(&self) -> Vec<i32> {
        self.sent.borrow().clone()
    }

    /// The most recent level sent.
    pub fn last_sent(&self) -> Option<i32> {
        self.sent.borrow().last().copied()
    }

    /// Forget recorded commands.
    pub fn clear_sent(&self) {
        self.sent.borrow_mut().clear();
    }
}

impl MotorLink for MockLink {
    fn is_connected(&self) -> bool {
        self.connected.get()
    }

    fn is_connecting(&self) -> bool {
        self.connecting.get()
    }

    fn connect(&self) {
        self.connect_calls.set(self.connect_calls.get() + 1);
        if !self.connected.get() {
            self.connecting.set(true);
        }
    }

    fn set_motor_speed(&self, level: i32) {
        self.sent.borrow_mut().push(level);
    }
}

// ============================================================================
// Radio Mock
// ============================================================================

#[cfg(feature = "std")]
pub use radio::{MockGatt, MockPeripheral, MockRadio, MockRadioError, MockRadioState};

#[cfg(feature = "std")]
mod radio {
    use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

    use alloc::vec::Vec;
    use tokio::sync::{mpsc, Notify};

    use crate::config::{BCORE_BATTERY_UUID, BCORE_MOTOR_UUID, BCORE_SERVICE_UUID};
    use crate::traits::{GattHandle, Radio, RadioEvent, RadioEvents};

    /// Peripheral handle handed out by [`MockRadio`].
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct MockPeripheral {
        /// Address the peripheral was resolved from.
        pub address: u64,
    }

    /// Service or characteristic handle handed out by [`MockRadio`].
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct MockGatt {
        /// Handle UUID.
        pub uuid: u128,
    }

    impl GattHandle for MockGatt {
        fn uuid(&self) -> u128 {
            self.uuid
        }
    }

    /// Error returned by scripted [`MockRadio`] failures.
    #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
    #[error("mock radio: {0}")]
    pub struct MockRadioError(pub &'static str);

    /// Script and record of a [`MockRadio`].
    #[derive(Debug)]
    pub struct MockRadioState {
        /// Services reported by discovery.
        pub services: Vec<u128>,
        /// Characteristics reported under any service.
        pub characteristics: Vec<u128>,
        /// Addresses that resolve to no device.
        pub unresolvable: Vec<u64>,
        /// Number of upcoming service queries that fail.
        pub failing_service_queries: usize,
        /// Number of upcoming characteristic queries that fail.
        pub failing_characteristic_queries: usize,
        /// When set, every write fails.
        pub fail_writes: bool,
        /// When set, the next service query waits for a notification.
        pub discovery_gate: Option<Arc<Notify>>,
        /// Battery characteristic value.
        pub battery: Vec<u8>,
        /// Whether a scan is active.
        pub scanning: bool,
        /// Service filter of the last scan.
        pub scan_filter: Option<u128>,
        /// Number of scans started.
        pub scans_started: usize,
        /// Number of scans stopped.
        pub scans_stopped: usize,
        /// Addresses resolved, in order.
        pub resolved: Vec<u64>,
        /// Addresses released, in order.
        pub released: Vec<u64>,
        /// Writes issued as (characteristic, payload).
        pub writes: Vec<(u128, Vec<u8>)>,
        /// Number of characteristic reads.
        pub reads: usize,
    }

    impl Default for MockRadioState {
        fn default() -> Self {
            Self {
                services: alloc::vec![BCORE_SERVICE_UUID],
                characteristics: alloc::vec![BCORE_BATTERY_UUID, BCORE_MOTOR_UUID],
                unresolvable: Vec::new(),
                failing_service_queries: 0,
                failing_characteristic_queries: 0,
                fail_writes: false,
                discovery_gate: None,
                battery: 7400u16.to_le_bytes().to_vec(),
                scanning: false,
                scan_filter: None,
                scans_started: 0,
                scans_stopped: 0,
                resolved: Vec::new(),
                released: Vec::new(),
                writes: Vec::new(),
                reads: 0,
            }
        }
    }

    impl MockRadioState {
        /// Payloads written to one characteristic.
        pub fn writes_to(&self, uuid: u128) -> Vec<Vec<u8>> {
            self.writes
                .iter()
                .filter(|(c, _)| *c == uuid)
                .map(|(_, data)| data.clone())
                .collect()
        }
    }

    /// Scripted BLE central for testing the link manager.
    ///
    /// Cloning shares the script and the event channel, so a test keeps one
    /// clone to inject advertisements while the link manager owns another.
    ///
    /// # Example
    ///
    /// ```rust
    /// use rs_trainz_ble::hal::MockRadio;
    ///
    /// let radio = MockRadio::new();
    /// radio.state().failing_service_queries = 1;
    /// radio.advertise(7);
    /// assert_eq!(radio.state().resolved.len(), 0);
    /// ```
    #[derive(Clone, Debug)]
    pub struct MockRadio {
        state: Arc<Mutex<MockRadioState>>,
        events_tx: mpsc::UnboundedSender<RadioEvent<u64>>,
        events_rx: Arc<Mutex<Option<RadioEvents<u64>>>>,
    }

    impl MockRadio {
        /// Creates a radio exposing a complete motor unit.
        pub fn new() -> Self {
            let (events_tx, events_rx) = mpsc::unbounded_channel();
            Self {
                state: Arc::new(Mutex::new(MockRadioState::default())),
                events_tx,
                events_rx: Arc::new(Mutex::new(Some(events_rx))),
            }
        }

        /// Lock the script and record.
        pub fn state(&self) -> MutexGuard<'_, MockRadioState> {
            self.state.lock().unwrap_or_else(PoisonError::into_inner)
        }

        /// Deliver an advertisement from `address`.
        pub fn advertise(&self, address: u64) {
            let _ = self.events_tx.send(RadioEvent::Advertisement(address));
        }

        /// Suspend the next service query until the returned gate is
        /// notified.
        pub fn hold_discovery(&self) -> Arc<Notify> {
            let gate = Arc::new(Notify::new());
            self.state().discovery_gate = Some(Arc::clone(&gate));
            gate
        }

        /// Deliver a link drop for `address`.
        pub fn disconnect(&self, address: u64) {
            let _ = self.events_tx.send(RadioEvent::Disconnected(address));
        }
    }

    impl Default for MockRadio {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Radio for MockRadio {
        type Address = u64;
        type Peripheral = MockPeripheral;
        type Service = MockGatt;
        type Characteristic = MockGatt;
        type Error = MockRadioError;

        async fn events(&self) -> Result<RadioEvents<u64>, MockRadioError> {
            self.events_rx
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take()
                .ok_or(MockRadioError("event stream already taken"))
        }

        async fn start_scan(&self, service: u128) -> Result<(), MockRadioError> {
            let mut state = self.state();
            state.scanning = true;
            state.scan_filter = Some(service);
            state.scans_started += 1;
            Ok(())
        }

        async fn stop_scan(&self) -> Result<(), MockRadioError> {
            let mut state = self.state();
            state.scanning = false;
            state.scans_stopped += 1;
            Ok(())
        }

        async fn resolve(&self, address: &u64) -> Result<Option<MockPeripheral>, MockRadioError> {
            let mut state = self.state();
            if state.unresolvable.contains(address) {
                return Ok(None);
            }
            state.resolved.push(*address);
            Ok(Some(MockPeripheral { address: *address }))
        }

        async fn discover_services(
            &self,
            _peripheral: &MockPeripheral,
        ) -> Result<Vec<MockGatt>, MockRadioError> {
            let gate = self.state().discovery_gate.take();
            if let Some(gate) = gate {
                gate.notified().await;
            }

            let mut state = self.state();
            if state.failing_service_queries > 0 {
                state.failing_service_queries -= 1;
                return Err(MockRadioError("service query failed"));
            }
            Ok(state.services.iter().map(|&uuid| MockGatt { uuid }).collect())
        }

        async fn discover_characteristics(
            &self,
            _peripheral: &MockPeripheral,
            _service: &MockGatt,
        ) -> Result<Vec<MockGatt>, MockRadioError> {
            let mut state = self.state();
            if state.failing_characteristic_queries > 0 {
                state.failing_characteristic_queries -= 1;
                return Err(MockRadioError("characteristic query failed"));
            }
            Ok(state
                .characteristics
                .iter()
                .map(|&uuid| MockGatt { uuid })
                .collect())
        }

        async fn read(
            &self,
            _peripheral: &MockPeripheral,
            _characteristic: &MockGatt,
        ) -> Result<Vec<u8>, MockRadioError> {
            let mut state = self.state();
            state.reads += 1;
            Ok(state.battery.clone())
        }

        async fn write_without_response(
            &self,
            _peripheral: &MockPeripheral,
            characteristic: &MockGatt,
            data: &[u8],
        ) -> Result<(), MockRadioError> {
            let mut state = self.state();
            if state.fail_writes {
                return Err(MockRadioError("write failed"));
            }
            state.writes.push((characteristic.uuid, data.to_vec()));
            Ok(())
        }

        async fn release(&self, peripheral: &MockPeripheral) -> Result<(), MockRadioError> {
            self.state().released.push(peripheral.address);
            Ok(())
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
