//! BLE central on BlueZ via `bluest`.
//!
//! `bluest` scans through a stream borrowed from the adapter, so scanning
//! runs on its own task that owns an adapter clone; stopping the scan drops
//! that task and with it the stream. Each connected device gets a watcher
//! task that turns a BlueZ disconnect into [`RadioEvent::Disconnected`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bluest::{Adapter, Characteristic, ConnectionEvent, Device, DeviceId, Service, Uuid};
use futures::StreamExt;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::HardwareError;
use crate::traits::{GattHandle, Radio, RadioEvent, RadioEvents};

/// How long to wait for the adapter to power up.
const ADAPTER_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors from [`BluestRadio`].
#[derive(Error, Debug)]
pub enum RadioError {
    /// Error from the BlueZ stack.
    #[error("bluetooth: {0}")]
    Bluest(#[from] bluest::Error),

    /// [`Radio::events`] was called twice.
    #[error("radio event stream already taken")]
    EventsTaken,

    /// The scan task died before reporting its start.
    #[error("scan task ended before scanning started")]
    ScanAborted,
}

impl GattHandle for Service {
    fn uuid(&self) -> u128 {
        Service::uuid(self).as_u128()
    }
}

impl GattHandle for Characteristic {
    fn uuid(&self) -> u128 {
        Characteristic::uuid(self).as_u128()
    }
}

#[derive(Default)]
struct Tasks {
    scan: Option<JoinHandle<()>>,
    watchers: HashMap<DeviceId, JoinHandle<()>>,
}

/// BLE central on the first BlueZ adapter.
///
/// # Example
///
/// ```ignore
/// use rs_trainz_ble::hal::linux::BluestRadio;
/// use rs_trainz_ble::{LinkConfig, LinkManager};
///
/// let radio = BluestRadio::new().await?;
/// let link = LinkManager::start(radio, LinkConfig::default()).await?;
/// ```
pub struct BluestRadio {
    adapter: Adapter,
    /// Devices seen in advertisements, by id.
    seen: Arc<Mutex<HashMap<DeviceId, Device>>>,
    tasks: Mutex<Tasks>,
    events_tx: mpsc::UnboundedSender<RadioEvent<DeviceId>>,
    events_rx: Mutex<Option<RadioEvents<DeviceId>>>,
}

impl BluestRadio {
    /// Open the default adapter and wait for it to be powered.
    pub async fn new() -> Result<Self, HardwareError> {
        let adapter = Adapter::default()
            .await
            .ok_or(HardwareError::RadioUnavailable)?;
        tokio::time::timeout(ADAPTER_TIMEOUT, adapter.wait_available())
            .await
            .map_err(|_| HardwareError::Radio("adapter not powered".into()))?
            .map_err(|e| HardwareError::Radio(e.to_string()))?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        log::info!("bluetooth adapter ready");
        Ok(Self {
            adapter,
            seen: Arc::new(Mutex::new(HashMap::new())),
            tasks: Mutex::new(Tasks::default()),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
        })
    }

    fn tasks(&self) -> MutexGuard<'_, Tasks> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn watch_disconnect(&self, device: Device) {
        let adapter = self.adapter.clone();
        let events_tx = self.events_tx.clone();
        let id = device.id();
        let watcher = tokio::spawn({
            let id = id.clone();
            async move {
                let mut events = match adapter.device_connection_events(&device).await {
                    Ok(events) => events,
                    Err(e) => {
                        log::warn!("bluetooth: cannot watch {:?}: {}", id, e);
                        return;
                    }
                };
                while let Some(event) = events.next().await {
                    if matches!(event, ConnectionEvent::Disconnected) {
                        let _ = events_tx.send(RadioEvent::Disconnected(id));
                        break;
                    }
                }
            }
        });
        if let Some(old) = self.tasks().watchers.insert(id, watcher) {
            old.abort();
        }
    }
}

impl Drop for BluestRadio {
    fn drop(&mut self) {
        let tasks = self.tasks.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(scan) = tasks.scan.take() {
            scan.abort();
        }
        for (_, watcher) in tasks.watchers.drain() {
            watcher.abort();
        }
    }
}

impl Radio for BluestRadio {
    type Address = DeviceId;
    type Peripheral = Device;
    type Service = Service;
    type Characteristic = Characteristic;
    type Error = RadioError;

    async fn events(&self) -> Result<RadioEvents<DeviceId>, RadioError> {
        self.events_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(RadioError::EventsTaken)
    }

    async fn start_scan(&self, service: u128) -> Result<(), RadioError> {
        let adapter = self.adapter.clone();
        let seen = Arc::clone(&self.seen);
        let events_tx = self.events_tx.clone();
        let (started_tx, started_rx) = oneshot::channel();

        let scan = tokio::spawn(async move {
            let services = [Uuid::from_u128(service)];
            let mut hits = match adapter.scan(&services).await {
                Ok(hits) => {
                    let _ = started_tx.send(Ok(()));
                    hits
                }
                Err(e) => {
                    let _ = started_tx.send(Err(e));
                    return;
                }
            };
            while let Some(hit) = hits.next().await {
                let id = hit.device.id();
                seen.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(id.clone(), hit.device);
                if events_tx.send(RadioEvent::Advertisement(id)).is_err() {
                    break;
                }
            }
        });

        if let Some(old) = self.tasks().scan.replace(scan) {
            old.abort();
        }
        started_rx.await.map_err(|_| RadioError::ScanAborted)??;
        Ok(())
    }

    async fn stop_scan(&self) -> Result<(), RadioError> {
        if let Some(scan) = self.tasks().scan.take() {
            scan.abort();
        }
        Ok(())
    }

    async fn resolve(&self, address: &DeviceId) -> Result<Option<Device>, RadioError> {
        let device = self
            .seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(address)
            .cloned();
        let Some(device) = device else {
            return Ok(None);
        };

        self.adapter.connect_device(&device).await?;
        self.watch_disconnect(device.clone());
        Ok(Some(device))
    }

    async fn discover_services(&self, peripheral: &Device) -> Result<Vec<Service>, RadioError> {
        Ok(peripheral.discover_services().await?)
    }

    async fn discover_characteristics(
        &self,
        _peripheral: &Device,
        service: &Service,
    ) -> Result<Vec<Characteristic>, RadioError> {
        Ok(service.discover_characteristics().await?)
    }

    async fn read(
        &self,
        _peripheral: &Device,
        characteristic: &Characteristic,
    ) -> Result<Vec<u8>, RadioError> {
        Ok(characteristic.read().await?)
    }

    async fn write_without_response(
        &self,
        _peripheral: &Device,
        characteristic: &Characteristic,
        data: &[u8],
    ) -> Result<(), RadioError> {
        Ok(characteristic.write_without_response(data).await?)
    }

    async fn release(&self, peripheral: &Device) -> Result<(), RadioError> {
        if let Some(watcher) = self.tasks().watchers.remove(&peripheral.id()) {
            watcher.abort();
        }
        self.adapter.disconnect_device(peripheral).await?;
        Ok(())
    }
}
