//! Wireless radio abstraction used by the link manager.
//!
//! The [`Radio`] trait is the platform capability the link manager drives:
//! advertisement scanning filtered by service, peripheral resolution,
//! GATT-style service and characteristic discovery, and characteristic
//! reads and writes. Scan hits and link drops are delivered on a separate
//! channel ([`RadioEvents`]) because real radio stacks report them from
//! their own dispatch context.
//!
//! Methods return `Send` futures so the link manager can run them on
//! spawned tokio tasks.

use alloc::vec::Vec;
use core::fmt::{Debug, Display};
use core::future::Future;

/// Anything discovered on a peripheral that carries a 128-bit UUID.
pub trait GattHandle {
    /// The 128-bit UUID of this service or characteristic.
    fn uuid(&self) -> u128;
}

/// Asynchronous notification from the radio stack.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RadioEvent<A> {
    /// An advertisement matching the active scan filter was received.
    Advertisement(A),
    /// The peripheral at this address dropped its connection.
    Disconnected(A),
}

/// Receiving side of the radio event stream.
pub type RadioEvents<A> = tokio::sync::mpsc::UnboundedReceiver<RadioEvent<A>>;

/// Platform BLE central capability.
///
/// All discovery is uncached: every call re-queries the peripheral.
///
/// # Implementation Notes
///
/// - `events` is called once by the link manager; later calls may fail
/// - `resolve` returns `Ok(None)` when the address no longer maps to a device
/// - `release` must tolerate peripherals that are already disconnected
pub trait Radio: Send + Sync + 'static {
    /// Address carried by advertisements.
    type Address: Clone + PartialEq + Debug + Send + Sync + 'static;
    /// Handle to a resolved peripheral.
    type Peripheral: Clone + Send + Sync + 'static;
    /// Handle to a discovered service.
    type Service: GattHandle + Send + Sync + 'static;
    /// Handle to a discovered characteristic.
    type Characteristic: GattHandle + Clone + Send + Sync + 'static;
    /// Error type for radio operations.
    type Error: Display + Debug + Send + 'static;

    /// Take the event stream (scan hits and link drops).
    fn events(
        &self,
    ) -> impl Future<Output = Result<RadioEvents<Self::Address>, Self::Error>> + Send;

    /// Start advertisement scanning filtered to one service UUID.
    fn start_scan(&self, service: u128) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Stop advertisement scanning.
    fn stop_scan(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Resolve and connect the peripheral behind an advertisement.
    fn resolve(
        &self,
        address: &Self::Address,
    ) -> impl Future<Output = Result<Option<Self::Peripheral>, Self::Error>> + Send;

    /// Discover the peripheral's services, bypassing any cache.
    fn discover_services(
        &self,
        peripheral: &Self::Peripheral,
    ) -> impl Future<Output = Result<Vec<Self::Service>, Self::Error>> + Send;

    /// Discover the characteristics of one service.
    fn discover_characteristics(
        &self,
        peripheral: &Self::Peripheral,
        service: &Self::Service,
    ) -> impl Future<Output = Result<Vec<Self::Characteristic>, Self::Error>> + Send;

    /// Read a characteristic value.
    fn read(
        &self,
        peripheral: &Self::Peripheral,
        characteristic: &Self::Characteristic,
    ) -> impl Future<Output = Result<Vec<u8>, Self::Error>> + Send;

    /// Write a characteristic value without waiting for a response.
    fn write_without_response(
        &self,
        peripheral: &Self::Peripheral,
        characteristic: &Self::Characteristic,
        data: &[u8],
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Disconnect and drop a peripheral handle.
    fn release(
        &self,
        peripheral: &Self::Peripheral,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// Find the first handle carrying `uuid`.
pub fn find_by_uuid<H: GattHandle>(handles: impl IntoIterator<Item = H>, uuid: u128) -> Option<H> {
    handles.into_iter().find(|h| h.uuid() == uuid)
}
