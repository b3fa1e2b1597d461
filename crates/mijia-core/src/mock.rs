//! In-memory peripheral link for testing.
//!
//! [`MockLink`] implements [`PeripheralLink`] over a set of [`MockPeripheral`]s,
//! so the device layer and the model codecs can be exercised without BLE
//! hardware.
//!
//! # Features
//!
//! - **Call counting**: service resolutions, connects, reads, subscriptions
//! - **Scripted notifications**: values delivered as soon as a listener subscribes
//! - **Live notifications**: push values to current subscribers
//! - **Failure injection**: connect failures, failed resolutions, rejected writes
//! - **Link loss**: drop the link and close every subscription

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::BufMut;
use futures::channel::mpsc;
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

use mijia_types::uuid::{
    BATTERY_LEVEL, BATTERY_SERVICE, LYWSD02_BATTERY, LYWSD02_HISTORY, LYWSD02_HISTORY_INDEX,
    LYWSD02_LAST_HOUR, LYWSD02_SERVICE, LYWSD02_TEMP_HUM, LYWSD02_TIME, LYWSD02_UNIT,
    LYWSDCGQ_SERVICE, LYWSDCGQ_TEMP_HUM,
};

use crate::error::{ConnectionFailureReason, DeviceNotFoundReason, Error, Result};
use crate::link::{
    DiscoveryRequest, LinkCharacteristic, LinkHandle, LinkService, LinkSession, PeripheralLink,
    ValueStream,
};

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A mock Bluetooth stack.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use mijia_core::mock::{MockLink, MockPeripheral};
/// use mijia_core::{Lywsd02, SessionConfig};
///
/// #[tokio::main]
/// async fn main() {
///     let link = MockLink::new().with_peripheral(MockPeripheral::lywsd02());
///     let sensor = Lywsd02::new(Arc::new(link), SessionConfig::default());
///     sensor.device().request_and_connect().await.unwrap();
///     assert_eq!(sensor.get_battery().await.unwrap(), 87);
/// }
/// ```
#[derive(Debug, Default)]
pub struct MockLink {
    peripherals: Mutex<Vec<MockPeripheral>>,
    discover_count: AtomicU32,
}

impl MockLink {
    /// A link with no peripherals in range.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a peripheral.
    #[must_use]
    pub fn with_peripheral(self, peripheral: MockPeripheral) -> Self {
        self.add(peripheral);
        self
    }

    /// Add a peripheral to a shared link.
    pub fn add(&self, peripheral: MockPeripheral) {
        lock(&self.peripherals).push(peripheral);
    }

    /// How many discovery requests were made.
    pub fn discover_count(&self) -> u32 {
        self.discover_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PeripheralLink for MockLink {
    async fn discover(&self, request: &DiscoveryRequest) -> Result<Arc<dyn LinkHandle>> {
        self.discover_count.fetch_add(1, Ordering::SeqCst);
        let found = lock(&self.peripherals)
            .iter()
            .find(|p| request.matches(p.inner.name.as_deref(), &p.inner.id))
            .cloned();

        match found {
            Some(peripheral) => Ok(Arc::new(peripheral)),
            None => Err(Error::DeviceNotFound(DeviceNotFoundReason::NoMatch {
                filters: request.names.clone(),
            })),
        }
    }
}

struct PeripheralState {
    name: Option<String>,
    id: String,
    connected: watch::Sender<bool>,
    services: HashMap<Uuid, Arc<MockService>>,
    connect_count: AtomicU32,
    disconnect_count: AtomicU32,
    fail_connect: AtomicBool,
    pending_service_failures: AtomicU32,
    resolution_delay_ms: AtomicU64,
    resolutions: Mutex<HashMap<Uuid, u32>>,
}

impl PeripheralState {
    fn is_up(&self) -> bool {
        *self.connected.borrow()
    }
}

/// A mock peripheral. Clones share state.
#[derive(Clone)]
pub struct MockPeripheral {
    inner: Arc<PeripheralState>,
}

impl std::fmt::Debug for MockPeripheral {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockPeripheral")
            .field("name", &self.inner.name)
            .field("id", &self.inner.id)
            .field("connected", &self.inner.is_up())
            .finish()
    }
}

impl MockPeripheral {
    /// Start building a peripheral advertising `name`.
    pub fn builder(name: &str) -> MockPeripheralBuilder {
        MockPeripheralBuilder {
            name: Some(name.to_string()),
            ..MockPeripheralBuilder::default()
        }
    }

    /// An LYWSD02 with plausible values and four history records (0-3).
    pub fn lywsd02() -> Self {
        let mut builder = Self::builder("LYWSD02")
            // 2024-03-01 12:00:00 UTC written from UTC
            .characteristic(LYWSD02_SERVICE, LYWSD02_TIME, &[0x40, 0xC3, 0xE1, 0x65, 0x00])
            .notifying(LYWSD02_SERVICE, LYWSD02_TEMP_HUM, &[0x16, 0x09, 48, 0xB8, 0x0B])
            .characteristic(LYWSD02_SERVICE, LYWSD02_BATTERY, &[87])
            .characteristic(LYWSD02_SERVICE, LYWSD02_UNIT, &[0x00])
            .characteristic(LYWSD02_SERVICE, LYWSD02_HISTORY_INDEX, &[4, 0, 0, 0, 0, 0, 0, 0])
            .characteristic(LYWSD02_SERVICE, LYWSD02_LAST_HOUR, &history_record_bytes(3))
            .characteristic(LYWSD02_SERVICE, LYWSD02_HISTORY, &[]);
        builder = builder.script(
            LYWSD02_SERVICE,
            LYWSD02_HISTORY,
            (0..4).map(history_record_bytes).collect(),
        );
        builder.build()
    }

    /// An LYWSDCGQ/01ZM reporting 21.5 degrees and 40.2 %.
    pub fn lywsdcgq() -> Self {
        Self::builder("MJ_HT_V1")
            .notifying(LYWSDCGQ_SERVICE, LYWSDCGQ_TEMP_HUM, b"T=21.5 H=40.2\0")
            .characteristic(BATTERY_SERVICE, BATTERY_LEVEL, &[92])
            .build()
    }

    /// Platform identifier.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// A characteristic, for inspection and control.
    pub fn characteristic(&self, service: Uuid, characteristic: Uuid) -> Option<Arc<MockCharacteristic>> {
        self.inner
            .services
            .get(&service)
            .and_then(|s| s.characteristics.get(&characteristic))
            .cloned()
    }

    /// How many times `service` was resolved.
    pub fn service_resolutions(&self, service: Uuid) -> u32 {
        lock(&self.inner.resolutions).get(&service).copied().unwrap_or(0)
    }

    /// How many times the link was connected.
    pub fn connect_count(&self) -> u32 {
        self.inner.connect_count.load(Ordering::SeqCst)
    }

    /// How many times the link was disconnected on request.
    pub fn disconnect_count(&self) -> u32 {
        self.inner.disconnect_count.load(Ordering::SeqCst)
    }

    /// Make connection attempts fail.
    pub fn set_connect_failure(&self, fail: bool) {
        self.inner.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Fail the next `count` service resolutions.
    pub fn fail_next_service_resolutions(&self, count: u32) {
        self.inner
            .pending_service_failures
            .store(count, Ordering::SeqCst);
    }

    /// Delay every service resolution.
    pub fn set_resolution_delay(&self, delay: Duration) {
        self.inner
            .resolution_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Drop the link as if the peripheral went out of range.
    pub fn simulate_link_loss(&self) {
        debug!(id = %self.inner.id, "Simulating link loss");
        self.inner.connected.send_replace(false);
        for service in self.inner.services.values() {
            for characteristic in service.characteristics.values() {
                lock(&characteristic.subscribers).clear();
            }
        }
    }
}

#[async_trait]
impl LinkHandle for MockPeripheral {
    fn name(&self) -> Option<String> {
        self.inner.name.clone()
    }

    fn id(&self) -> String {
        self.inner.id.clone()
    }

    async fn is_connected(&self) -> bool {
        self.inner.is_up()
    }

    async fn connect(&self) -> Result<Arc<dyn LinkSession>> {
        self.inner.connect_count.fetch_add(1, Ordering::SeqCst);
        if self.inner.fail_connect.load(Ordering::SeqCst) {
            return Err(Error::connection_failed(
                Some(self.inner.id.clone()),
                ConnectionFailureReason::Other("mock connect failure".to_string()),
            ));
        }
        self.inner.connected.send_replace(true);
        Ok(Arc::new(MockSession {
            inner: Arc::clone(&self.inner),
        }))
    }

    async fn disconnect(&self) -> Result<()> {
        self.inner.disconnect_count.fetch_add(1, Ordering::SeqCst);
        self.simulate_link_loss();
        Ok(())
    }

    async fn disconnected(&self) {
        let mut rx = self.inner.connected.subscribe();
        while *rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

struct MockSession {
    inner: Arc<PeripheralState>,
}

#[async_trait]
impl LinkSession for MockSession {
    async fn service(&self, uuid: Uuid) -> Result<Arc<dyn LinkService>> {
        *lock(&self.inner.resolutions).entry(uuid).or_insert(0) += 1;

        let delay = self.inner.resolution_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if !self.inner.is_up() {
            return Err(Error::NotConnected);
        }

        let failed = self
            .inner
            .pending_service_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(Error::service_not_found(uuid));
        }

        match self.inner.services.get(&uuid) {
            Some(service) => Ok(Arc::clone(service) as Arc<dyn LinkService>),
            None => Err(Error::service_not_found(uuid)),
        }
    }
}

struct MockService {
    uuid: Uuid,
    characteristics: HashMap<Uuid, Arc<MockCharacteristic>>,
}

#[async_trait]
impl LinkService for MockService {
    fn uuid(&self) -> Uuid {
        self.uuid
    }

    async fn characteristic(&self, uuid: Uuid) -> Result<Arc<dyn LinkCharacteristic>> {
        self.characteristics
            .get(&uuid)
            .map(|c| Arc::clone(c) as Arc<dyn LinkCharacteristic>)
            .ok_or_else(|| Error::characteristic_not_found(uuid))
    }
}

/// A mock characteristic.
pub struct MockCharacteristic {
    uuid: Uuid,
    link: watch::Receiver<bool>,
    value: Mutex<Vec<u8>>,
    writes: Mutex<Vec<Vec<u8>>>,
    reject_writes: AtomicBool,
    push_on_subscribe: bool,
    script: Mutex<VecDeque<Vec<u8>>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<Vec<u8>>>>,
    read_count: AtomicU32,
    subscribe_count: AtomicU32,
    unsubscribe_count: AtomicU32,
}

impl std::fmt::Debug for MockCharacteristic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockCharacteristic")
            .field("uuid", &self.uuid)
            .field("value", &*lock(&self.value))
            .finish_non_exhaustive()
    }
}

impl MockCharacteristic {
    fn is_up(&self) -> bool {
        *self.link.borrow()
    }

    /// Current value.
    pub fn value(&self) -> Vec<u8> {
        lock(&self.value).clone()
    }

    /// Replace the current value.
    pub fn set_value(&self, value: &[u8]) {
        *lock(&self.value) = value.to_vec();
    }

    /// Every accepted write, oldest first.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        lock(&self.writes).clone()
    }

    /// Make writes fail with [`Error::WriteFailed`].
    pub fn reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    /// Queue values to deliver to the next subscriber as soon as it subscribes.
    pub fn script(&self, values: Vec<Vec<u8>>) {
        lock(&self.script).extend(values);
    }

    /// Push a value to every current subscriber. Returns how many received it.
    pub fn notify(&self, value: &[u8]) -> usize {
        let mut subscribers = lock(&self.subscribers);
        subscribers.retain(|tx| tx.unbounded_send(value.to_vec()).is_ok());
        subscribers.len()
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = lock(&self.subscribers);
        subscribers.retain(|tx| !tx.is_closed());
        subscribers.len()
    }

    /// How many times notifications were enabled.
    pub fn subscribe_count(&self) -> u32 {
        self.subscribe_count.load(Ordering::SeqCst)
    }

    /// How many times notifications were disabled.
    pub fn unsubscribe_count(&self) -> u32 {
        self.unsubscribe_count.load(Ordering::SeqCst)
    }

    /// How many one-shot reads were made.
    pub fn read_count(&self) -> u32 {
        self.read_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LinkCharacteristic for MockCharacteristic {
    fn uuid(&self) -> Uuid {
        self.uuid
    }

    async fn read(&self) -> Result<Vec<u8>> {
        if !self.is_up() {
            return Err(Error::NotConnected);
        }
        self.read_count.fetch_add(1, Ordering::SeqCst);
        Ok(self.value())
    }

    async fn write(&self, data: &[u8]) -> Result<()> {
        if !self.is_up() {
            return Err(Error::NotConnected);
        }
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(Error::write_failed(self.uuid, "rejected by mock"));
        }
        lock(&self.writes).push(data.to_vec());
        self.set_value(data);
        Ok(())
    }

    async fn subscribe(&self) -> Result<ValueStream> {
        if !self.is_up() {
            return Err(Error::NotConnected);
        }
        self.subscribe_count.fetch_add(1, Ordering::SeqCst);

        let (tx, rx) = mpsc::unbounded();
        let scripted: Vec<Vec<u8>> = lock(&self.script).drain(..).collect();
        if !scripted.is_empty() {
            for value in scripted {
                let _ = tx.unbounded_send(value);
            }
        } else if self.push_on_subscribe {
            let _ = tx.unbounded_send(self.value());
        }
        lock(&self.subscribers).push(tx);

        Ok(Box::pin(rx))
    }

    async fn unsubscribe(&self) -> Result<()> {
        self.unsubscribe_count.fetch_add(1, Ordering::SeqCst);
        lock(&self.subscribers).clear();
        Ok(())
    }
}

/// Builder for [`MockPeripheral`].
#[derive(Debug, Default)]
pub struct MockPeripheralBuilder {
    name: Option<String>,
    id: Option<String>,
    characteristics: Vec<CharacteristicSpec>,
}

#[derive(Debug)]
struct CharacteristicSpec {
    service: Uuid,
    uuid: Uuid,
    value: Vec<u8>,
    push_on_subscribe: bool,
    script: Vec<Vec<u8>>,
}

impl MockPeripheralBuilder {
    /// Advertise no name at all.
    #[must_use]
    pub fn without_name(mut self) -> Self {
        self.name = None;
        self
    }

    /// Set the platform identifier (random by default).
    #[must_use]
    pub fn id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    /// Add a readable/writable characteristic.
    #[must_use]
    pub fn characteristic(mut self, service: Uuid, uuid: Uuid, value: &[u8]) -> Self {
        self.characteristics.push(CharacteristicSpec {
            service,
            uuid,
            value: value.to_vec(),
            push_on_subscribe: false,
            script: Vec::new(),
        });
        self
    }

    /// Add a characteristic that pushes its value as soon as someone subscribes.
    #[must_use]
    pub fn notifying(mut self, service: Uuid, uuid: Uuid, value: &[u8]) -> Self {
        self.characteristics.push(CharacteristicSpec {
            service,
            uuid,
            value: value.to_vec(),
            push_on_subscribe: true,
            script: Vec::new(),
        });
        self
    }

    /// Queue notifications for an already added characteristic.
    #[must_use]
    pub fn script(mut self, service: Uuid, uuid: Uuid, values: Vec<Vec<u8>>) -> Self {
        if let Some(spec) = self
            .characteristics
            .iter_mut()
            .find(|c| c.service == service && c.uuid == uuid)
        {
            spec.script.extend(values);
        }
        self
    }

    /// Build the peripheral.
    pub fn build(self) -> MockPeripheral {
        let (connected, link) = watch::channel(false);

        let mut services: HashMap<Uuid, HashMap<Uuid, Arc<MockCharacteristic>>> = HashMap::new();
        for spec in self.characteristics {
            let characteristic = MockCharacteristic {
                uuid: spec.uuid,
                link: link.clone(),
                value: Mutex::new(spec.value),
                writes: Mutex::new(Vec::new()),
                reject_writes: AtomicBool::new(false),
                push_on_subscribe: spec.push_on_subscribe,
                script: Mutex::new(spec.script.into()),
                subscribers: Mutex::new(Vec::new()),
                read_count: AtomicU32::new(0),
                subscribe_count: AtomicU32::new(0),
                unsubscribe_count: AtomicU32::new(0),
            };
            services
                .entry(spec.service)
                .or_default()
                .insert(spec.uuid, Arc::new(characteristic));
        }

        let services = services
            .into_iter()
            .map(|(uuid, characteristics)| {
                (
                    uuid,
                    Arc::new(MockService {
                        uuid,
                        characteristics,
                    }),
                )
            })
            .collect();

        MockPeripheral {
            inner: Arc::new(PeripheralState {
                name: self.name,
                id: self
                    .id
                    .unwrap_or_else(|| format!("MOCK-{:06X}", rand::random::<u32>() % 0xFFFFFF)),
                connected,
                services,
                connect_count: AtomicU32::new(0),
                disconnect_count: AtomicU32::new(0),
                fail_connect: AtomicBool::new(false),
                pending_service_failures: AtomicU32::new(0),
                resolution_delay_ms: AtomicU64::new(0),
                resolutions: Mutex::new(HashMap::new()),
            }),
        }
    }
}

/// Encode a plausible history record for `index`: one hour apart, max 25.48
/// and min 20.00 degrees.
pub fn history_record_bytes(index: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(mijia_types::HISTORY_RECORD_BYTES);
    buf.put_u32_le(index);
    buf.put_u32_le(1_709_251_200 + index * 3600);
    buf.put_i16_le(2548);
    buf.put_u8(60);
    buf.put_i16_le(2000);
    buf.put_u8(45);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_discover_by_name() {
        let link = MockLink::new()
            .with_peripheral(MockPeripheral::lywsdcgq())
            .with_peripheral(MockPeripheral::lywsd02());
        let request = DiscoveryRequest {
            names: vec!["LYWSD02".into()],
            identifier: None,
            services: Vec::new(),
            timeout: Duration::from_secs(1),
        };
        let handle = link.discover(&request).await.unwrap();
        assert_eq!(handle.name().as_deref(), Some("LYWSD02"));
        assert_eq!(link.discover_count(), 1);
    }

    #[tokio::test]
    async fn test_discover_nothing_in_range() {
        let link = MockLink::new();
        let request = DiscoveryRequest {
            names: vec!["LYWSD02".into()],
            identifier: None,
            services: Vec::new(),
            timeout: Duration::from_secs(1),
        };
        let err = link.discover(&request).await.unwrap_err();
        assert!(matches!(err, Error::DeviceNotFound(_)));
    }

    #[tokio::test]
    async fn test_notify_only_reaches_subscribers() {
        let peripheral = MockPeripheral::lywsd02();
        let session = peripheral.connect().await.unwrap();
        let characteristic = session
            .service(LYWSD02_SERVICE)
            .await
            .unwrap()
            .characteristic(LYWSD02_TEMP_HUM)
            .await
            .unwrap();

        let mock = peripheral
            .characteristic(LYWSD02_SERVICE, LYWSD02_TEMP_HUM)
            .unwrap();
        assert_eq!(mock.notify(&[1, 2, 3]), 0);

        let _values = characteristic.subscribe().await.unwrap();
        assert_eq!(mock.notify(&[1, 2, 3]), 1);

        characteristic.unsubscribe().await.unwrap();
        assert_eq!(mock.notify(&[1, 2, 3]), 0);
    }

    #[test]
    fn test_history_record_bytes_layout() {
        let record = mijia_types::HistoryRecord::from_bytes(&history_record_bytes(2)).unwrap();
        assert_eq!(record.index, 2);
        assert_eq!(record.timestamp, 1_709_251_200 + 7200);
        assert_eq!(record.humidity_max, 60);
        assert_eq!(record.humidity_min, 45);
    }
}
