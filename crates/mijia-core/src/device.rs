//! Device lifecycle and characteristic access.
//!
//! A [`Device`] binds one peripheral for one sensor model and owns at most one
//! live session. The session holds the service cache and a cancellation token;
//! both are discarded on [`Device::disconnect`] or when the link drops, so no
//! stale handle survives a reconnect and no notification wait outlives the
//! link it was waiting on.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::OnceCell;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use time::UtcOffset;

use crate::error::{ConnectionFailureReason, Error, Result};
use crate::link::{
    DiscoveryRequest, LinkCharacteristic, LinkHandle, LinkService, LinkSession, PeripheralLink,
};
use crate::models::ModelInfo;
use crate::notify::NotificationStream;

/// Default timeout for BLE characteristic read operations.
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for BLE characteristic write operations.
const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for BLE connection operations.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default timeout for discovery.
const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for session timeouts and time handling.
///
/// Notification waits are unbounded unless
/// [`notification_timeout`](Self::notification_timeout) is set.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use mijia_core::SessionConfig;
///
/// let config = SessionConfig::default()
///     .connection_timeout(Duration::from_secs(20))
///     .notification_timeout(Duration::from_secs(30));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Timeout for establishing a BLE connection.
    pub connection_timeout: Duration,
    /// Timeout for BLE read operations.
    pub read_timeout: Duration,
    /// Timeout for BLE write operations.
    pub write_timeout: Duration,
    /// Timeout for discovering a peripheral.
    pub discovery_timeout: Duration,
    /// Optional deadline for each awaited notification.
    pub notification_timeout: Option<Duration>,
    /// Timezone used for clock reads and writes. Defaults to the system offset.
    pub local_offset: Option<UtcOffset>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connection_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            notification_timeout: None,
            local_offset: None,
        }
    }
}

impl SessionConfig {
    /// Create a new session config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config for challenging RF environments.
    ///
    /// Uses longer timeouts to accommodate signal interference,
    /// thick walls, or long distances.
    pub fn challenging_environment() -> Self {
        Self {
            connection_timeout: Duration::from_secs(25),
            read_timeout: Duration::from_secs(15),
            write_timeout: Duration::from_secs(15),
            discovery_timeout: Duration::from_secs(20),
            ..Self::default()
        }
    }

    /// Create a config for fast, reliable environments.
    pub fn fast() -> Self {
        Self {
            connection_timeout: Duration::from_secs(8),
            read_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(5),
            discovery_timeout: Duration::from_secs(5),
            ..Self::default()
        }
    }

    /// Set the connection timeout.
    #[must_use]
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set the read timeout.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the write timeout.
    #[must_use]
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the discovery timeout.
    #[must_use]
    pub fn discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    /// Bound every notification wait.
    #[must_use]
    pub fn notification_timeout(mut self, timeout: Duration) -> Self {
        self.notification_timeout = Some(timeout);
        self
    }

    /// Use a fixed timezone instead of the system one.
    #[must_use]
    pub fn local_offset(mut self, offset: UtcOffset) -> Self {
        self.local_offset = Some(offset);
        self
    }

    /// Validate the config and return an error if invalid.
    pub fn validate(&self) -> Result<()> {
        let timeouts = [
            ("connection_timeout", Some(self.connection_timeout)),
            ("read_timeout", Some(self.read_timeout)),
            ("write_timeout", Some(self.write_timeout)),
            ("discovery_timeout", Some(self.discovery_timeout)),
            ("notification_timeout", self.notification_timeout),
        ];
        for (name, value) in timeouts {
            if value.is_some_and(|d| d.is_zero()) {
                return Err(Error::invalid_config(format!("{name} must be > 0")));
            }
        }
        Ok(())
    }

    /// The timezone to use for clock conversions.
    ///
    /// Falls back to UTC when the system offset cannot be determined.
    pub fn resolved_local_offset(&self) -> UtcOffset {
        if let Some(offset) = self.local_offset {
            return offset;
        }
        UtcOffset::current_local_offset().unwrap_or_else(|_| {
            warn!("Could not determine local UTC offset, using UTC");
            UtcOffset::UTC
        })
    }
}

/// Parse a service or characteristic identifier.
///
/// Accepts full UUIDs in any case and 16- or 32-bit SIG short forms, with
/// or without a `0x` prefix. The result always displays in lowercase.
///
/// ```
/// use mijia_core::device::parse_id;
/// use mijia_core::uuids::BATTERY_SERVICE;
///
/// assert_eq!(parse_id("180F").unwrap(), BATTERY_SERVICE);
/// assert_eq!(parse_id("0x180f").unwrap(), BATTERY_SERVICE);
/// assert_eq!(parse_id("0000180F-0000-1000-8000-00805F9B34FB").unwrap(), BATTERY_SERVICE);
/// ```
pub fn parse_id(id: &str) -> Result<Uuid> {
    let normalized = id.trim().to_ascii_lowercase();
    let short = normalized.strip_prefix("0x").unwrap_or(&normalized);

    if (1..=8).contains(&short.len()) && short.chars().all(|c| c.is_ascii_hexdigit()) {
        let value = u32::from_str_radix(short, 16)
            .map_err(|e| Error::invalid_argument(format!("invalid identifier {id:?}: {e}")))?;
        let base = crate::uuids::BLUETOOTH_BASE.as_u128();
        return Ok(Uuid::from_u128(base | (u128::from(value) << 96)));
    }

    Uuid::parse_str(&normalized)
        .map_err(|e| Error::invalid_argument(format!("invalid identifier {id:?}: {e}")))
}

type ServiceCell = Arc<OnceCell<Arc<dyn LinkService>>>;

/// One connection's worth of state.
struct Session {
    link: Arc<dyn LinkSession>,
    services: Mutex<HashMap<Uuid, ServiceCell>>,
    cancel: CancellationToken,
}

impl Session {
    fn new(link: Arc<dyn LinkSession>) -> Self {
        Self {
            link,
            services: Mutex::new(HashMap::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Resolve a service, at most once per identifier for this session.
    ///
    /// Concurrent callers for the same identifier wait on the first
    /// resolution. A failed resolution leaves the entry empty.
    async fn service(&self, uuid: Uuid) -> Result<Arc<dyn LinkService>> {
        let cell = {
            let mut services = self.services.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(services.entry(uuid).or_default())
        };

        if let Some(service) = cell.get() {
            debug!(service = %uuid, "Service cache hit");
            return Ok(Arc::clone(service));
        }

        let service = cell
            .get_or_try_init(|| async {
                debug!(service = %uuid, "Resolving service");
                self.link.service(uuid).await
            })
            .await?;
        Ok(Arc::clone(service))
    }

    fn cached_services(&self) -> usize {
        self.services
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }

    fn close(&self) {
        self.cancel.cancel();
        self.services
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Run `fut` unless the session ends first.
    async fn guarded<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::NotConnected),
            result = fut => result,
        }
    }
}

/// One sensor peripheral and its connection session.
///
/// # Note on Clone
///
/// This struct intentionally does not implement `Clone`. It owns the service
/// cache of its session; wrap it in `Arc` to share it across tasks.
///
/// # Cleanup
///
/// Call [`Device::disconnect`] before dropping a connected device. A device
/// dropped while connected logs a warning and disconnects in the background.
pub struct Device {
    info: &'static ModelInfo,
    link: Arc<dyn PeripheralLink>,
    config: SessionConfig,
    handle: RwLock<Option<Arc<dyn LinkHandle>>>,
    session: RwLock<Option<Arc<Session>>>,
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("model", &self.info.name)
            .field("handle", &self.bound_handle())
            .field("has_session", &self.current_session().is_some())
            .finish_non_exhaustive()
    }
}

impl Device {
    /// Create an unbound device for `info` using `link` for discovery.
    pub fn new(info: &'static ModelInfo, link: Arc<dyn PeripheralLink>, config: SessionConfig) -> Self {
        Self {
            info,
            link,
            config,
            handle: RwLock::new(None),
            session: RwLock::new(None),
        }
    }

    /// The model this device was created for.
    pub fn info(&self) -> &'static ModelInfo {
        self.info
    }

    /// The session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Whether `handle` advertises exactly this model's filter name.
    pub fn is_suitable_device(&self, handle: &dyn LinkHandle) -> bool {
        handle.name().as_deref() == Some(self.info.filter)
    }

    /// Whether a peripheral is bound and its link is up.
    pub async fn is_connected(&self) -> bool {
        let handle = self.bound_handle();
        match handle {
            Some(handle) => handle.is_connected().await,
            None => false,
        }
    }

    /// Discover a peripheral for this model and bind it.
    #[tracing::instrument(level = "info", skip(self), fields(model = self.info.name))]
    pub async fn request(&self) -> Result<()> {
        let request = DiscoveryRequest {
            names: vec![self.info.filter.to_string()],
            identifier: None,
            services: self.info.services.to_vec(),
            timeout: self.config.discovery_timeout,
        };
        let handle = self.link.discover(&request).await?;
        self.set_handle(handle);
        Ok(())
    }

    /// Bind an already discovered peripheral, dropping any previous session.
    pub fn set_handle(&self, handle: Arc<dyn LinkHandle>) {
        info!(id = %handle.id(), name = ?handle.name(), "Bound device");
        if let Some(old) = self.take_session() {
            old.close();
        }
        *self.handle.write().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    /// Discover if nothing is bound, then connect if not connected.
    ///
    /// Calling this on a connected device does nothing.
    pub async fn request_and_connect(&self) -> Result<()> {
        if self.bound_handle().is_none() {
            self.request().await?;
        }
        if !self.is_connected().await || self.live_session().is_err() {
            self.connect().await?;
        }
        Ok(())
    }

    /// Connect the bound peripheral and start a fresh session.
    #[tracing::instrument(level = "info", skip(self), fields(model = self.info.name))]
    pub async fn connect(&self) -> Result<()> {
        let handle = self
            .bound_handle()
            .ok_or_else(|| Error::connection_failed(None, ConnectionFailureReason::NoHandle))?;

        info!("Connecting to device...");
        let link = timeout(self.config.connection_timeout, handle.connect())
            .await
            .map_err(|_| {
                Error::connection_failed(Some(handle.id()), ConnectionFailureReason::Timeout)
            })?
            .map_err(|e| match e {
                Error::ConnectionFailed { .. } => e,
                other => Error::connection_failed(
                    Some(handle.id()),
                    ConnectionFailureReason::BleError(other.to_string()),
                ),
            })?;
        info!("Connected!");

        let session = Arc::new(Session::new(link));
        if let Some(old) = self.replace_session(Arc::clone(&session)) {
            old.close();
        }

        // Link loss ends the session so pending waits fail instead of hanging.
        let token = session.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = handle.disconnected() => {
                    info!(id = %handle.id(), "Link dropped");
                    token.cancel();
                }
            }
        });

        Ok(())
    }

    /// Disconnect and clear the service cache.
    ///
    /// Safe to call when already disconnected; the cache is cleared either way.
    #[tracing::instrument(level = "info", skip(self), fields(model = self.info.name))]
    pub async fn disconnect(&self) -> Result<()> {
        if let Some(session) = self.take_session() {
            session.close();
        }

        let handle = self.bound_handle();
        if let Some(handle) = handle
            && handle.is_connected().await
        {
            info!("Disconnecting from device...");
            handle.disconnect().await?;
        }
        Ok(())
    }

    /// The bound peripheral's advertised name.
    pub fn device_name(&self) -> Result<Option<String>> {
        self.bound_handle()
            .map(|handle| handle.name())
            .ok_or(Error::NoDevice)
    }

    /// The bound peripheral's platform identifier.
    pub fn device_id(&self) -> Result<String> {
        self.bound_handle()
            .map(|handle| handle.id())
            .ok_or(Error::NoDevice)
    }

    /// Number of services resolved in the current session.
    pub fn cached_service_count(&self) -> usize {
        self.current_session()
            .map(|session| session.cached_services())
            .unwrap_or(0)
    }

    /// Resolve a characteristic within a service.
    ///
    /// The service is resolved at most once per session.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn characteristic(
        &self,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<Arc<dyn LinkCharacteristic>> {
        let session = self.live_session()?;
        Self::resolve(&session, service, characteristic).await
    }

    /// Read a characteristic value.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn read_characteristic(&self, service: Uuid, characteristic: Uuid) -> Result<Vec<u8>> {
        let session = self.live_session()?;
        let target = Self::resolve(&session, service, characteristic).await?;
        let data = timeout(self.config.read_timeout, session.guarded(target.read()))
            .await
            .map_err(|_| {
                Error::timeout(
                    format!("read characteristic {}", characteristic),
                    self.config.read_timeout,
                )
            })??;
        debug!(len = data.len(), "Read value");
        Ok(data)
    }

    /// Write a characteristic value with response.
    #[tracing::instrument(level = "debug", skip(self, data), fields(len = data.len()))]
    pub async fn write_characteristic(
        &self,
        service: Uuid,
        characteristic: Uuid,
        data: &[u8],
    ) -> Result<()> {
        let session = self.live_session()?;
        let target = Self::resolve(&session, service, characteristic).await?;
        timeout(self.config.write_timeout, session.guarded(target.write(data)))
            .await
            .map_err(|_| {
                Error::timeout(
                    format!("write characteristic {}", characteristic),
                    self.config.write_timeout,
                )
            })??;
        Ok(())
    }

    /// Subscribe, take the first pushed value, then unsubscribe.
    ///
    /// The subscription is released whether or not a value arrives.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn await_notified_value(&self, service: Uuid, characteristic: Uuid) -> Result<Vec<u8>> {
        let mut stream = self.open_notification_stream(service, characteristic).await?;
        let result = stream.next_value().await;
        if let Err(e) = stream.stop().await {
            debug!(error = %e, "Unsubscribe after single notification failed");
        }
        result
    }

    /// Subscribe and return every subsequent pushed value until stopped.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn open_notification_stream(
        &self,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<NotificationStream> {
        let session = self.live_session()?;
        let target = Self::resolve(&session, service, characteristic).await?;
        let values = session.guarded(target.subscribe()).await?;
        Ok(NotificationStream::new(
            target,
            values,
            session.cancel.clone(),
            self.config.notification_timeout,
        ))
    }

    async fn resolve(
        session: &Session,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<Arc<dyn LinkCharacteristic>> {
        let resolved = session.guarded(session.service(service)).await?;
        session.guarded(resolved.characteristic(characteristic)).await
    }

    fn bound_handle(&self) -> Option<Arc<dyn LinkHandle>> {
        self.handle
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn current_session(&self) -> Option<Arc<Session>> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn take_session(&self) -> Option<Arc<Session>> {
        self.session
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn replace_session(&self, session: Arc<Session>) -> Option<Arc<Session>> {
        self.session
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(session)
    }

    /// The current session, discarding it if the link has dropped.
    fn live_session(&self) -> Result<Arc<Session>> {
        let session = self.current_session().ok_or(Error::NotConnected)?;
        if session.cancel.is_cancelled() {
            debug!("Discarding session of dropped link");
            let mut slot = self.session.write().unwrap_or_else(PoisonError::into_inner);
            if slot.as_ref().is_some_and(|s| Arc::ptr_eq(s, &session)) {
                *slot = None;
            }
            drop(slot);
            session.close();
            return Err(Error::NotConnected);
        }
        Ok(session)
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        let Some(session) = self.take_session() else {
            return;
        };
        session.close();

        warn!(
            model = self.info.name,
            "Device dropped without calling disconnect() - performing best-effort cleanup. \
             For reliable cleanup, call device.disconnect().await before dropping."
        );

        let Some(handle) = self.bound_handle() else {
            return;
        };
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                if let Err(e) = handle.disconnect().await {
                    debug!(
                        id = %handle.id(),
                        error = %e,
                        "Best-effort disconnect failed (device may already be disconnected)"
                    );
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_id_short_forms() {
        let battery = crate::uuids::BATTERY_LEVEL;
        assert_eq!(parse_id("2a19").unwrap(), battery);
        assert_eq!(parse_id("0x2A19").unwrap(), battery);
        assert_eq!(parse_id(" 00002A19 ").unwrap(), battery);
    }

    #[test]
    fn test_parse_id_full_uuid_is_case_insensitive() {
        let upper = parse_id("EBE0CCB0-7A0A-4B0C-8A1A-6FF2997DA3A6").unwrap();
        assert_eq!(upper, crate::uuids::LYWSD02_SERVICE);
        assert_eq!(upper.to_string(), "ebe0ccb0-7a0a-4b0c-8a1a-6ff2997da3a6");
    }

    #[test]
    fn test_parse_id_rejects_garbage() {
        assert!(matches!(parse_id("not-a-uuid"), Err(Error::InvalidArgument(_))));
        assert!(matches!(parse_id(""), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_session_config_validate() {
        assert!(SessionConfig::default().validate().is_ok());
        assert!(SessionConfig::fast().validate().is_ok());
        assert!(SessionConfig::challenging_environment().validate().is_ok());

        let err = SessionConfig::default()
            .read_timeout(Duration::ZERO)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("read_timeout"));

        let err = SessionConfig::default()
            .notification_timeout(Duration::ZERO)
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_session_config_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.connection_timeout, Duration::from_secs(15));
        assert_eq!(config.notification_timeout, None);
        assert_eq!(
            config
                .local_offset(UtcOffset::from_hms(2, 0, 0).unwrap())
                .resolved_local_offset(),
            UtcOffset::from_hms(2, 0, 0).unwrap()
        );
    }
}
