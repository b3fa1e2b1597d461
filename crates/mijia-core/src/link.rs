//! Peripheral link abstraction.
//!
//! The device layer never talks to a Bluetooth stack directly. It goes
//! through these traits, which the btleplug backend ([`crate::ble`]) and the
//! in-memory [`crate::mock::MockLink`] both implement.
//!
//! The shape mirrors the GATT hierarchy: a [`PeripheralLink`] discovers a
//! [`LinkHandle`], connecting the handle yields a [`LinkSession`], sessions
//! resolve [`LinkService`]s, and services resolve [`LinkCharacteristic`]s.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::Stream;
use uuid::Uuid;

use crate::error::Result;

/// Value-changed events for one characteristic.
pub type ValueStream = Pin<Box<dyn Stream<Item = Vec<u8>> + Send>>;

/// What to look for during discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryRequest {
    /// Advertised names to accept. A peripheral matches if its name equals
    /// any of them.
    pub names: Vec<String>,
    /// Restrict the match to one peripheral, by identifier or exact name.
    pub identifier: Option<String>,
    /// Services the caller will access once connected.
    pub services: Vec<Uuid>,
    /// How long to scan before giving up.
    pub timeout: Duration,
}

impl DiscoveryRequest {
    /// Whether a peripheral with this advertised name and identifier
    /// satisfies the request.
    pub fn matches(&self, name: Option<&str>, id: &str) -> bool {
        let Some(name) = name else {
            return false;
        };
        if !self.names.iter().any(|n| n == name) {
            return false;
        }
        match &self.identifier {
            Some(wanted) => wanted.eq_ignore_ascii_case(id) || wanted == name,
            None => true,
        }
    }
}

/// Entry point to a Bluetooth stack.
#[async_trait]
pub trait PeripheralLink: Send + Sync {
    /// Find a peripheral matching `request`.
    ///
    /// Fails with [`crate::Error::DeviceNotFound`] when nothing matches.
    async fn discover(&self, request: &DiscoveryRequest) -> Result<Arc<dyn LinkHandle>>;
}

/// A discovered peripheral.
#[async_trait]
pub trait LinkHandle: Send + Sync + fmt::Debug {
    /// Advertised local name, if any.
    fn name(&self) -> Option<String>;

    /// Platform identifier (MAC address, or a CoreBluetooth UUID on macOS).
    fn id(&self) -> String;

    /// Whether the platform reports an active link.
    async fn is_connected(&self) -> bool;

    /// Establish the link and discover its services.
    async fn connect(&self) -> Result<Arc<dyn LinkSession>>;

    /// Tear down the link.
    async fn disconnect(&self) -> Result<()>;

    /// Resolves once the link is down. Returns immediately when already
    /// disconnected.
    async fn disconnected(&self);
}

/// An established connection.
#[async_trait]
pub trait LinkSession: Send + Sync {
    /// Resolve a primary service.
    ///
    /// Fails with [`crate::Error::Resolution`] if the service is absent.
    async fn service(&self, uuid: Uuid) -> Result<Arc<dyn LinkService>>;
}

/// A resolved GATT service.
#[async_trait]
pub trait LinkService: Send + Sync {
    /// The service identifier.
    fn uuid(&self) -> Uuid;

    /// Resolve a characteristic within this service.
    ///
    /// Fails with [`crate::Error::Resolution`] if the characteristic is absent.
    async fn characteristic(&self, uuid: Uuid) -> Result<Arc<dyn LinkCharacteristic>>;
}

/// A resolved characteristic.
#[async_trait]
pub trait LinkCharacteristic: Send + Sync {
    /// The characteristic identifier.
    fn uuid(&self) -> Uuid;

    /// One-shot read of the current value.
    async fn read(&self) -> Result<Vec<u8>>;

    /// One-shot write with response.
    ///
    /// Fails with [`crate::Error::WriteFailed`] if the peripheral rejects it.
    async fn write(&self, data: &[u8]) -> Result<()>;

    /// Enable notifications and return the stream of pushed values.
    async fn subscribe(&self) -> Result<ValueStream>;

    /// Disable notifications.
    async fn unsubscribe(&self) -> Result<()>;
}
