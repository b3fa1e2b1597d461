//! btleplug backend for the [`crate::link`] traits.
//!
//! ```no_run
//! use std::sync::Arc;
//! use mijia_core::{BleLink, Sensor, SessionConfig};
//!
//! # async fn example() -> mijia_core::Result<()> {
//! let sensor = Sensor::request_any(Arc::new(BleLink::new()), SessionConfig::default(), None).await?;
//! sensor.request_and_connect().await?;
//! println!("{:?}", sensor.read("getBattery").await?);
//! sensor.disconnect().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, Characteristic, Peripheral as _, Service, WriteType,
};
use btleplug::platform::{Adapter, Peripheral};
use futures::StreamExt;
use futures::future;
use tokio::sync::OnceCell;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::link::{
    DiscoveryRequest, LinkCharacteristic, LinkHandle, LinkService, LinkSession, PeripheralLink,
    ValueStream,
};
use crate::scan::{find_matching, get_adapter};
use crate::util::{create_identifier, format_peripheral_id};

/// A [`PeripheralLink`] over the first system Bluetooth adapter.
///
/// The adapter is opened on first discovery and reused afterwards.
#[derive(Debug, Default)]
pub struct BleLink {
    adapter: OnceCell<Adapter>,
}

impl BleLink {
    /// A link that opens the default adapter lazily.
    pub fn new() -> Self {
        Self::default()
    }

    /// A link over a specific adapter.
    pub fn with_adapter(adapter: Adapter) -> Self {
        Self {
            adapter: OnceCell::new_with(Some(adapter)),
        }
    }

    async fn adapter(&self) -> Result<&Adapter> {
        self.adapter.get_or_try_init(get_adapter).await
    }
}

#[async_trait]
impl PeripheralLink for BleLink {
    async fn discover(&self, request: &DiscoveryRequest) -> Result<Arc<dyn LinkHandle>> {
        let adapter = self.adapter().await?;
        let peripheral = find_matching(adapter, request).await?;

        let properties = peripheral.properties().await?;
        let name = properties.as_ref().and_then(|p| p.local_name.clone());
        let id = properties
            .as_ref()
            .map(|p| create_identifier(&p.address.to_string(), &peripheral.id()))
            .unwrap_or_else(|| format_peripheral_id(&peripheral.id()));

        Ok(Arc::new(BleHandle {
            adapter: adapter.clone(),
            peripheral,
            name,
            id,
        }))
    }
}

/// A discovered btleplug peripheral.
#[derive(Debug)]
pub struct BleHandle {
    adapter: Adapter,
    peripheral: Peripheral,
    name: Option<String>,
    id: String,
}

#[async_trait]
impl LinkHandle for BleHandle {
    fn name(&self) -> Option<String> {
        self.name.clone()
    }

    fn id(&self) -> String {
        self.id.clone()
    }

    async fn is_connected(&self) -> bool {
        self.peripheral.is_connected().await.unwrap_or(false)
    }

    async fn connect(&self) -> Result<Arc<dyn LinkSession>> {
        if !self.is_connected().await {
            self.peripheral.connect().await?;
        }
        self.peripheral.discover_services().await?;
        debug!("Found {} services", self.peripheral.services().len());
        Ok(Arc::new(BleSession {
            peripheral: self.peripheral.clone(),
        }))
    }

    async fn disconnect(&self) -> Result<()> {
        self.peripheral.disconnect().await?;
        Ok(())
    }

    async fn disconnected(&self) {
        // Subscribe before checking so a drop in between is not missed.
        let events = self.adapter.events().await;
        if !self.is_connected().await {
            return;
        }
        let mut events = match events {
            Ok(events) => events,
            Err(e) => {
                warn!(error = %e, "Adapter events unavailable, disconnects will go unnoticed");
                return future::pending().await;
            }
        };
        let id = self.peripheral.id();
        while let Some(event) = events.next().await {
            if let CentralEvent::DeviceDisconnected(gone) = event
                && gone == id
            {
                return;
            }
        }
    }
}

struct BleSession {
    peripheral: Peripheral,
}

#[async_trait]
impl LinkSession for BleSession {
    async fn service(&self, uuid: Uuid) -> Result<Arc<dyn LinkService>> {
        let service = self
            .peripheral
            .services()
            .into_iter()
            .find(|s| s.uuid == uuid)
            .ok_or_else(|| Error::service_not_found(uuid))?;
        Ok(Arc::new(BleService {
            peripheral: self.peripheral.clone(),
            service,
        }))
    }
}

struct BleService {
    peripheral: Peripheral,
    service: Service,
}

#[async_trait]
impl LinkService for BleService {
    fn uuid(&self) -> Uuid {
        self.service.uuid
    }

    async fn characteristic(&self, uuid: Uuid) -> Result<Arc<dyn LinkCharacteristic>> {
        let characteristic = self
            .service
            .characteristics
            .iter()
            .find(|c| c.uuid == uuid)
            .cloned()
            .ok_or_else(|| Error::characteristic_not_found(uuid))?;
        Ok(Arc::new(BleCharacteristic {
            peripheral: self.peripheral.clone(),
            characteristic,
        }))
    }
}

struct BleCharacteristic {
    peripheral: Peripheral,
    characteristic: Characteristic,
}

#[async_trait]
impl LinkCharacteristic for BleCharacteristic {
    fn uuid(&self) -> Uuid {
        self.characteristic.uuid
    }

    async fn read(&self) -> Result<Vec<u8>> {
        Ok(self.peripheral.read(&self.characteristic).await?)
    }

    async fn write(&self, data: &[u8]) -> Result<()> {
        self.peripheral
            .write(&self.characteristic, data, WriteType::WithResponse)
            .await
            .map_err(|e| Error::write_failed(self.characteristic.uuid, e.to_string()))
    }

    async fn subscribe(&self) -> Result<ValueStream> {
        // The notification stream is shared by all characteristics of the
        // peripheral; open it first so the first pushed value is kept.
        let notifications = self.peripheral.notifications().await?;
        self.peripheral.subscribe(&self.characteristic).await?;

        let uuid = self.characteristic.uuid;
        Ok(Box::pin(notifications.filter_map(move |n| {
            future::ready((n.uuid == uuid).then_some(n.value))
        })))
    }

    async fn unsubscribe(&self) -> Result<()> {
        self.peripheral.unsubscribe(&self.characteristic).await?;
        Ok(())
    }
}
