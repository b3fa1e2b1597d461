//! Supported sensor models.
//!
//! | Model | Advertised name | Encoding |
//! |-------|-----------------|----------|
//! | LYWSD02 (e-ink clock) | `LYWSD02` | Binary, clock, unit, hourly history |
//! | LYWSDCGQ/01ZM (round display) | `MJ_HT_V1` | Text `T=.. H=..`, standard battery service |
//!
//! [`Sensor`] wraps whichever model was found and exposes its capability
//! table uniformly.

pub mod lywsd02;
pub mod lywsdcgq;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::capabilities::{CapabilityDescriptor, Reading, Value};
use crate::device::{Device, SessionConfig};
use crate::error::{DeviceNotFoundReason, Error, Result};
use crate::link::{DiscoveryRequest, PeripheralLink};

pub use lywsd02::Lywsd02;
pub use lywsdcgq::Lywsdcgq;

/// Static description of a sensor model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    /// Which model this is.
    pub kind: ModelKind,
    /// Human-readable name.
    pub name: &'static str,
    /// Advertised name used as the discovery filter.
    pub filter: &'static str,
    /// Services the model's operations access.
    pub services: &'static [Uuid],
    /// Product image file name.
    pub image: Option<&'static str>,
}

/// The sensor models this crate can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ModelKind {
    /// Xiaomi LYWSD02 e-ink clock thermometer.
    Lywsd02,
    /// Xiaomi MiJia LYWSDCGQ/01ZM.
    Lywsdcgq,
}

impl ModelKind {
    /// Every supported model.
    pub fn all() -> &'static [ModelKind] {
        &[ModelKind::Lywsd02, ModelKind::Lywsdcgq]
    }

    /// Static model description.
    pub fn info(self) -> &'static ModelInfo {
        match self {
            ModelKind::Lywsd02 => &lywsd02::INFO,
            ModelKind::Lywsdcgq => &lywsdcgq::INFO,
        }
    }

    /// The model advertising exactly `name`, if any.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|kind| kind.info().filter == name)
    }

    /// Capability descriptor for this model.
    pub fn descriptor(self) -> &'static CapabilityDescriptor {
        match self {
            ModelKind::Lywsd02 => lywsd02::TABLE.descriptor(),
            ModelKind::Lywsdcgq => lywsdcgq::TABLE.descriptor(),
        }
    }

    /// Discovery request matching any of `kinds`.
    pub fn request_for(kinds: &[ModelKind], config: &SessionConfig) -> DiscoveryRequest {
        let mut services: Vec<Uuid> = Vec::new();
        for kind in kinds {
            for service in kind.info().services {
                if !services.contains(service) {
                    services.push(*service);
                }
            }
        }
        DiscoveryRequest {
            names: kinds.iter().map(|k| k.info().filter.to_string()).collect(),
            identifier: None,
            services,
            timeout: config.discovery_timeout,
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelKind::Lywsd02 => write!(f, "lywsd02"),
            ModelKind::Lywsdcgq => write!(f, "lywsdcgq"),
        }
    }
}

impl FromStr for ModelKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "lywsd02" | "lywsd02mmc" => Ok(ModelKind::Lywsd02),
            "lywsdcgq" | "lywsdcgq/01zm" | "mj_ht_v1" => Ok(ModelKind::Lywsdcgq),
            other => Err(Error::invalid_argument(format!("unknown model {other:?}"))),
        }
    }
}

/// Decode a one-byte percentage.
pub(crate) fn first_byte(data: &[u8]) -> Result<u8> {
    data.first()
        .copied()
        .ok_or_else(|| Error::invalid_reading(1, data.len()))
}

/// A sample value rounded to the sensor's two-decimal resolution.
pub(crate) fn rounded(value: f32) -> Value {
    Value::Number((f64::from(value) * 100.0).round() / 100.0)
}

/// Any supported sensor.
#[derive(Debug)]
pub enum Sensor {
    /// An LYWSD02.
    Lywsd02(Lywsd02),
    /// An LYWSDCGQ/01ZM.
    Lywsdcgq(Lywsdcgq),
}

impl Sensor {
    /// An unbound sensor of the given model.
    pub fn new(kind: ModelKind, link: Arc<dyn PeripheralLink>, config: SessionConfig) -> Self {
        match kind {
            ModelKind::Lywsd02 => Sensor::Lywsd02(Lywsd02::new(link, config)),
            ModelKind::Lywsdcgq => Sensor::Lywsdcgq(Lywsdcgq::new(link, config)),
        }
    }

    /// Discover any supported sensor with one multi-filter request and bind it
    /// to the model whose filter it matches.
    ///
    /// `identifier` restricts discovery to one address or name.
    #[tracing::instrument(level = "info", skip(link, config))]
    pub async fn request_any(
        link: Arc<dyn PeripheralLink>,
        config: SessionConfig,
        identifier: Option<&str>,
    ) -> Result<Self> {
        let mut request = ModelKind::request_for(ModelKind::all(), &config);
        request.identifier = identifier.map(str::to_string);
        let handle = link.discover(&request).await?;

        for kind in ModelKind::all() {
            let sensor = Sensor::new(*kind, Arc::clone(&link), config.clone());
            if sensor.device().is_suitable_device(handle.as_ref()) {
                info!(model = %kind, id = %handle.id(), "Matched sensor model");
                sensor.device().set_handle(handle);
                return Ok(sensor);
            }
        }

        Err(Error::DeviceNotFound(DeviceNotFoundReason::NoMatch {
            filters: request.names,
        }))
    }

    /// Which model this is.
    pub fn kind(&self) -> ModelKind {
        self.device().info().kind
    }

    /// Human-readable model name.
    pub fn name(&self) -> &'static str {
        self.device().info().name
    }

    /// Product image file name.
    pub fn image(&self) -> Option<&'static str> {
        self.device().info().image
    }

    /// The underlying device.
    pub fn device(&self) -> &Device {
        match self {
            Sensor::Lywsd02(m) => m.device(),
            Sensor::Lywsdcgq(m) => m.device(),
        }
    }

    /// What this sensor can read and write.
    pub fn descriptor(&self) -> &'static CapabilityDescriptor {
        self.kind().descriptor()
    }

    /// Run a read operation by name.
    pub async fn read(&self, operation: &str) -> Result<Reading> {
        match self {
            Sensor::Lywsd02(m) => lywsd02::TABLE.invoke_read(m, operation).await,
            Sensor::Lywsdcgq(m) => lywsdcgq::TABLE.invoke_read(m, operation).await,
        }
    }

    /// Run a write operation by name.
    pub async fn write(&self, operation: &str, value: Value) -> Result<()> {
        match self {
            Sensor::Lywsd02(m) => lywsd02::TABLE.invoke_write(m, operation, value).await,
            Sensor::Lywsdcgq(m) => lywsdcgq::TABLE.invoke_write(m, operation, value).await,
        }
    }

    /// Discover if unbound, then connect.
    pub async fn request_and_connect(&self) -> Result<()> {
        self.device().request_and_connect().await
    }

    /// Disconnect and clear the session.
    pub async fn disconnect(&self) -> Result<()> {
        self.device().disconnect().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rounded_hides_float_noise() {
        assert_eq!(rounded(23.26), Value::Number(23.26));
        assert_eq!(rounded(-4.5), Value::Number(-4.5));
    }

    #[test]
    fn test_first_byte_requires_payload() {
        assert_eq!(first_byte(&[87, 1]).unwrap(), 87);
        assert!(first_byte(&[]).unwrap_err().is_decode());
    }

    #[test]
    fn test_from_name_is_exact() {
        assert_eq!(ModelKind::from_name("LYWSD02"), Some(ModelKind::Lywsd02));
        assert_eq!(ModelKind::from_name("MJ_HT_V1"), Some(ModelKind::Lywsdcgq));
        assert_eq!(ModelKind::from_name("LYWSD03MMC"), None);
        assert_eq!(ModelKind::from_name("lywsd02"), None);
    }

    #[test]
    fn test_parse_model_kind() {
        assert_eq!("LYWSD02".parse::<ModelKind>().unwrap(), ModelKind::Lywsd02);
        assert_eq!("lywsdcgq".parse::<ModelKind>().unwrap(), ModelKind::Lywsdcgq);
        assert!("lywsd03mmc".parse::<ModelKind>().is_err());
        for kind in ModelKind::all() {
            assert_eq!(kind.to_string().parse::<ModelKind>().unwrap(), *kind);
        }
    }

    #[test]
    fn test_multi_filter_request_deduplicates_services() {
        let request = ModelKind::request_for(ModelKind::all(), &SessionConfig::default());
        assert_eq!(request.names, vec!["LYWSD02", "MJ_HT_V1"]);
        assert_eq!(request.services.len(), 3);
    }

    #[test]
    fn test_descriptors_match_tables() {
        let lywsd02 = ModelKind::Lywsd02.descriptor();
        let ops: Vec<_> = lywsd02.read.iter().map(|r| r.operation).collect();
        assert_eq!(ops, ["getTime", "getTempAndHum", "getBattery", "getTempUnit"]);
        let ops: Vec<_> = lywsd02.write.iter().map(|w| w.operation).collect();
        assert_eq!(ops, ["setTime", "setTempUnit"]);

        let lywsdcgq = ModelKind::Lywsdcgq.descriptor();
        assert_eq!(lywsdcgq.read.len(), 2);
        assert!(lywsdcgq.write.is_empty());
        assert_eq!(
            lywsdcgq.read_op("getTempAndHum").and_then(|r| r.field("temp")).and_then(|f| f.unit),
            Some("°C")
        );
    }
}
