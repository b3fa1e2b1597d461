//! Xiaomi MiJia LYWSDCGQ/01ZM round-display thermometer.
//!
//! Samples are pushed as ASCII text (`T=29.0 H=52.3`); the battery level comes
//! from the standard battery service.

use std::sync::{Arc, LazyLock};

use futures::future::BoxFuture;

use mijia_types::TempAndHumidity;
use mijia_types::uuid::{BATTERY_LEVEL, BATTERY_SERVICE, LYWSDCGQ_SERVICE, LYWSDCGQ_TEMP_HUM};

use crate::capabilities::{CapabilityTable, FieldDescriptor, Reading, Value, reading};
use crate::device::{Device, SessionConfig};
use crate::error::Result;
use crate::link::PeripheralLink;
use crate::models::{ModelInfo, ModelKind, first_byte, rounded};

/// Static model description.
pub static INFO: ModelInfo = ModelInfo {
    kind: ModelKind::Lywsdcgq,
    name: "Xiaomi MiJia LYWSDCGQ/01ZM",
    filter: "MJ_HT_V1",
    services: &[LYWSDCGQ_SERVICE, BATTERY_SERVICE],
    image: Some("lywsdcgq.jpg"),
};

/// Operation table for [`Lywsdcgq`].
pub static TABLE: LazyLock<CapabilityTable<Lywsdcgq>> = LazyLock::new(|| {
    CapabilityTable::new()
        .read(
            "getTempAndHum",
            vec![
                FieldDescriptor::number("temp", "Temperature", Some("°C")),
                FieldDescriptor::number("hum", "Humidity", Some("%")),
            ],
            read_temp_and_hum,
        )
        .read(
            "getBattery",
            vec![FieldDescriptor::number("batt", "Battery", Some("%"))],
            read_battery,
        )
});

/// An LYWSDCGQ/01ZM sensor.
#[derive(Debug)]
pub struct Lywsdcgq {
    device: Device,
}

impl Lywsdcgq {
    /// An unbound LYWSDCGQ/01ZM.
    pub fn new(link: Arc<dyn PeripheralLink>, config: SessionConfig) -> Self {
        Self {
            device: Device::new(&INFO, link, config),
        }
    }

    /// The underlying device.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Wait for the next pushed sample and parse its text payload.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn get_temp_and_hum(&self) -> Result<TempAndHumidity> {
        let data = self
            .device
            .await_notified_value(LYWSDCGQ_SERVICE, LYWSDCGQ_TEMP_HUM)
            .await?;
        Ok(TempAndHumidity::from_text(&data)?)
    }

    /// Read the battery percentage from the standard battery service.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn get_battery(&self) -> Result<u8> {
        let data = self
            .device
            .read_characteristic(BATTERY_SERVICE, BATTERY_LEVEL)
            .await?;
        first_byte(&data)
    }
}

fn read_temp_and_hum(m: &Lywsdcgq) -> BoxFuture<'_, Result<Reading>> {
    Box::pin(async move {
        let sample = m.get_temp_and_hum().await?;
        let mut out = reading("temp", rounded(sample.temperature));
        out.insert("hum".to_string(), rounded(sample.humidity));
        Ok(out)
    })
}

fn read_battery(m: &Lywsdcgq) -> BoxFuture<'_, Result<Reading>> {
    Box::pin(async move {
        let battery = m.get_battery().await?;
        Ok(reading("batt", Value::Number(f64::from(battery))))
    })
}
