//! Xiaomi LYWSD02 e-ink clock thermometer.
//!
//! Everything lives in one vendor service. Readings are binary; the clock,
//! display unit and hourly history are exposed as separate characteristics.

use std::sync::{Arc, LazyLock};

use futures::future::BoxFuture;
use time::OffsetDateTime;
use tracing::{debug, info};

use mijia_types::uuid::{
    LYWSD02_BATTERY, LYWSD02_HISTORY, LYWSD02_HISTORY_INDEX, LYWSD02_LAST_HOUR, LYWSD02_SERVICE,
    LYWSD02_TEMP_HUM, LYWSD02_TIME, LYWSD02_UNIT,
};
use mijia_types::{DeviceClock, HistoryIndex, HistoryRecord, TempAndHumidity, TemperatureUnit};

use crate::capabilities::{CapabilityTable, FieldDescriptor, Reading, ScalarType, Value, reading};
use crate::device::{Device, SessionConfig};
use crate::error::{Error, Result};
use crate::link::PeripheralLink;
use crate::models::{ModelInfo, ModelKind, first_byte, rounded};
use crate::notify::NotificationStream;

/// Static model description.
pub static INFO: ModelInfo = ModelInfo {
    kind: ModelKind::Lywsd02,
    name: "Xiaomi Temperature and Humidity Monitor LYWSD02",
    filter: "LYWSD02",
    services: &[LYWSD02_SERVICE],
    image: Some("lywsd02mmc.jpg"),
};

const UNITS: &[&str] = &["C", "F"];

/// Operation table for [`Lywsd02`].
pub static TABLE: LazyLock<CapabilityTable<Lywsd02>> = LazyLock::new(|| {
    CapabilityTable::new()
        .read("getTime", vec![FieldDescriptor::date("time", "Time")], read_time)
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
        .read(
            "getTempUnit",
            vec![FieldDescriptor::enumeration("tunit", "Temperature Unit", UNITS)],
            read_temp_unit,
        )
        .write("setTime", "Time", ScalarType::Date, None, write_time)
        .write(
            "setTempUnit",
            "Temperature Unit",
            ScalarType::Enum,
            Some(UNITS),
            write_temp_unit,
        )
});

/// An LYWSD02 sensor.
#[derive(Debug)]
pub struct Lywsd02 {
    device: Device,
}

impl Lywsd02 {
    /// An unbound LYWSD02.
    pub fn new(link: Arc<dyn PeripheralLink>, config: SessionConfig) -> Self {
        Self {
            device: Device::new(&INFO, link, config),
        }
    }

    /// The underlying device.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Read the clock, expressed in the local timezone.
    ///
    /// The stored time is shifted by the difference between the timezone it
    /// was written with and the local one.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn get_time(&self) -> Result<OffsetDateTime> {
        let data = self
            .device
            .read_characteristic(LYWSD02_SERVICE, LYWSD02_TIME)
            .await?;
        let clock = DeviceClock::from_bytes(&data)?;
        Ok(clock.to_local(self.device.config().resolved_local_offset()))
    }

    /// Set the clock to `time`, or to now when `None`.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn set_time(&self, time: Option<OffsetDateTime>) -> Result<()> {
        let time = time.unwrap_or_else(OffsetDateTime::now_utc);
        let clock = DeviceClock::from_datetime(time, self.device.config().resolved_local_offset())?;
        info!(timestamp = clock.timestamp, tz = clock.tz_offset_hours, "Setting clock");
        self.device
            .write_characteristic(LYWSD02_SERVICE, LYWSD02_TIME, &clock.to_bytes())
            .await
    }

    /// Wait for the next pushed temperature/humidity sample.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn get_temp_and_hum(&self) -> Result<TempAndHumidity> {
        let data = self
            .device
            .await_notified_value(LYWSD02_SERVICE, LYWSD02_TEMP_HUM)
            .await?;
        Ok(TempAndHumidity::from_bytes(&data)?)
    }

    /// Read the battery percentage.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn get_battery(&self) -> Result<u8> {
        let data = self
            .device
            .read_characteristic(LYWSD02_SERVICE, LYWSD02_BATTERY)
            .await?;
        first_byte(&data)
    }

    /// Read the display unit.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn get_temp_unit(&self) -> Result<TemperatureUnit> {
        let data = self
            .device
            .read_characteristic(LYWSD02_SERVICE, LYWSD02_UNIT)
            .await?;
        Ok(TemperatureUnit::from_bytes(&data)?)
    }

    /// Set the display unit.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn set_temp_unit(&self, unit: TemperatureUnit) -> Result<()> {
        self.device
            .write_characteristic(LYWSD02_SERVICE, LYWSD02_UNIT, &[unit.as_byte()])
            .await
    }

    /// Read the last calculated hourly record index and the next index.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn get_last_calculated_hour_index_and_next_index(&self) -> Result<HistoryIndex> {
        let data = self
            .device
            .read_characteristic(LYWSD02_SERVICE, LYWSD02_HISTORY_INDEX)
            .await?;
        let index = HistoryIndex::from_bytes(&data)?;
        debug!(
            last_calculated = index.last_calculated,
            next = index.next,
            "History index"
        );
        Ok(index)
    }

    /// Read the most recent hourly record.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn get_last_hour_data(&self) -> Result<HistoryRecord> {
        let data = self
            .device
            .read_characteristic(LYWSD02_SERVICE, LYWSD02_LAST_HOUR)
            .await?;
        Ok(HistoryRecord::from_bytes(&data)?)
    }

    /// Download the hourly history.
    ///
    /// Records are collected in arrival order until one with an index of at
    /// least `last_calculated - 1` arrives. Without a notification timeout in
    /// the [`SessionConfig`] this waits for as long as the peripheral stays
    /// connected.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn get_history_data(&self) -> Result<Vec<HistoryRecord>> {
        let index = self.get_last_calculated_hour_index_and_next_index().await?;
        let last = index.final_record_index();

        let mut stream = self
            .device
            .open_notification_stream(LYWSD02_SERVICE, LYWSD02_HISTORY)
            .await?;
        let result = collect_history(&mut stream, last).await;
        if let Err(e) = stream.stop().await {
            debug!(error = %e, "Unsubscribe after history download failed");
        }

        let records = result?;
        info!(count = records.len(), "Downloaded history");
        Ok(records)
    }
}

async fn collect_history(stream: &mut NotificationStream, last: u32) -> Result<Vec<HistoryRecord>> {
    let mut records = Vec::new();
    loop {
        let data = stream.next_value().await?;
        let record = HistoryRecord::from_bytes(&data)?;
        debug!(index = record.index, "History record");
        records.push(record);
        if record.index >= last {
            return Ok(records);
        }
    }
}

fn read_time(m: &Lywsd02) -> BoxFuture<'_, Result<Reading>> {
    Box::pin(async move { Ok(reading("time", Value::Time(m.get_time().await?))) })
}

fn read_temp_and_hum(m: &Lywsd02) -> BoxFuture<'_, Result<Reading>> {
    Box::pin(async move {
        let sample = m.get_temp_and_hum().await?;
        let mut out = reading("temp", rounded(sample.temperature));
        out.insert("hum".to_string(), rounded(sample.humidity));
        Ok(out)
    })
}

fn read_battery(m: &Lywsd02) -> BoxFuture<'_, Result<Reading>> {
    Box::pin(async move {
        let battery = m.get_battery().await?;
        Ok(reading("batt", Value::Number(f64::from(battery))))
    })
}

fn read_temp_unit(m: &Lywsd02) -> BoxFuture<'_, Result<Reading>> {
    Box::pin(async move {
        let unit = m.get_temp_unit().await?;
        Ok(reading("tunit", Value::Enum(unit.symbol().to_string())))
    })
}

fn write_time(m: &Lywsd02, value: Value) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        match value {
            Value::Time(time) => m.set_time(Some(time)).await,
            other => Err(Error::invalid_argument(format!(
                "setTime expects a date, got {other}"
            ))),
        }
    })
}

fn write_temp_unit(m: &Lywsd02, value: Value) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        let unit = match value {
            Value::Enum(symbol) => symbol.parse::<TemperatureUnit>()?,
            other => {
                return Err(Error::invalid_argument(format!(
                    "setTempUnit expects C or F, got {other}"
                )));
            }
        };
        m.set_temp_unit(unit).await
    })
}
