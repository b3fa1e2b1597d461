//! Core BLE library for Xiaomi Mijia thermometers.
//!
//! This crate drives Xiaomi temperature/humidity sensors over Bluetooth Low
//! Energy: it discovers a peripheral, keeps one connection session with a
//! per-service resolution cache, and decodes each model's characteristics.
//!
//! # Features
//!
//! - **Device discovery**: scan for nearby sensors, or request one by model
//! - **Session cache**: each service is resolved at most once per connection
//! - **Notifications**: scoped subscriptions that end cleanly on disconnect
//! - **Clock and unit**: read and set the LYWSD02 clock and display unit
//! - **Historical data**: download the LYWSD02 hourly min/max records
//! - **Capability tables**: per-model read/write operations invoked by name
//!
//! # Supported Devices
//!
//! | Device | Advertised name | Operations |
//! |--------|-----------------|------------|
//! | LYWSD02 | `LYWSD02` | Time, temperature/humidity, battery, unit, history |
//! | LYWSDCGQ/01ZM | `MJ_HT_V1` | Temperature/humidity, battery |
//!
//! # Platform Differences
//!
//! On macOS peripherals are identified by a CoreBluetooth UUID that is stable
//! only on one Mac. Linux and Windows use the Bluetooth MAC address.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use mijia_core::{BleLink, Lywsd02, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let sensor = Lywsd02::new(Arc::new(BleLink::new()), SessionConfig::default());
//!     sensor.device().request_and_connect().await?;
//!
//!     let sample = sensor.get_temp_and_hum().await?;
//!     println!("{:.1}°C {:.0}%", sample.temperature, sample.humidity);
//!
//!     for record in sensor.get_history_data().await? {
//!         println!("#{} max {:.1}°C", record.index, record.temperature_max);
//!     }
//!
//!     sensor.device().disconnect().await?;
//!     Ok(())
//! }
//! ```

pub mod ble;
pub mod capabilities;
pub mod device;
pub mod error;
pub mod link;
pub mod mock;
pub mod models;
pub mod notify;
pub mod scan;
pub mod util;

pub use mijia_types::types;
pub use mijia_types::uuid as uuids;

// Core exports
pub use ble::BleLink;
pub use capabilities::{
    CapabilityDescriptor, FieldDescriptor, ReadDescriptor, Reading, ScalarType, Value,
    WriteDescriptor,
};
pub use device::{Device, SessionConfig, parse_id};
pub use error::{
    ConnectionFailureReason, DeviceNotFoundReason, Error, ResolutionKind, Result,
};
pub use link::{DiscoveryRequest, PeripheralLink};
pub use models::{Lywsd02, Lywsdcgq, ModelInfo, ModelKind, Sensor};
pub use notify::NotificationStream;
pub use scan::{DiscoveredDevice, ScanOptions, scan_with_retry};

pub use mijia_types::{
    DeviceClock, HistoryIndex, HistoryRecord, ParseError, TempAndHumidity, TemperatureUnit,
};
