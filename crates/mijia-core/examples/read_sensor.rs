//! Example: Reading Current Sensor Values
//!
//! Connects to the first supported Mijia sensor in range (or the one given on
//! the command line) and runs every read operation it offers.
//!
//! Run with: `cargo run --example read_sensor -- [DEVICE_ADDRESS_OR_NAME]`

use std::env;
use std::sync::Arc;

use mijia_core::{BleLink, Sensor, SessionConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let identifier = env::args().nth(1);
    println!(
        "Looking for {}...",
        identifier.as_deref().unwrap_or("any LYWSD02 or LYWSDCGQ")
    );

    let sensor = Sensor::request_any(
        Arc::new(BleLink::new()),
        SessionConfig::default(),
        identifier.as_deref(),
    )
    .await?;
    sensor.request_and_connect().await?;
    println!("Connected to {} ({})", sensor.name(), sensor.device().device_id()?);
    println!();

    for read in &sensor.descriptor().read {
        let reading = sensor.read(read.operation).await?;
        for field in &read.fields {
            if let Some(value) = reading.get(field.key) {
                println!(
                    "  {:<18} {}{}",
                    format!("{}:", field.name),
                    value,
                    field.unit.unwrap_or("")
                );
            }
        }
    }

    sensor.disconnect().await?;
    println!();
    println!("Disconnected.");

    Ok(())
}
