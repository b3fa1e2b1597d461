//! Example: Downloading Historical Data
//!
//! The LYWSD02 aggregates temperature and humidity into hourly min/max
//! records. This example downloads all of them.
//!
//! Run with: `cargo run --example download_history -- [DEVICE_ADDRESS]`

use std::env;
use std::sync::Arc;

use mijia_core::{BleLink, Sensor, SessionConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let identifier = env::args().nth(1);
    println!("Looking for {}...", identifier.as_deref().unwrap_or("an LYWSD02"));

    let sensor = Sensor::request_any(
        Arc::new(BleLink::new()),
        SessionConfig::challenging_environment(),
        identifier.as_deref(),
    )
    .await?;
    let Sensor::Lywsd02(lywsd02) = &sensor else {
        eprintln!("{} does not keep history", sensor.name());
        std::process::exit(1);
    };

    sensor.request_and_connect().await?;
    println!("Connected!");
    println!();

    let index = lywsd02
        .get_last_calculated_hour_index_and_next_index()
        .await?;
    println!("  Last calculated record: {}", index.last_calculated);
    println!("  Next record:            {}", index.next);
    println!();

    println!("Downloading history (this may take a moment)...");
    let records = lywsd02.get_history_data().await?;
    println!("Downloaded {} records", records.len());
    println!();

    println!(
        "{:>6}  {:<25}  {:>7}  {:>5}  {:>7}  {:>5}",
        "Index", "Hour (UTC)", "Max °C", "Max %", "Min °C", "Min %"
    );
    for record in &records {
        println!(
            "{:>6}  {:<25}  {:>7.1}  {:>5}  {:>7.1}  {:>5}",
            record.index,
            record.recorded_at().to_string(),
            record.temperature_max,
            record.humidity_max,
            record.temperature_min,
            record.humidity_min
        );
    }

    sensor.disconnect().await?;
    println!();
    println!("Disconnected.");

    Ok(())
}
