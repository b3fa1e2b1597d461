//! Device discovery and scanning.
//!
//! This module lists nearby Mijia sensors and locates the peripheral a
//! [`DiscoveryRequest`] asks for, using Bluetooth Low Energy.

use std::time::Duration;

use btleplug::api::{Central, Manager as _, Peripheral as _, PeripheralProperties, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::error::{DeviceNotFoundReason, Error, Result};
use crate::link::DiscoveryRequest;
use crate::models::ModelKind;
use crate::util::{address_matches, create_identifier};

/// How often known peripherals are re-checked while a scan is running.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Information about a discovered peripheral.
#[derive(Debug, Clone)]
pub struct DiscoveredDevice {
    /// Advertised local name (e.g. `LYWSD02`).
    pub name: Option<String>,
    /// The peripheral ID for connecting.
    pub id: PeripheralId,
    /// The BLE address as a string (zeros on macOS, use `identifier` instead).
    pub address: String,
    /// A connection identifier (peripheral ID on macOS, address elsewhere).
    pub identifier: String,
    /// RSSI signal strength.
    pub rssi: Option<i16>,
    /// Sensor model, if the advertised name is a supported one.
    pub model: Option<ModelKind>,
}

/// Options for scanning.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// How long to scan for devices.
    pub duration: Duration,
    /// Only return peripherals advertising a supported model name.
    pub supported_only: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(5),
            supported_only: true,
        }
    }
}

impl ScanOptions {
    /// Create new scan options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the scan duration.
    #[must_use]
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Set scan duration in seconds.
    #[must_use]
    pub fn duration_secs(mut self, secs: u64) -> Self {
        self.duration = Duration::from_secs(secs);
        self
    }

    /// Include every BLE peripheral, not just supported sensors.
    #[must_use]
    pub fn all_devices(mut self) -> Self {
        self.supported_only = false;
        self
    }
}

/// Get the first available Bluetooth adapter.
pub async fn get_adapter() -> Result<Adapter> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;

    adapters
        .into_iter()
        .next()
        .ok_or(Error::DeviceNotFound(DeviceNotFoundReason::NoAdapter))
}

/// Scan for supported sensors in range.
///
/// An empty list means nothing was found; it is not an error.
///
/// # Errors
///
/// Returns an error if no Bluetooth adapter is available or the scan could
/// not be started or stopped.
pub async fn scan_with_options(options: ScanOptions) -> Result<Vec<DiscoveredDevice>> {
    let adapter = get_adapter().await?;
    scan_with_adapter(&adapter, options).await
}

/// Scan, retrying when the scan fails or (optionally) finds nothing.
///
/// The delay between attempts starts at 500ms and doubles, capped at 5s.
pub async fn scan_with_retry(
    options: ScanOptions,
    max_retries: u32,
    retry_on_empty: bool,
) -> Result<Vec<DiscoveredDevice>> {
    let mut attempt = 0;
    let mut delay = Duration::from_millis(500);

    loop {
        match scan_with_options(options.clone()).await {
            Ok(devices) if devices.is_empty() && retry_on_empty && attempt < max_retries => {
                attempt += 1;
                warn!("No devices found, retrying ({}/{})...", attempt, max_retries);
                sleep(delay).await;
                delay = delay.saturating_mul(2).min(Duration::from_secs(5));
            }
            Ok(devices) => return Ok(devices),
            Err(e) if attempt < max_retries => {
                attempt += 1;
                warn!("Scan failed ({}), retrying ({}/{})...", e, attempt, max_retries);
                sleep(delay).await;
                delay = delay.saturating_mul(2).min(Duration::from_secs(5));
            }
            Err(e) => return Err(e),
        }
    }
}

/// Scan for devices using a specific adapter.
pub async fn scan_with_adapter(
    adapter: &Adapter,
    options: ScanOptions,
) -> Result<Vec<DiscoveredDevice>> {
    info!(
        "Starting BLE scan for {} seconds...",
        options.duration.as_secs()
    );

    adapter.start_scan(ScanFilter::default()).await?;
    sleep(options.duration).await;
    adapter.stop_scan().await?;

    let mut discovered = Vec::new();
    for peripheral in adapter.peripherals().await? {
        match describe(&peripheral).await {
            Ok(Some(device)) if device.model.is_some() || !options.supported_only => {
                debug!(name = ?device.name, id = %device.identifier, "Found peripheral");
                discovered.push(device);
            }
            Ok(_) => {}
            Err(e) => debug!("Error processing peripheral: {}", e),
        }
    }

    info!("Scan complete. Found {} device(s)", discovered.len());
    Ok(discovered)
}

async fn describe(peripheral: &Peripheral) -> Result<Option<DiscoveredDevice>> {
    let Some(properties) = peripheral.properties().await? else {
        return Ok(None);
    };

    let id = peripheral.id();
    let address = properties.address.to_string();
    let identifier = create_identifier(&address, &id);
    let model = properties
        .local_name
        .as_deref()
        .and_then(ModelKind::from_name);

    Ok(Some(DiscoveredDevice {
        name: properties.local_name,
        id,
        address,
        identifier,
        rssi: properties.rssi,
        model,
    }))
}

/// Locate the peripheral `request` describes.
///
/// Peripherals the adapter already knows are checked first. Otherwise up to
/// three scans split `request.timeout` between them, each polling the known
/// peripherals so a match returns as soon as it is seen.
pub async fn find_matching(adapter: &Adapter, request: &DiscoveryRequest) -> Result<Peripheral> {
    info!(names = ?request.names, identifier = ?request.identifier, "Looking for device");

    if let Some(peripheral) = find_known(adapter, request).await? {
        info!("Found device in cache (no scan needed)");
        return Ok(peripheral);
    }

    let max_attempts: u32 = 3;
    let per_attempt = request.timeout / max_attempts;

    for attempt in 1..=max_attempts {
        info!(
            "Scan attempt {}/{} ({}ms)...",
            attempt,
            max_attempts,
            per_attempt.as_millis()
        );

        adapter.start_scan(ScanFilter::default()).await?;
        let found = poll_until(adapter, request, Instant::now() + per_attempt).await;
        adapter.stop_scan().await?;

        if let Some(peripheral) = found? {
            info!("Found device on attempt {}", attempt);
            return Ok(peripheral);
        }
        if attempt < max_attempts {
            warn!("Device not found, retrying...");
        }
    }

    warn!("Device not found after {} attempts", max_attempts);
    Err(match &request.identifier {
        Some(identifier) => Error::device_not_found(identifier.clone()),
        None => Error::DeviceNotFound(DeviceNotFoundReason::ScanTimeout {
            duration: request.timeout,
        }),
    })
}

async fn poll_until(
    adapter: &Adapter,
    request: &DiscoveryRequest,
    deadline: Instant,
) -> Result<Option<Peripheral>> {
    loop {
        if let Some(peripheral) = find_known(adapter, request).await? {
            return Ok(Some(peripheral));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        sleep(POLL_INTERVAL.min(deadline.saturating_duration_since(Instant::now()))).await;
    }
}

async fn find_known(adapter: &Adapter, request: &DiscoveryRequest) -> Result<Option<Peripheral>> {
    for peripheral in adapter.peripherals().await? {
        if let Ok(Some(props)) = peripheral.properties().await
            && properties_match(request, &props, &peripheral.id())
        {
            debug!(name = ?props.local_name, "Matched peripheral");
            return Ok(Some(peripheral));
        }
    }
    Ok(None)
}

fn properties_match(
    request: &DiscoveryRequest,
    props: &PeripheralProperties,
    id: &PeripheralId,
) -> bool {
    let address = props.address.to_string();
    let identifier = create_identifier(&address, id);
    let name = props.local_name.as_deref();
    if request.matches(name, &identifier) {
        return true;
    }
    // Identifiers typed without separators still name the same address.
    match (&request.identifier, name) {
        (Some(wanted), Some(name)) => {
            request.names.iter().any(|n| n == name) && address_matches(&address, wanted)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_options_builder() {
        let options = ScanOptions::new().duration_secs(3).all_devices();
        assert_eq!(options.duration, Duration::from_secs(3));
        assert!(!options.supported_only);
        assert!(ScanOptions::default().supported_only);
    }
}
