//! Utility functions for CLI operations.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use mijia_core::{BleLink, Sensor, SessionConfig};
use tracing::debug;

use crate::cli::DeviceArgs;
use crate::config::{Config, resolve_device, resolve_timeout};

/// Default discovery and connection timeout, matching the `--timeout` default.
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Build the session config for a device command from flags and config.
pub fn session_config(args: &DeviceArgs, config: &Config) -> Result<SessionConfig> {
    let timeout = Duration::from_secs(resolve_timeout(args.timeout, config, DEFAULT_TIMEOUT_SECS));
    let mut session = SessionConfig::default()
        .discovery_timeout(timeout)
        .connection_timeout(timeout);
    if let Some(secs) = args.notification_timeout.or(config.notification_timeout) {
        session = session.notification_timeout(Duration::from_secs(secs));
    }
    session.validate().context("Invalid timeout settings")?;
    Ok(session)
}

/// Discover the requested sensor (or the first supported one) and connect.
pub async fn connect_sensor(args: &DeviceArgs, config: &Config) -> Result<Sensor> {
    let session = session_config(args, config)?;
    let device = resolve_device(args.device.clone(), config);
    debug!(device = ?device, ?session, "Connecting");

    let link = Arc::new(BleLink::new());
    let sensor = Sensor::request_any(link, session, device.as_deref())
        .await
        .map_err(|e| {
            let base_msg = match &device {
                Some(d) => format!("Failed to find sensor: {d}"),
                None => "Failed to find a supported sensor".to_string(),
            };
            let suggestion = "\n\nPossible causes:\n  \
                - Bluetooth may be disabled -- check system settings\n  \
                - Sensor may be out of range -- try moving closer\n  \
                - Sensor may be connected to another host or the Mi Home app\n  \
                - Device address may be incorrect -- run 'mijia scan' to verify";
            anyhow::anyhow!("{}\n\nCause: {}{}", base_msg, e, suggestion)
        })?;

    sensor.request_and_connect().await.map_err(|e| {
        let suggestion = "\n\nPossible causes:\n  \
            - Sensor may have gone out of range\n  \
            - Sensor may be connected to another host\n  \
            - Bluetooth connection was interrupted";
        anyhow::anyhow!(
            "Failed to connect to {}\n\nCause: {}{}",
            sensor.name(),
            e,
            suggestion
        )
    })?;

    Ok(sensor)
}

/// Write output to file or stdout
pub fn write_output(output: Option<&PathBuf>, content: &str) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write to {}", path.display()))?;
        }
        None => {
            print!("{}", content);
        }
    }
    Ok(())
}
