//! Set command implementation.

use anyhow::{Context, Result, bail};
use mijia_core::Value;

use crate::cli::DeviceArgs;
use crate::config::Config;
use crate::util::connect_sensor;

pub async fn cmd_set(
    args: &DeviceArgs,
    operation: &str,
    value: &str,
    quiet: bool,
    config: &Config,
) -> Result<()> {
    let sensor = connect_sensor(args, config).await?;

    let Some(write) = sensor.descriptor().write_op(operation) else {
        let known: Vec<&str> = sensor
            .descriptor()
            .write
            .iter()
            .map(|w| w.operation)
            .collect();
        sensor.disconnect().await.ok();
        if known.is_empty() {
            bail!("{} has no writable settings", sensor.name());
        }
        bail!(
            "{} has no write operation {:?}. Available: {}",
            sensor.name(),
            operation,
            known.join(", ")
        );
    };

    let parsed = match Value::parse(write.scalar, write.values, value) {
        Ok(parsed) => parsed,
        Err(e) => {
            sensor.disconnect().await.ok();
            return Err(anyhow::Error::new(e).context(format!("Invalid value for {operation}")));
        }
    };

    let result = sensor.write(operation, parsed.clone()).await;
    sensor.disconnect().await.ok();
    result.with_context(|| format!("{operation} failed"))?;

    if !quiet {
        eprintln!("{} set to {}", write.name, parsed);
    }
    Ok(())
}
