//! Read command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use tracing::info;

use crate::cli::{DeviceArgs, OutputFormat};
use crate::config::Config;
use crate::format::{
    FormatOptions, ReadResult, format_reading_csv, format_reading_json, format_reading_text,
};
use crate::util::{connect_sensor, write_output};

pub async fn cmd_read(
    args: &DeviceArgs,
    operations: &[String],
    format: OutputFormat,
    output: Option<&PathBuf>,
    opts: &FormatOptions,
    config: &Config,
) -> Result<()> {
    let sensor = connect_sensor(args, config).await?;
    let descriptor = sensor.descriptor();

    // Reject unknown operations before touching the sensor again
    let selected: Vec<_> = if operations.is_empty() {
        descriptor.read.iter().collect()
    } else {
        let mut selected = Vec::with_capacity(operations.len());
        for op in operations {
            match descriptor.read_op(op) {
                Some(read) => selected.push(read),
                None => {
                    let known: Vec<&str> = descriptor.read.iter().map(|r| r.operation).collect();
                    sensor.disconnect().await.ok();
                    bail!(
                        "{} has no read operation {:?}. Available: {}",
                        sensor.name(),
                        op,
                        known.join(", ")
                    );
                }
            }
        }
        selected
    };

    let mut results = Vec::with_capacity(selected.len());
    let mut failure = None;
    for read in selected {
        match sensor.read(read.operation).await {
            Ok(reading) => {
                info!(operation = read.operation, "Read complete");
                results.push(ReadResult {
                    descriptor: read,
                    reading,
                });
            }
            Err(e) => {
                failure = Some(anyhow::Error::new(e).context(format!("{} failed", read.operation)));
                break;
            }
        }
    }

    sensor.disconnect().await.ok();
    if let Some(err) = failure {
        return Err(err);
    }

    let id = sensor
        .device()
        .device_id()
        .context("Sensor has no identifier")?;
    let content = match format {
        OutputFormat::Text => format_reading_text(sensor.name(), &results),
        OutputFormat::Json => format_reading_json(sensor.kind(), &id, &results, opts)?,
        OutputFormat::Csv => format_reading_csv(&results, opts),
    };

    write_output(output, &content)
}
