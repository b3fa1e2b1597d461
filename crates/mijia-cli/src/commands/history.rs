//! History command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use mijia_core::Sensor;
use tracing::info;

use crate::cli::{DeviceArgs, OutputFormat};
use crate::config::Config;
use crate::format::{FormatOptions, format_history_csv, format_history_json, format_history_text};
use crate::util::{connect_sensor, write_output};

/// Arguments for the history command.
pub struct HistoryArgs<'a> {
    pub device: &'a DeviceArgs,
    pub format: OutputFormat,
    pub last_hour: bool,
    pub count: usize,
    pub output: Option<&'a PathBuf>,
    pub quiet: bool,
}

pub async fn cmd_history(args: HistoryArgs<'_>, opts: &FormatOptions, config: &Config) -> Result<()> {
    let sensor = connect_sensor(args.device, config).await?;

    let Sensor::Lywsd02(lywsd02) = &sensor else {
        sensor.disconnect().await.ok();
        bail!("{} does not store history; only the LYWSD02 does", sensor.name());
    };

    if !args.quiet && args.format == OutputFormat::Text {
        eprintln!("Downloading history...");
    }

    let result = if args.last_hour {
        lywsd02.get_last_hour_data().await.map(|record| vec![record])
    } else {
        lywsd02.get_history_data().await
    };
    sensor.disconnect().await.ok();
    let mut records = result.context("Failed to download history")?;
    info!(count = records.len(), "History downloaded");

    if args.count > 0 && records.len() > args.count {
        records.drain(..records.len() - args.count);
    }

    let content = match args.format {
        OutputFormat::Text => format_history_text(&records),
        OutputFormat::Json => format_history_json(&records, opts)?,
        OutputFormat::Csv => format_history_csv(&records, opts),
    };

    write_output(args.output, &content)
}
