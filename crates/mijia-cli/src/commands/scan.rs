//! Scan command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use mijia_core::{ScanOptions, scan_with_retry};

use crate::cli::OutputFormat;
use crate::format::{FormatOptions, format_scan_csv, format_scan_json, format_scan_text};
use crate::util::write_output;

pub async fn cmd_scan(
    timeout: u64,
    format: OutputFormat,
    all: bool,
    output: Option<&PathBuf>,
    quiet: bool,
    opts: &FormatOptions,
) -> Result<()> {
    if !quiet && format == OutputFormat::Text {
        eprintln!("Scanning for {timeout}s...");
    }

    let mut options = ScanOptions::default().duration_secs(timeout);
    if all {
        options = options.all_devices();
    }

    let devices = scan_with_retry(options, 2, false)
        .await
        .context("Failed to scan for devices")?;

    let content = match format {
        OutputFormat::Json => format_scan_json(&devices, opts)?,
        OutputFormat::Text => format_scan_text(&devices),
        OutputFormat::Csv => format_scan_csv(&devices, opts),
    };

    write_output(output, &content)
}
