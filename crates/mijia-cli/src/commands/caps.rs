//! Capabilities command implementation.

use std::path::PathBuf;

use anyhow::{Result, bail};
use mijia_core::ModelKind;

use crate::cli::OutputFormat;
use crate::format::{FormatOptions, format_caps_json, format_caps_text};
use crate::util::write_output;

/// Print the capability table of one model, or of every model.
///
/// This never touches Bluetooth.
pub fn cmd_caps(
    model: Option<ModelKind>,
    format: OutputFormat,
    output: Option<&PathBuf>,
    opts: &FormatOptions,
) -> Result<()> {
    let models: Vec<ModelKind> = match model {
        Some(kind) => vec![kind],
        None => ModelKind::all().to_vec(),
    };

    let content = match format {
        OutputFormat::Text => format_caps_text(&models),
        OutputFormat::Json => format_caps_json(&models, opts)?,
        OutputFormat::Csv => bail!("CSV output is not supported for capabilities"),
    };

    write_output(output, &content)
}
