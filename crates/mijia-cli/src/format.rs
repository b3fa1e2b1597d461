//! Output formatting utilities for text, JSON, and CSV output.

use anyhow::Result;
use mijia_core::{
    CapabilityDescriptor, DiscoveredDevice, HistoryRecord, ModelKind, ReadDescriptor, Reading,
    Value,
};
use serde::Serialize;
use time::format_description::well_known::Rfc3339;

/// Formatting options for output.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatOptions {
    /// Omit header row in CSV output.
    pub no_header: bool,
    /// Use compact JSON output (no pretty-printing).
    pub compact: bool,
}

impl FormatOptions {
    pub fn new(compact: bool, no_header: bool) -> Self {
        Self { no_header, compact }
    }

    pub fn as_json<T: serde::Serialize>(&self, value: &T) -> Result<String> {
        let json = if self.compact {
            serde_json::to_string(value)?
        } else {
            serde_json::to_string_pretty(value)?
        };
        Ok(json + "\n")
    }
}

/// Escape a string for CSV output.
/// Wraps the value in quotes if it contains commas, quotes, or newlines.
/// Double quotes are escaped by doubling them.
#[must_use]
pub fn csv_escape(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn rfc3339(at: time::OffsetDateTime) -> String {
    at.format(&Rfc3339).unwrap_or_default()
}

// ============================================================================
// Scan formatting
// ============================================================================

pub fn format_scan_json(devices: &[DiscoveredDevice], opts: &FormatOptions) -> Result<String> {
    #[derive(Serialize)]
    struct ScanResult<'a> {
        count: usize,
        devices: Vec<DeviceJson<'a>>,
    }

    #[derive(Serialize)]
    struct DeviceJson<'a> {
        name: Option<&'a str>,
        address: &'a str,
        identifier: &'a str,
        rssi: Option<i16>,
        model: Option<ModelKind>,
    }

    let result = ScanResult {
        count: devices.len(),
        devices: devices
            .iter()
            .map(|d| DeviceJson {
                name: d.name.as_deref(),
                address: &d.address,
                identifier: &d.identifier,
                rssi: d.rssi,
                model: d.model,
            })
            .collect(),
    };

    opts.as_json(&result)
}

#[must_use]
pub fn format_scan_text(devices: &[DiscoveredDevice]) -> String {
    if devices.is_empty() {
        return "No sensors found.\n\
                Make sure the sensor is powered on and within range.\n"
            .to_string();
    }

    let mut output = format!("Found {} device(s):\n\n", devices.len());
    output.push_str(&format!(
        "{:<12} {:<10} {:>6}  {}\n",
        "NAME", "MODEL", "RSSI", "IDENTIFIER"
    ));
    for device in devices {
        output.push_str(&format!(
            "{:<12} {:<10} {:>6}  {}\n",
            device.name.as_deref().unwrap_or("Unknown"),
            device.model.map(|m| m.to_string()).unwrap_or_else(|| "-".into()),
            device
                .rssi
                .map(|r| format!("{r} dBm"))
                .unwrap_or_else(|| "-".into()),
            device.identifier
        ));
    }
    output
}

#[must_use]
pub fn format_scan_csv(devices: &[DiscoveredDevice], opts: &FormatOptions) -> String {
    let mut output = if opts.no_header {
        String::new()
    } else {
        "name,address,identifier,rssi,model\n".to_string()
    };
    for device in devices {
        output.push_str(&format!(
            "{},{},{},{},{}\n",
            csv_escape(device.name.as_deref().unwrap_or("")),
            csv_escape(&device.address),
            csv_escape(&device.identifier),
            device.rssi.map(|r| r.to_string()).unwrap_or_default(),
            device.model.map(|m| m.to_string()).unwrap_or_default()
        ));
    }
    output
}

// ============================================================================
// Capability formatting
// ============================================================================

#[must_use]
pub fn format_caps_text(models: &[ModelKind]) -> String {
    let mut output = String::new();
    for (i, kind) in models.iter().enumerate() {
        if i > 0 {
            output.push('\n');
        }
        let info = kind.info();
        output.push_str(&format!("{} (advertises as {})\n", info.name, info.filter));
        push_descriptor_text(&mut output, kind.descriptor());
    }
    output
}

fn push_descriptor_text(output: &mut String, descriptor: &CapabilityDescriptor) {
    output.push_str("  Read:\n");
    for read in &descriptor.read {
        let fields: Vec<String> = read
            .fields
            .iter()
            .map(|f| match (f.unit, f.values) {
                (Some(unit), _) => format!("{} ({unit})", f.key),
                (None, Some(values)) => format!("{} [{}]", f.key, values.join("|")),
                (None, None) => f.key.to_string(),
            })
            .collect();
        output.push_str(&format!("    {:<16} {}\n", read.operation, fields.join(", ")));
    }
    if descriptor.write.is_empty() {
        output.push_str("  Write: none\n");
        return;
    }
    output.push_str("  Write:\n");
    for write in &descriptor.write {
        let accepts = match write.values {
            Some(values) => values.join("|"),
            None => format!("{:?}", write.scalar).to_lowercase(),
        };
        output.push_str(&format!("    {:<16} {}\n", write.operation, accepts));
    }
}

pub fn format_caps_json(models: &[ModelKind], opts: &FormatOptions) -> Result<String> {
    #[derive(Serialize)]
    struct ModelJson<'a> {
        model: ModelKind,
        name: &'a str,
        filter: &'a str,
        capabilities: &'a CapabilityDescriptor,
    }

    let result: Vec<ModelJson<'_>> = models
        .iter()
        .map(|kind| ModelJson {
            model: *kind,
            name: kind.info().name,
            filter: kind.info().filter,
            capabilities: kind.descriptor(),
        })
        .collect();

    opts.as_json(&result)
}

// ============================================================================
// Reading formatting
// ============================================================================

/// One read operation and what it returned.
pub struct ReadResult<'a> {
    pub descriptor: &'a ReadDescriptor,
    pub reading: Reading,
}

/// The label, value and unit for each field in declaration order.
fn labelled<'a>(result: &'a ReadResult<'_>) -> impl Iterator<Item = (&'a str, &'a Value, &'a str)> {
    result.descriptor.fields.iter().filter_map(move |field| {
        result
            .reading
            .get(field.key)
            .map(|value| (field.name, value, field.unit.unwrap_or("")))
    })
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Number(n) => format!("{}", (n * 100.0).round() / 100.0),
        other => other.to_string(),
    }
}

#[must_use]
pub fn format_reading_text(name: &str, results: &[ReadResult<'_>]) -> String {
    let mut output = format!("{name}\n");
    for result in results {
        for (label, value, unit) in labelled(result) {
            output.push_str(&format!(
                "  {:<18} {}{}\n",
                format!("{label}:"),
                display_value(value),
                unit
            ));
        }
    }
    output
}

#[must_use]
pub fn format_reading_csv(results: &[ReadResult<'_>], opts: &FormatOptions) -> String {
    let mut output = if opts.no_header {
        String::new()
    } else {
        "operation,field,value,unit\n".to_string()
    };
    for result in results {
        for field in &result.descriptor.fields {
            if let Some(value) = result.reading.get(field.key) {
                output.push_str(&format!(
                    "{},{},{},{}\n",
                    result.descriptor.operation,
                    field.key,
                    csv_escape(&value.to_string()),
                    field.unit.unwrap_or("")
                ));
            }
        }
    }
    output
}

pub fn format_reading_json(
    model: ModelKind,
    id: &str,
    results: &[ReadResult<'_>],
    opts: &FormatOptions,
) -> Result<String> {
    #[derive(Serialize)]
    struct ReadingJson<'a> {
        model: ModelKind,
        name: &'a str,
        id: &'a str,
        readings: Reading,
    }

    let mut readings = Reading::new();
    for result in results {
        readings.extend(result.reading.clone());
    }

    opts.as_json(&ReadingJson {
        model,
        name: model.info().name,
        id,
        readings,
    })
}

// ============================================================================
// History formatting
// ============================================================================

#[must_use]
pub fn format_history_text(history: &[HistoryRecord]) -> String {
    if history.is_empty() {
        return "No history records found.\n".to_string();
    }

    let mut output = format!("History ({} records):\n\n", history.len());
    output.push_str(&format!(
        "{:>6}  {:<25} {:>9} {:>7} {:>9} {:>7}\n",
        "INDEX", "HOUR", "TMAX", "HMAX", "TMIN", "HMIN"
    ));
    for record in history {
        output.push_str(&format!(
            "{:>6}  {:<25} {:>7.1}°C {:>6}% {:>7.1}°C {:>6}%\n",
            record.index,
            rfc3339(record.recorded_at()),
            record.temperature_max,
            record.humidity_max,
            record.temperature_min,
            record.humidity_min
        ));
    }
    output
}

#[must_use]
pub fn format_history_csv(history: &[HistoryRecord], opts: &FormatOptions) -> String {
    let mut output = if opts.no_header {
        String::new()
    } else {
        "index,timestamp,temperature_max,humidity_max,temperature_min,humidity_min\n".to_string()
    };
    for record in history {
        output.push_str(&format!(
            "{},{},{:.2},{},{:.2},{}\n",
            record.index,
            rfc3339(record.recorded_at()),
            record.temperature_max,
            record.humidity_max,
            record.temperature_min,
            record.humidity_min
        ));
    }
    output
}

pub fn format_history_json(history: &[HistoryRecord], opts: &FormatOptions) -> Result<String> {
    #[derive(Serialize)]
    struct RecordJson {
        index: u32,
        timestamp: String,
        temperature_max: f32,
        humidity_max: u8,
        temperature_min: f32,
        humidity_min: u8,
    }

    let records: Vec<RecordJson> = history
        .iter()
        .map(|r| RecordJson {
            index: r.index,
            timestamp: rfc3339(r.recorded_at()),
            temperature_max: r.temperature_max,
            humidity_max: r.humidity_max,
            temperature_min: r.temperature_min,
            humidity_min: r.humidity_min,
        })
        .collect();

    opts.as_json(&records)
}
