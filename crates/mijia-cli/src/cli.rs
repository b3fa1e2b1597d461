//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use mijia_core::ModelKind;

/// Output format for commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Csv,
}

/// Reusable device connection arguments
#[derive(Debug, Clone, Args)]
pub struct DeviceArgs {
    /// Device address or advertised name, or use MIJIA_DEVICE env var
    #[arg(short, long, env = "MIJIA_DEVICE")]
    pub device: Option<String>,

    /// Discovery and connection timeout in seconds
    #[arg(short = 'T', long, default_value = "15")]
    pub timeout: u64,

    /// Give up waiting for a pushed value after this many seconds
    #[arg(long)]
    pub notification_timeout: Option<u64>,
}

#[derive(Parser)]
#[command(name = "mijia")]
#[command(author, version, about = "CLI for Xiaomi Mijia BLE thermometers", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output compact JSON (no pretty-printing)
    #[arg(long, global = true)]
    pub compact: bool,

    /// Omit header row in CSV output (useful for appending)
    #[arg(long, global = true)]
    pub no_header: bool,

    /// Write output to file instead of stdout
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan for nearby sensors
    Scan {
        /// Scan timeout in seconds
        #[arg(short, long, default_value = "10")]
        timeout: u64,

        /// Output format
        #[arg(short, long, value_enum)]
        format: Option<OutputFormat>,

        /// Include every BLE peripheral, not just supported sensors
        #[arg(long)]
        all: bool,
    },

    /// Show what a sensor model can read and write
    Caps {
        /// Model to describe (all models when omitted)
        #[arg(short, long, value_parser = parse_model)]
        model: Option<ModelKind>,

        /// Output format
        #[arg(short, long, value_enum)]
        format: Option<OutputFormat>,
    },

    /// Run read operations on a sensor
    Read {
        #[command(flatten)]
        device: DeviceArgs,

        /// Operations to run, e.g. getBattery (all readable operations when omitted)
        operations: Vec<String>,

        /// Output format
        #[arg(short, long, value_enum)]
        format: Option<OutputFormat>,
    },

    /// Run a write operation on a sensor
    Set {
        #[command(flatten)]
        device: DeviceArgs,

        /// Write operation, e.g. setTempUnit
        operation: String,

        /// Value to write, e.g. F, or `now` for setTime
        value: String,
    },

    /// Download the hourly history of an LYWSD02
    History {
        #[command(flatten)]
        device: DeviceArgs,

        /// Output format
        #[arg(short, long, value_enum)]
        format: Option<OutputFormat>,

        /// Only read the most recent hourly record
        #[arg(long)]
        last_hour: bool,

        /// Number of most recent records to show (0 for all)
        #[arg(short, long, default_value = "0")]
        count: usize,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration subcommands
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init,
}

/// Parse a model name as accepted by [`ModelKind`]'s `FromStr`.
fn parse_model(s: &str) -> Result<ModelKind, String> {
    s.parse::<ModelKind>().map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_model_aliases() {
        assert_eq!(parse_model("LYWSD02MMC").unwrap(), ModelKind::Lywsd02);
        assert_eq!(parse_model("mj_ht_v1").unwrap(), ModelKind::Lywsdcgq);
        assert!(parse_model("lywsd03mmc").is_err());
    }

    #[test]
    fn test_read_collects_operations() {
        let cli = Cli::try_parse_from(["mijia", "read", "getBattery", "getTempUnit", "-f", "json"])
            .unwrap();
        match cli.command {
            Commands::Read {
                operations, format, ..
            } => {
                assert_eq!(operations, vec!["getBattery", "getTempUnit"]);
                assert_eq!(format, Some(OutputFormat::Json));
            }
            _ => panic!("expected read"),
        }
    }

    #[test]
    fn test_set_takes_operation_and_value() {
        let cli = Cli::try_parse_from(["mijia", "set", "-d", "AA:BB", "setTempUnit", "F"]).unwrap();
        match cli.command {
            Commands::Set {
                device,
                operation,
                value,
            } => {
                assert_eq!(device.device.as_deref(), Some("AA:BB"));
                assert_eq!(operation, "setTempUnit");
                assert_eq!(value, "F");
            }
            _ => panic!("expected set"),
        }
    }
}
