//! Command-line interface for Xiaomi Mijia BLE thermometers.

mod cli;
mod commands;
mod config;
mod format;
mod util;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use commands::{HistoryArgs, cmd_caps, cmd_config, cmd_history, cmd_read, cmd_scan, cmd_set};
use config::{Config, resolve_format};
use format::FormatOptions;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load();
    let opts = FormatOptions::new(cli.compact, cli.no_header);
    let output = cli.output.as_ref();

    match cli.command {
        Commands::Scan {
            timeout,
            format,
            all,
        } => {
            let format = resolve_format(format, &config);
            cmd_scan(timeout, format, all, output, cli.quiet, &opts).await?;
        }
        Commands::Caps { model, format } => {
            let format = resolve_format(format, &config);
            cmd_caps(model, format, output, &opts)?;
        }
        Commands::Read {
            device,
            operations,
            format,
        } => {
            let format = resolve_format(format, &config);
            cmd_read(&device, &operations, format, output, &opts, &config).await?;
        }
        Commands::Set {
            device,
            operation,
            value,
        } => {
            cmd_set(&device, &operation, &value, cli.quiet, &config).await?;
        }
        Commands::History {
            device,
            format,
            last_hour,
            count,
        } => {
            let args = HistoryArgs {
                device: &device,
                format: resolve_format(format, &config),
                last_hour,
                count,
                output,
                quiet: cli.quiet,
            };
            cmd_history(args, &opts, &config).await?;
        }
        Commands::Config { action } => {
            cmd_config(action, &config)?;
        }
    }

    Ok(())
}
