//! SortScan command-line front end
//!
//! Records waste scans (photo, total residual weight, per-stream weights),
//! shows separation metrics and writes self-contained HTML reports. Data
//! lives in a folder of JSON documents resolved from the command line,
//! `SORTSCAN_DATA_FOLDER`, the TOML config or the platform default.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use sortscan_common::config::{default_config_path, load_toml_config, resolve_data_folder};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod photo;

/// Command-line arguments for sortscan
#[derive(Parser, Debug)]
#[command(name = "sortscan")]
#[command(about = "Waste separation scans: record, measure, report")]
#[command(version)]
struct Args {
    /// Folder holding scans.json and settings.json
    #[arg(short, long, env = "SORTSCAN_DATA_FOLDER", global = true)]
    data_folder: Option<PathBuf>,

    /// Path to config.toml (defaults to the platform config directory)
    #[arg(short, long, env = "SORTSCAN_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

/// Fields shared by `create` and `update`
#[derive(clap::Args, Debug, Default)]
struct ScanFields {
    /// Total residual weight in kg; must be greater than 0 to save
    #[arg(short, long, allow_hyphen_values = true)]
    total: Option<String>,

    /// Where the container was scanned (empty string clears it)
    #[arg(short, long)]
    location: Option<String>,

    /// Free-text notes (empty string clears them)
    #[arg(short, long)]
    notes: Option<String>,

    /// Image file to embed as the scan photo
    #[arg(short, long)]
    photo: Option<PathBuf>,

    /// Waste stream as NAME=KG; repeat for several streams
    #[arg(short, long = "stream", value_name = "NAME=KG", value_parser = commands::parse_stream_arg)]
    streams: Vec<(String, f64)>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List scans, most recently updated first
    List,

    /// Show one scan with its metrics
    Show {
        id: String,
        /// Print the stored record as JSON
        #[arg(long)]
        json: bool,
    },

    /// Record a new scan
    Create {
        #[command(flatten)]
        fields: ScanFields,
    },

    /// Change fields of an existing scan
    Update {
        id: String,
        #[command(flatten)]
        fields: ScanFields,
        /// Remove every stream (ignored when --stream is given)
        #[arg(long)]
        clear_streams: bool,
        /// Remove the photo
        #[arg(long, conflicts_with = "photo")]
        clear_photo: bool,
    },

    /// Delete a scan
    Delete { id: String },

    /// Write the HTML report for a scan
    Report {
        id: String,
        /// Output file (defaults to the suggested file name in the current directory)
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Write the metrics summary as JSON instead of HTML
        #[arg(long)]
        json: bool,
    },

    /// Replace a scan's streams and total with a saved analysis response
    ApplyAnalysis {
        id: String,
        /// File holding the raw analysis response (JSON, optionally in a code fence)
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Manage the stored analysis-service API key
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },

    /// List preset stream names
    Presets,
}

#[derive(Subcommand, Debug)]
enum SettingsAction {
    /// Print the stored API key
    Get,
    /// Store an API key
    Set { key: String },
    /// Remove the stored API key
    Clear,
    /// Report which source the API key would be taken from
    Status,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().or_else(default_config_path);
    let toml_config = config_path
        .as_deref()
        .map(load_toml_config)
        .unwrap_or_default();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter(&toml_config.logging.level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let data_folder = resolve_data_folder(args.data_folder.as_deref(), &toml_config);
    info!("Data folder: {}", data_folder.display());
    if let Some(path) = &config_path {
        debug!("Config file: {}", path.display());
    }

    let mut stdout = std::io::stdout().lock();
    commands::run(args.command, &data_folder, &toml_config, &mut stdout)
}

/// Filter directive for a configured level; full directives pass through
fn log_filter(level: &str) -> String {
    if level.contains('=') || level.contains(',') {
        level.to_string()
    } else {
        format!("sortscan={level},sortscan_common={level}")
    }
}
