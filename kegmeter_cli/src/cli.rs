//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "kegmeter", version, about = "Keg fill-level meter node")]
pub struct Cli {
    /// Path to config TOML
    #[arg(long, value_name = "FILE", default_value = "etc/kegmeter.toml")]
    pub config: PathBuf,

    /// Log as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the meter loop: simulated load cells, host protocol on stdio
    Run {
        /// Stop after this many control-loop ticks (default: run until Ctrl-C)
        #[arg(long, value_name = "N")]
        ticks: Option<u64>,
        /// Override the calibration store path from the config
        #[arg(long, value_name = "FILE")]
        calibration: Option<PathBuf>,
        /// Start the simulated kegs full instead of empty
        #[arg(long, action = ArgAction::SetTrue)]
        full: bool,
    },
    /// Load and validate the config, then print the effective settings
    Check,
}
