#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Keg meter node binary: runs the control loop against simulated load
//! cells with the host protocol on stdio, or checks a config file.

mod cli;
mod logging;
mod sim;
mod transport;

use clap::Parser;
use cli::{Cli, Commands};
use eyre::WrapErr;
use kegmeter_config::{CalStore, Config};
use kegmeter_core::Runner;
use kegmeter_traits::LoadCell;
use sim::SimLoadCell;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use transport::StdioTransport;

fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    let args = Cli::parse();

    let (cfg, from_file) = load_config(&args.config)?;
    logging::init(&args.log_level, args.json, &cfg.logging)?;
    if !from_file {
        tracing::warn!(path = ?args.config, "config file not found, using defaults");
    }
    cfg.validate().wrap_err("invalid configuration")?;

    match args.cmd {
        Commands::Check => {
            print_summary(&cfg);
            println!("config OK");
            Ok(())
        }
        Commands::Run {
            ticks,
            calibration,
            full,
        } => run(&cfg, ticks, calibration, full),
    }
}

fn load_config(path: &Path) -> eyre::Result<(Config, bool)> {
    if !path.exists() {
        return Ok((Config::default(), false));
    }
    let text =
        std::fs::read_to_string(path).wrap_err_with(|| format!("read config {path:?}"))?;
    let cfg =
        kegmeter_config::load_toml(&text).wrap_err_with(|| format!("parse config {path:?}"))?;
    Ok((cfg, true))
}

fn print_summary(cfg: &Config) {
    println!(
        "meters: {} (status every {} ticks)",
        cfg.meters.count, cfg.meters.status_period_ticks
    );
    println!(
        "window: {} samples, min dwell {} ticks",
        cfg.window.capacity,
        cfg.min_dwell_ticks()
    );
    println!(
        "thresholds: settle {} / calibration {} / trust {} (kg^2), margin {} kg",
        cfg.thresholds.settle_variance,
        cfg.thresholds.calibration_variance,
        cfg.thresholds.trust_variance,
        cfg.thresholds.calibration_margin_kg
    );
    println!("sampling: {} Hz", cfg.sampling.rate_hz);
    match &cfg.persistence.calibration_file {
        Some(path) => println!("calibration store: {path}"),
        None => println!("calibration store: disabled"),
    }
}

fn run(
    cfg: &Config,
    ticks: Option<u64>,
    calibration_override: Option<PathBuf>,
    full: bool,
) -> eyre::Result<()> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::Relaxed);
    })
    .wrap_err("install signal handler")?;

    let store = calibration_override
        .map(|p| p.to_string_lossy().into_owned())
        .or_else(|| cfg.persistence.calibration_file.clone())
        .map(CalStore::new);

    let cells: Vec<Box<dyn LoadCell + Send>> = (0..cfg.meters.count)
        .map(|i| Box::new(SimLoadCell::new(i, full)) as Box<dyn LoadCell + Send>)
        .collect();

    let mut runner = Runner::new(cfg, cells, StdioTransport::new(), store, shutdown)?;
    runner.run(ticks)
}
