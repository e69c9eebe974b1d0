#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema and persisted calibration storage for the keg meter node.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - The calibration store keeps per-meter sensor calibration and the last
//!   reported fill percent across restarts, keyed by meter index.

use serde::{Deserialize, Serialize};

pub mod store;

pub use store::{CalStore, MeterCalibration};

/// Meter bank sizing and telemetry cadence.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct Meters {
    /// Number of physical meter slots driven by this node.
    pub count: usize,
    /// Emit a full status frame for every meter each N control-loop ticks.
    pub status_period_ticks: u32,
}

impl Default for Meters {
    fn default() -> Self {
        Self {
            count: 8,
            status_period_ticks: 50,
        }
    }
}

/// Sliding statistics window over recent load samples.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct Window {
    /// Number of samples held. Must fit an 8-bit cursor on the embedded target.
    pub capacity: usize,
    /// Value the window is pre-filled with at construction (kg).
    pub seed_kg: f64,
}

impl Default for Window {
    fn default() -> Self {
        Self {
            capacity: 50,
            seed_kg: 0.0,
        }
    }
}

/// Variance thresholds and the keg-detection margin.
///
/// The observed hardware revisions disagree on these numbers; they are
/// deployment tunables, not constants.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct Thresholds {
    /// Settle variance while empty-calibrating or resting empty (kg^2).
    pub settle_variance: f64,
    /// Variance below which keg calibration is considered converged (kg^2).
    pub calibration_variance: f64,
    /// Variance below which a measurement is trusted to move the meter (kg^2).
    pub trust_variance: f64,
    /// Mass above the calibrated empty point that signals a keg was placed (kg).
    /// Must sit a little below the lightest empty keg in use.
    pub calibration_margin_kg: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            settle_variance: 0.05,
            calibration_variance: 0.05,
            trust_variance: 0.5,
            calibration_margin_kg: 3.5,
        }
    }
}

/// Minimum-dwell gates and presentation timing, all in control-loop ticks.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct Dwell {
    /// Minimum ticks spent in a calibration state before its capture is
    /// allowed. Defaults to the window capacity when absent.
    pub min_ticks: Option<usize>,
    /// Ticks the post-calibration fill animation runs before measuring starts.
    pub fill_anim_ticks: usize,
    /// Ticks per pulse of the became-empty animation.
    pub empty_pulse_ticks: usize,
    /// Number of on/off pulses in the became-empty animation.
    pub empty_pulses: usize,
}

impl Default for Dwell {
    fn default() -> Self {
        Self {
            min_ticks: None,
            fill_anim_ticks: 80,
            empty_pulse_ticks: 10,
            empty_pulses: 5,
        }
    }
}

/// Known container masses used to classify the detected keg kind.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct Containers {
    /// Average mass of an empty 19 L Cornelius keg (kg).
    pub corny_empty_kg: f64,
    /// Average mass of an empty 50 L Sankey keg (kg).
    pub sanke_empty_kg: f64,
    /// Heaviest plausible full 19 L keg; above this the keg is 50 L class (kg).
    pub corny_max_full_kg: f64,
}

impl Default for Containers {
    fn default() -> Self {
        Self {
            corny_empty_kg: 4.0,
            sanke_empty_kg: 13.5,
            // 19 L at 1.035 kg/L on top of the empty keg
            corny_max_full_kg: 23.7,
        }
    }
}

/// Control-loop pacing.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct Sampling {
    /// Control-loop tick rate in Hz (one load sample per meter per tick).
    pub rate_hz: u32,
}

impl Default for Sampling {
    fn default() -> Self {
        Self { rate_hz: 50 }
    }
}

/// Bounded waits. No read in the control loop may block past these.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct Timeouts {
    /// Max wait for inbound transport bytes per loop iteration (ms).
    pub transport_poll_ms: u64,
    /// Max wait for a load-cell reading (ms).
    pub sensor_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            transport_poll_ms: 100,
            sensor_ms: 150,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

/// Persisted calibration location.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct Persistence {
    /// Path of the TOML calibration store; absent disables persistence.
    pub calibration_file: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub meters: Meters,
    pub window: Window,
    pub thresholds: Thresholds,
    pub dwell: Dwell,
    pub containers: Containers,
    pub sampling: Sampling,
    pub timeouts: Timeouts,
    pub logging: Logging,
    pub persistence: Persistence,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    /// Effective minimum dwell gate: explicit value or the window capacity.
    pub fn min_dwell_ticks(&self) -> usize {
        self.dwell.min_ticks.unwrap_or(self.window.capacity)
    }

    pub fn validate(&self) -> eyre::Result<()> {
        // Meters
        if self.meters.count == 0 {
            eyre::bail!("meters.count must be >= 1");
        }
        if self.meters.count > 100 {
            eyre::bail!("meters.count is unreasonably large (>100)");
        }
        if self.meters.status_period_ticks == 0 {
            eyre::bail!("meters.status_period_ticks must be >= 1");
        }

        // Window: the embedded target indexes the ring with a u8 cursor.
        if self.window.capacity == 0 {
            eyre::bail!("window.capacity must be >= 1");
        }
        if self.window.capacity > 255 {
            eyre::bail!("window.capacity must be <= 255");
        }
        if !self.window.seed_kg.is_finite() || self.window.seed_kg < 0.0 {
            eyre::bail!("window.seed_kg must be finite and >= 0");
        }

        // Thresholds
        for (name, v) in [
            ("thresholds.settle_variance", self.thresholds.settle_variance),
            (
                "thresholds.calibration_variance",
                self.thresholds.calibration_variance,
            ),
            ("thresholds.trust_variance", self.thresholds.trust_variance),
        ] {
            if !v.is_finite() || v <= 0.0 {
                eyre::bail!("{name} must be finite and > 0");
            }
        }
        if !self.thresholds.calibration_margin_kg.is_finite()
            || self.thresholds.calibration_margin_kg <= 0.0
        {
            eyre::bail!("thresholds.calibration_margin_kg must be finite and > 0");
        }

        // Dwell
        if let Some(min) = self.dwell.min_ticks
            && min == 0
        {
            eyre::bail!("dwell.min_ticks must be >= 1 when set");
        }
        if self.dwell.fill_anim_ticks == 0 {
            eyre::bail!("dwell.fill_anim_ticks must be >= 1");
        }
        if self.dwell.empty_pulse_ticks == 0 {
            eyre::bail!("dwell.empty_pulse_ticks must be >= 1");
        }
        if self.dwell.empty_pulses == 0 {
            eyre::bail!("dwell.empty_pulses must be >= 1");
        }

        // Containers
        if self.containers.corny_empty_kg <= 0.0 || self.containers.sanke_empty_kg <= 0.0 {
            eyre::bail!("container empty masses must be > 0");
        }
        if self.containers.corny_max_full_kg <= self.containers.corny_empty_kg {
            eyre::bail!("containers.corny_max_full_kg must exceed containers.corny_empty_kg");
        }

        // Sampling / timeouts
        if self.sampling.rate_hz == 0 {
            eyre::bail!("sampling.rate_hz must be > 0");
        }
        if self.timeouts.transport_poll_ms == 0 {
            eyre::bail!("timeouts.transport_poll_ms must be >= 1");
        }
        if self.timeouts.transport_poll_ms > 5_000 {
            eyre::bail!("timeouts.transport_poll_ms is unreasonably large (>5s)");
        }
        if self.timeouts.sensor_ms == 0 {
            eyre::bail!("timeouts.sensor_ms must be >= 1");
        }

        Ok(())
    }
}
