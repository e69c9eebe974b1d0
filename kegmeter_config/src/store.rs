//! Persisted per-meter calibration, keyed by meter index.
//!
//! Replaces the desktop application's settings registry: read once at
//! startup, rewritten whenever a calibration completes. The file is plain
//! TOML so an operator can inspect or clear a single meter by hand.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Calibration values for one meter slot.
///
/// `empty_sensor_value` / `non_empty_sensor_value` are raw sensor readings
/// captured during the operator calibration routines; `non_empty_mass_kg`
/// is the operator-supplied reference mass for the two-point fit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterCalibration {
    pub empty_sensor_value: Option<f64>,
    pub non_empty_sensor_value: Option<f64>,
    pub non_empty_mass_kg: Option<f64>,
    /// Self-calibrated reference masses from the autonomous path.
    pub empty_mass_kg: Option<f64>,
    pub full_mass_kg: Option<f64>,
    /// Last reported fill percent, restored on startup so a power cycle
    /// does not reset a half-full keg to "uncalibrated".
    pub last_percent: f64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    meter: BTreeMap<String, MeterCalibration>,
}

/// TOML-backed key/value store of `MeterCalibration` by meter index.
#[derive(Debug, Clone)]
pub struct CalStore {
    path: PathBuf,
}

impl CalStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the store, returning an empty map when the file does not exist.
    pub fn load(&self) -> eyre::Result<BTreeMap<usize, MeterCalibration>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let text = std::fs::read_to_string(&self.path)
            .map_err(|e| eyre::eyre!("read calibration store {:?}: {}", self.path, e))?;
        let file: StoreFile = toml::from_str(&text)
            .map_err(|e| eyre::eyre!("parse calibration store {:?}: {}", self.path, e))?;

        let mut out = BTreeMap::new();
        for (key, cal) in file.meter {
            let idx: usize = key
                .parse()
                .map_err(|_| eyre::eyre!("calibration store has non-numeric meter key {key:?}"))?;
            out.insert(idx, cal);
        }
        Ok(out)
    }

    /// Write the whole store back. The map is small (one entry per meter),
    /// so a full rewrite on every calibration completion is fine.
    pub fn save(&self, meters: &BTreeMap<usize, MeterCalibration>) -> eyre::Result<()> {
        let file = StoreFile {
            meter: meters
                .iter()
                .map(|(idx, cal)| (idx.to_string(), *cal))
                .collect(),
        };
        let text = toml::to_string_pretty(&file)
            .map_err(|e| eyre::eyre!("serialize calibration store: {}", e))?;
        std::fs::write(&self.path, text)
            .map_err(|e| eyre::eyre!("write calibration store {:?}: {}", self.path, e))?;
        Ok(())
    }
}
