#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core keg metering logic (hardware-agnostic).
//!
//! Everything a bank of fill-level meters needs, short of real hardware:
//! sensors are reached through `kegmeter_traits::LoadCell` and the host link
//! through `kegmeter_traits::Transport`.
//!
//! - **Window**: sliding sample window with O(1) mean/variance (`window`)
//! - **Meter**: per-slot calibration/measurement state machine (`meter`)
//! - **Orchestrator**: the meter bank, command routing, telemetry (`orchestrator`)
//! - **Sampler**: background per-sensor reading threads (`sampler`)
//! - **Runner**: the paced control loop tying it all together (`runner`)

pub mod error;
pub mod meter;
pub mod mocks;
pub mod orchestrator;
pub mod runner;
pub mod sampler;
pub mod window;

pub use error::{BuildError, Result};
pub use meter::{ContainerKind, KegMeter, MeterCfg, MeterOutput, MeterState, TickEvents};
pub use orchestrator::MeterBank;
pub use runner::Runner;
pub use sampler::Sampler;
pub use window::StatsWindow;
