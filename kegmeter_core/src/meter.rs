//! Per-meter calibration and measurement state machine.
//!
//! One `KegMeter` tracks one physical load sensor + container slot. Each
//! control-loop tick feeds it the latest load sample; it pushes the sample
//! through its stats window and walks the empty -> calibrating -> full ->
//! draining -> empty lifecycle, producing a fill percent and a display
//! routine tag for the presentation layer.
//!
//! Nothing in here can fail at runtime: bad inputs clamp, regressions are
//! state transitions, and untrustworthy (high-variance) readings simply
//! skip the percent update for that tick.

use crate::window::StatsWindow;
use kegmeter_config::{Config, MeterCalibration};
use kegmeter_protocol::{Routine, StatusFields};

/// States of the calibration/measurement lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeterState {
    /// Learning the no-load sensor level (also the autonomous startup state).
    EmptyCalibration,
    /// Learning the sensor level under an operator-supplied known mass.
    NonEmptyCalibration,
    /// Resting: no keg, or an empty keg, on the sensor.
    Empty,
    /// Mass appeared; waiting for the reading to settle into a full point.
    Calibrating,
    /// Full point captured; fill animation runs before measuring starts.
    Calibrated,
    /// Normal draining operation, 100% down to 0%.
    Measuring,
    /// The meter just hit ~0%; pulse animation before resting empty.
    JustBecameEmpty,
}

/// Inferred container class, from the calibrated full mass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Corny19L,
    Sanke50L,
}

/// Tunables for one meter. Derived from the crate-wide `Config`; every
/// threshold here varied across hardware revisions and must stay tunable.
#[derive(Debug, Clone)]
pub struct MeterCfg {
    pub window_capacity: usize,
    pub seed_kg: f64,
    /// Settle variance for empty calibration and rest detection.
    pub settle_variance: f64,
    /// Convergence variance for keg (full-point) calibration.
    pub calibration_variance: f64,
    /// Max variance at which a measurement may move the meter.
    pub trust_variance: f64,
    /// Mass above the empty point that means a keg was placed.
    pub calibration_margin_kg: f64,
    /// Minimum ticks in a calibration state before capture.
    pub min_dwell_ticks: usize,
    pub fill_anim_ticks: usize,
    pub empty_pulse_ticks: usize,
    pub empty_pulses: usize,
    pub corny_empty_kg: f64,
    pub sanke_empty_kg: f64,
    pub corny_max_full_kg: f64,
}

impl Default for MeterCfg {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for MeterCfg {
    fn from(cfg: &Config) -> Self {
        Self {
            window_capacity: cfg.window.capacity,
            seed_kg: cfg.window.seed_kg,
            settle_variance: cfg.thresholds.settle_variance,
            calibration_variance: cfg.thresholds.calibration_variance,
            trust_variance: cfg.thresholds.trust_variance,
            calibration_margin_kg: cfg.thresholds.calibration_margin_kg,
            min_dwell_ticks: cfg.min_dwell_ticks(),
            fill_anim_ticks: cfg.dwell.fill_anim_ticks,
            empty_pulse_ticks: cfg.dwell.empty_pulse_ticks,
            empty_pulses: cfg.dwell.empty_pulses,
            corny_empty_kg: cfg.containers.corny_empty_kg,
            sanke_empty_kg: cfg.containers.sanke_empty_kg,
            corny_max_full_kg: cfg.containers.corny_max_full_kg,
        }
    }
}

/// Presentation tuple consumed by the LED layer and the host UI.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeterOutput {
    pub state: MeterState,
    pub fill_percent: f64,
    pub calibration_progress: f64,
    pub routine: Routine,
}

/// What one tick produced, for the orchestrator's telemetry decisions.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TickEvents {
    /// New state, when this tick transitioned.
    pub transition: Option<MeterState>,
    /// Settled percent update, when one happened.
    pub measured: Option<f64>,
}

#[derive(Debug)]
pub struct KegMeter {
    index: usize,
    cfg: MeterCfg,
    state: MeterState,
    window: StatsWindow,
    /// Ticks spent in the current state (minimum-dwell gate).
    dwell: usize,
    last_percent: f64,
    last_load_kg: f64,
    /// Calibrated reference masses; negative means unset.
    empty_mass_kg: f64,
    full_mass_kg: f64,
    kind: ContainerKind,
    // Operator-assisted sensor mapping (raw sensor units).
    empty_sensor_value: Option<f64>,
    non_empty_sensor_value: Option<f64>,
    non_empty_mass_kg: f64,
    pending_non_empty_mass: Option<f64>,
    calibration_progress: f64,
    fill_anim_idx: usize,
    pulse_tick: usize,
    pulse_count: usize,
    /// Host-ordered routine, shown until the next state transition.
    routine_override: Option<Routine>,
}

impl KegMeter {
    pub fn new(index: usize, cfg: MeterCfg) -> Self {
        let window = StatsWindow::new(cfg.window_capacity, cfg.seed_kg);
        Self {
            index,
            cfg,
            state: MeterState::EmptyCalibration,
            window,
            dwell: 0,
            last_percent: 0.0,
            last_load_kg: 0.0,
            empty_mass_kg: -1.0,
            full_mass_kg: -1.0,
            kind: ContainerKind::Corny19L,
            empty_sensor_value: None,
            non_empty_sensor_value: None,
            non_empty_mass_kg: 0.0,
            pending_non_empty_mass: None,
            calibration_progress: 0.0,
            fill_anim_idx: 0,
            pulse_tick: 0,
            pulse_count: 0,
            routine_override: None,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn state(&self) -> MeterState {
        self.state
    }

    pub fn fill_percent(&self) -> f64 {
        self.last_percent
    }

    pub fn empty_mass_kg(&self) -> Option<f64> {
        (self.empty_mass_kg >= 0.0).then_some(self.empty_mass_kg)
    }

    pub fn full_mass_kg(&self) -> Option<f64> {
        (self.full_mass_kg >= 0.0).then_some(self.full_mass_kg)
    }

    pub fn container_kind(&self) -> ContainerKind {
        self.kind
    }

    /// Restore persisted calibration. A meter with a remembered positive
    /// percent and both reference masses resumes measuring; everything else
    /// starts over from empty calibration.
    pub fn restore(&mut self, cal: &MeterCalibration) {
        self.empty_sensor_value = cal.empty_sensor_value;
        self.non_empty_sensor_value = cal.non_empty_sensor_value;
        self.non_empty_mass_kg = cal.non_empty_mass_kg.unwrap_or(0.0);
        if let Some(m) = cal.empty_mass_kg {
            self.empty_mass_kg = m;
        }
        if let Some(m) = cal.full_mass_kg {
            self.full_mass_kg = m;
            self.kind = self.cfg.classify(m, self.kind);
        }
        if cal.last_percent > 0.0 && self.empty_mass_kg >= 0.0 && self.full_mass_kg >= 0.0 {
            self.last_percent = cal.last_percent.clamp(0.0, 1.0);
            self.enter(MeterState::Measuring);
        } else if self.empty_mass_kg >= 0.0 {
            self.enter(MeterState::Empty);
        }
        tracing::info!(
            meter = self.index,
            state = ?self.state,
            percent = self.last_percent,
            "restored persisted calibration"
        );
    }

    /// Snapshot for the persisted calibration store.
    pub fn snapshot(&self) -> MeterCalibration {
        MeterCalibration {
            empty_sensor_value: self.empty_sensor_value,
            non_empty_sensor_value: self.non_empty_sensor_value,
            non_empty_mass_kg: (self.non_empty_mass_kg > 0.0).then_some(self.non_empty_mass_kg),
            empty_mass_kg: self.empty_mass_kg(),
            full_mass_kg: self.full_mass_kg(),
            last_percent: self.last_percent,
        }
    }

    /// Map a raw sensor value through the operator calibration, when active.
    ///
    /// Identity while a calibration state owns the window, so the captured
    /// means stay in raw sensor units. Two-point mapping needs both capture
    /// points and a positive span; otherwise the raw value passes through.
    fn calibrated_load(&self, raw: f64) -> f64 {
        if matches!(
            self.state,
            MeterState::EmptyCalibration | MeterState::NonEmptyCalibration
        ) {
            return raw;
        }
        let (Some(empty_sv), Some(non_empty_sv)) =
            (self.empty_sensor_value, self.non_empty_sensor_value)
        else {
            return raw;
        };
        let span = non_empty_sv - empty_sv;
        if span <= 0.0 || self.non_empty_mass_kg <= 0.0 {
            return raw;
        }
        (raw - empty_sv) * self.non_empty_mass_kg / span
    }

    /// Feed one load sample and advance the state machine.
    pub fn tick(&mut self, raw_load_kg: f64) -> TickEvents {
        let load = self.calibrated_load(raw_load_kg.max(0.0));
        self.last_load_kg = load;
        let (mean, variance) = self.window.push(load);
        self.dwell += 1;

        let mut events = TickEvents::default();
        let margin = self.cfg.calibration_margin_kg;

        match self.state {
            MeterState::EmptyCalibration => {
                if variance <= self.cfg.settle_variance && self.dwell >= self.cfg.min_dwell_ticks {
                    // Window holds raw values here; the mean is both the
                    // sensor offset and the empty reference mass.
                    self.empty_sensor_value = Some(mean);
                    self.empty_mass_kg = mean;
                    tracing::info!(
                        meter = self.index,
                        empty_mass_kg = mean,
                        "empty calibration complete"
                    );
                    events.transition = Some(self.enter(MeterState::Empty));
                }
            }

            MeterState::NonEmptyCalibration => {
                if variance <= self.cfg.calibration_variance
                    && self.dwell >= self.cfg.min_dwell_ticks
                {
                    let known_mass = self.pending_non_empty_mass.take().unwrap_or(0.0);
                    self.non_empty_sensor_value = Some(mean);
                    self.non_empty_mass_kg = known_mass;
                    if self.empty_sensor_value.is_some_and(|sv| mean > sv) && known_mass > 0.0 {
                        // The two-point mapping is live from the next sample
                        // on; in mapped units the empty point reads zero.
                        self.empty_mass_kg = 0.0;
                        self.window.refill(known_mass);
                        tracing::info!(
                            meter = self.index,
                            sensor_value = mean,
                            known_mass_kg = known_mass,
                            "non-empty calibration complete"
                        );
                    } else {
                        tracing::warn!(
                            meter = self.index,
                            "non-empty calibration unusable without a lower empty point"
                        );
                    }
                    events.transition = Some(self.enter(MeterState::Empty));
                }
            }

            MeterState::Empty => {
                // Wait for someone to drop a full (or partial) keg on the
                // sensor: settled reading well above the empty point.
                if self.empty_mass_kg >= 0.0
                    && variance <= self.cfg.settle_variance
                    && mean >= self.empty_mass_kg + margin
                {
                    events.transition = Some(self.enter(MeterState::Calibrating));
                }
            }

            MeterState::Calibrating => {
                if mean < self.empty_mass_kg + margin {
                    // The mass went away again; abort.
                    events.transition = Some(self.enter(MeterState::Empty));
                } else {
                    let raw_progress = self.dwell as f64 / self.cfg.min_dwell_ticks as f64;
                    // Show at least a sliver of progress no matter what.
                    self.calibration_progress = raw_progress.clamp(0.1, 1.0);
                    if variance <= self.cfg.calibration_variance && raw_progress >= 1.0 {
                        events.transition = Some(self.enter(MeterState::Calibrated));
                    }
                }
            }

            MeterState::Calibrated => {
                if self.full_mass_kg < self.empty_mass_kg + margin
                    || mean < 0.9 * self.full_mass_kg
                {
                    // Calibration captured something implausible; distrust it.
                    tracing::warn!(
                        meter = self.index,
                        full_mass_kg = self.full_mass_kg,
                        mean,
                        "discarding implausible keg calibration"
                    );
                    events.transition = Some(self.enter(MeterState::Empty));
                } else {
                    self.fill_anim_idx += 1;
                    if self.fill_anim_idx >= self.cfg.fill_anim_ticks {
                        self.last_percent = 1.0;
                        events.transition = Some(self.enter(MeterState::Measuring));
                    }
                }
            }

            MeterState::Measuring => {
                if variance <= self.cfg.trust_variance {
                    let candidate = lerp_clamped(mean, self.empty_mass_kg, self.full_mass_kg);
                    let mut next = 0.99 * self.last_percent + 0.01 * candidate;
                    // The meter only winds down; upward jitter never shows.
                    if next > self.last_percent {
                        next = self.last_percent;
                    }
                    if next < self.last_percent {
                        events.measured = Some(next);
                    }
                    self.last_percent = next;
                }
                if self.last_percent < 0.01 {
                    self.last_percent = 0.0;
                    events.transition = Some(self.enter(MeterState::JustBecameEmpty));
                }
            }

            MeterState::JustBecameEmpty => {
                self.pulse_tick += 1;
                if self.pulse_tick >= self.cfg.empty_pulse_ticks {
                    self.pulse_tick = 0;
                    self.pulse_count += 1;
                }
                // Pulses count on/off half-cycles; wait out the window too so
                // the empty reference reflects the keg-less sensor again.
                if self.pulse_count > 2 * self.cfg.empty_pulses
                    && self.dwell >= self.cfg.min_dwell_ticks
                {
                    events.transition = Some(self.enter(MeterState::Empty));
                }
            }
        }

        events
    }

    /// State entry actions. Returns the new state for event reporting.
    fn enter(&mut self, next: MeterState) -> MeterState {
        tracing::debug!(meter = self.index, from = ?self.state, to = ?next, "state transition");
        self.dwell = 0;
        self.routine_override = None;
        match next {
            MeterState::EmptyCalibration | MeterState::NonEmptyCalibration => {
                self.last_percent = 0.0;
            }
            MeterState::Empty => {
                self.last_percent = 0.0;
            }
            MeterState::Calibrating => {
                self.calibration_progress = 0.0;
            }
            MeterState::Calibrated => {
                // Capture happens on entry, matching the reference design:
                // the settled window mean is the full-keg reference.
                self.fill_anim_idx = 0;
                self.full_mass_kg = self.window.mean();
                self.kind = self.cfg.classify(self.full_mass_kg, self.kind);
                tracing::info!(
                    meter = self.index,
                    full_mass_kg = self.full_mass_kg,
                    kind = ?self.kind,
                    "keg calibration complete"
                );
            }
            MeterState::Measuring => {}
            MeterState::JustBecameEmpty => {
                self.pulse_tick = 0;
                self.pulse_count = 0;
            }
        }
        self.state = next;
        next
    }

    /// Force the empty-point calibration routine, from any state.
    pub fn calibrate_empty(&mut self) {
        self.enter(MeterState::EmptyCalibration);
    }

    /// Force the known-mass calibration routine. Non-positive masses are
    /// rejected (logged, no state change).
    pub fn calibrate_non_empty(&mut self, known_mass_kg: f64) {
        if !(known_mass_kg.is_finite() && known_mass_kg > 0.0) {
            tracing::warn!(
                meter = self.index,
                known_mass_kg,
                "ignoring non-empty calibration with invalid mass"
            );
            return;
        }
        self.pending_non_empty_mass = Some(known_mass_kg);
        self.enter(MeterState::NonEmptyCalibration);
    }

    /// Clear all calibration state and rest empty.
    ///
    /// The empty point is gone afterwards, so keg detection is disarmed:
    /// the meter rests until the host starts a calibration routine
    /// (`calibrate_empty` or `calibrate_non_empty`).
    pub fn reset(&mut self) {
        self.empty_mass_kg = -1.0;
        self.full_mass_kg = -1.0;
        self.empty_sensor_value = None;
        self.non_empty_sensor_value = None;
        self.non_empty_mass_kg = 0.0;
        self.pending_non_empty_mass = None;
        self.kind = ContainerKind::Corny19L;
        self.last_percent = 0.0;
        self.window.refill(self.cfg.seed_kg);
        self.enter(MeterState::Empty);
    }

    /// Host override of the displayed percent, clamped to [0,1].
    pub fn set_percent(&mut self, percent: f64) {
        let p = if percent.is_finite() { percent } else { 0.0 };
        self.last_percent = p.clamp(0.0, 1.0);
    }

    /// Host override of the display routine; holds until the next transition.
    pub fn set_routine(&mut self, routine: Routine) {
        self.routine_override = Some(routine);
    }

    /// Presentation tuple for the current tick.
    pub fn output(&self) -> MeterOutput {
        let routine = self.routine_override.unwrap_or(match self.state {
            MeterState::EmptyCalibration
            | MeterState::NonEmptyCalibration
            | MeterState::Empty => Routine::Off,
            MeterState::Calibrating => Routine::Calibrating,
            MeterState::Calibrated => Routine::Filling,
            MeterState::Measuring => Routine::Measuring,
            MeterState::JustBecameEmpty => Routine::BecameEmpty,
        });
        let fill_percent = match self.state {
            // During the fill animation the displayed level sweeps 0 -> 1.
            MeterState::Calibrated => {
                (self.fill_anim_idx as f64 / self.cfg.fill_anim_ticks as f64).clamp(0.0, 1.0)
            }
            _ => self.last_percent,
        };
        MeterOutput {
            state: self.state,
            fill_percent,
            calibration_progress: match self.state {
                MeterState::Calibrating => self.calibration_progress,
                _ => 0.0,
            },
            routine,
        }
    }

    /// Full telemetry snapshot for a status frame.
    pub fn status_fields(&self) -> StatusFields {
        StatusFields {
            percent: Some(self.last_percent),
            full_mass_kg: self.full_mass_kg(),
            empty_mass_kg: self.empty_mass_kg(),
            load_kg: Some(self.last_load_kg),
            variance: Some(self.window.variance()),
        }
    }
}

impl MeterCfg {
    /// Container classification with a dead band: masses between the 50 L
    /// empty weight and the heaviest full 19 L keg keep the current guess.
    fn classify(&self, full_mass_kg: f64, current: ContainerKind) -> ContainerKind {
        if full_mass_kg > self.corny_max_full_kg {
            ContainerKind::Sanke50L
        } else if full_mass_kg <= self.sanke_empty_kg {
            ContainerKind::Corny19L
        } else {
            current
        }
    }
}

fn lerp_clamped(x: f64, x0: f64, x1: f64) -> f64 {
    if x1 <= x0 {
        return 0.0;
    }
    ((x - x0) / (x1 - x0)).clamp(0.0, 1.0)
}

#[cfg(test)]
mod lerp_tests {
    use super::lerp_clamped;

    #[test]
    fn clamps_both_ends() {
        assert_eq!(lerp_clamped(3.0, 4.0, 20.0), 0.0);
        assert_eq!(lerp_clamped(25.0, 4.0, 20.0), 1.0);
    }

    #[test]
    fn midpoint() {
        let v = lerp_clamped(12.0, 4.0, 20.0);
        assert!((v - 0.5).abs() < 1e-12);
    }

    #[test]
    fn degenerate_span_reads_empty() {
        assert_eq!(lerp_clamped(5.0, 4.0, 4.0), 0.0);
    }
}
