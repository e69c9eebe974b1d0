//! The meter bank: owns every `KegMeter`, routes host commands to them,
//! ticks them in lockstep, and decides what telemetry goes back out.

use crate::meter::{KegMeter, MeterCfg, MeterOutput};
use kegmeter_config::{CalStore, Config, MeterCalibration};
use kegmeter_protocol::Message;
use std::collections::BTreeMap;

pub struct MeterBank {
    meters: Vec<KegMeter>,
    /// Last sample fed to each meter; reused when a sensor misses a tick.
    last_samples: Vec<f64>,
    status_period_ticks: usize,
    tick: usize,
    store: Option<CalStore>,
}

impl MeterBank {
    /// Build one meter per configured slot, restoring any persisted
    /// calibration. A missing or unreadable store file is not fatal.
    pub fn new(cfg: &Config, store: Option<CalStore>) -> Self {
        let meter_cfg = MeterCfg::from(cfg);
        let mut meters: Vec<KegMeter> = (0..cfg.meters.count)
            .map(|i| KegMeter::new(i, meter_cfg.clone()))
            .collect();

        if let Some(store) = &store {
            match store.load() {
                Ok(saved) => {
                    for (idx, cal) in saved {
                        if let Some(meter) = meters.get_mut(idx) {
                            meter.restore(&cal);
                        } else {
                            tracing::warn!(meter = idx, "persisted calibration for unknown meter");
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(%err, "could not load calibration store, starting fresh");
                }
            }
        }

        let last_samples = vec![cfg.window.seed_kg; cfg.meters.count];
        Self {
            meters,
            last_samples,
            status_period_ticks: cfg.meters.status_period_ticks as usize,
            tick: 0,
            store,
        }
    }

    pub fn len(&self) -> usize {
        self.meters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meters.is_empty()
    }

    pub fn meter(&self, index: usize) -> Option<&KegMeter> {
        self.meters.get(index)
    }

    /// Apply one host command. Commands for unknown meters and
    /// device-originated message kinds are dropped with a warning.
    pub fn apply(&mut self, msg: &Message) {
        let index = msg.meter();
        let Some(meter) = self.meters.get_mut(index) else {
            tracing::warn!(meter = index, ?msg, "command for out-of-range meter");
            return;
        };
        match *msg {
            Message::SetPercent { percent, .. } => meter.set_percent(percent),
            Message::SetRoutine { routine, .. } => meter.set_routine(routine),
            Message::CalibrateEmpty { .. } => meter.calibrate_empty(),
            Message::CalibrateNonEmpty { known_mass_kg, .. } => {
                meter.calibrate_non_empty(known_mass_kg);
            }
            Message::Reset { .. } => meter.reset(),
            Message::Measurement { .. } | Message::Status { .. } => {
                tracing::warn!(meter = index, ?msg, "ignoring device-originated message kind");
            }
        }
    }

    /// Advance every meter one tick and collect outbound frames.
    ///
    /// `samples` holds this tick's reading per meter; `None` reuses the
    /// previous value so a momentary sensor stall does not disturb the
    /// window. Returns measurement frames for settled percent changes plus
    /// a full status frame per meter every status period and on every state
    /// transition.
    pub fn tick_all(&mut self, samples: &[Option<f64>]) -> Vec<Message> {
        let mut out = Vec::new();
        self.tick = self.tick.wrapping_add(1);
        let periodic = self.status_period_ticks > 0 && self.tick % self.status_period_ticks == 0;
        let mut persist = false;

        for (i, meter) in self.meters.iter_mut().enumerate() {
            if let Some(Some(v)) = samples.get(i) {
                self.last_samples[i] = *v;
            }
            let events = meter.tick(self.last_samples[i]);

            if let Some(percent) = events.measured {
                out.push(Message::Measurement { meter: i, percent });
            }
            if events.transition.is_some() {
                persist = true;
                out.push(Message::Status {
                    meter: i,
                    fields: meter.status_fields(),
                });
            } else if periodic {
                out.push(Message::Status {
                    meter: i,
                    fields: meter.status_fields(),
                });
            }
        }

        // The periodic write also refreshes the remembered fill percent, so
        // a power cycle mid-keg resumes close to where it left off.
        if persist || periodic {
            self.persist();
        }
        out
    }

    pub fn outputs(&self) -> Vec<MeterOutput> {
        self.meters.iter().map(KegMeter::output).collect()
    }

    /// Best-effort write of every meter's calibration snapshot.
    fn persist(&self) {
        let Some(store) = &self.store else {
            return;
        };
        let snapshot: BTreeMap<usize, MeterCalibration> = self
            .meters
            .iter()
            .map(|m| (m.index(), m.snapshot()))
            .collect();
        if let Err(err) = store.save(&snapshot) {
            tracing::warn!(%err, "could not persist calibration store");
        }
    }
}
