//! The control loop: samplers in, frames out.
//!
//! Each iteration feeds the freshest sample per sensor to the meter bank,
//! ships the resulting frames to the host, then drains inbound bytes and
//! applies any decoded commands. Commands therefore take effect on the tick
//! after they arrive, never mid-tick.

use crate::error::{BuildError, Result as CoreResult};
use crate::orchestrator::MeterBank;
use crate::sampler::Sampler;
use kegmeter_config::{CalStore, Config};
use kegmeter_protocol::{FrameDecoder, encode};
use kegmeter_traits::clock::{Clock, MonotonicClock};
use kegmeter_traits::{LoadCell, Transport};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Stall threshold: four sensor timeouts, but never less than two sample
/// periods so one missed reading does not trip it.
#[inline]
fn stall_threshold_ms(sensor_timeout_ms: u64, period_ms: u64) -> u64 {
    std::cmp::max(
        sensor_timeout_ms.saturating_mul(4),
        period_ms.saturating_mul(2),
    )
    .max(1)
}

pub struct Runner<T: Transport> {
    bank: MeterBank,
    samplers: Vec<Sampler>,
    stalled: Vec<bool>,
    transport: T,
    decoder: FrameDecoder,
    period: Duration,
    poll: Duration,
    stall_ms: u64,
    shutdown: Arc<AtomicBool>,
}

impl<T: Transport> Runner<T> {
    /// Wire up the bank, one sampler per load cell, and the host link.
    /// The number of cells must match the configured meter count.
    pub fn new(
        cfg: &Config,
        cells: Vec<Box<dyn LoadCell + Send>>,
        transport: T,
        store: Option<CalStore>,
        shutdown: Arc<AtomicBool>,
    ) -> CoreResult<Self> {
        if cells.is_empty() {
            return Err(BuildError::MissingLoadCells.into());
        }
        if cells.len() != cfg.meters.count {
            return Err(BuildError::InvalidConfig("one load cell per meter required").into());
        }

        let sensor_timeout = Duration::from_millis(cfg.timeouts.sensor_ms);
        let samplers: Vec<Sampler> = cells
            .into_iter()
            .map(|cell| {
                Sampler::spawn(cell, cfg.sampling.rate_hz, sensor_timeout, MonotonicClock::new())
            })
            .collect();

        let period_ms = 1_000 / u64::from(cfg.sampling.rate_hz.max(1));
        Ok(Self {
            stalled: vec![false; samplers.len()],
            bank: MeterBank::new(cfg, store),
            samplers,
            transport,
            decoder: FrameDecoder::new(),
            period: Duration::from_millis(period_ms.max(1)),
            poll: Duration::from_millis(cfg.timeouts.transport_poll_ms),
            stall_ms: stall_threshold_ms(cfg.timeouts.sensor_ms, period_ms),
            shutdown,
        })
    }

    pub fn bank(&self) -> &MeterBank {
        &self.bank
    }

    /// Run until the shutdown flag is raised, or for `max_ticks` iterations
    /// when one is given (simulation and test runs).
    pub fn run(&mut self, max_ticks: Option<u64>) -> CoreResult<()> {
        let clock = MonotonicClock::new();
        let mut ticks: u64 = 0;
        tracing::info!(meters = self.bank.len(), "meter loop starting");

        while !self.shutdown.load(Ordering::Relaxed) {
            let started = clock.now();
            self.step();

            ticks += 1;
            if let Some(max) = max_ticks {
                if ticks >= max {
                    break;
                }
            }

            let spent = clock.now().saturating_duration_since(started);
            if spent < self.period {
                clock.sleep(self.period - spent);
            }
        }

        tracing::info!(ticks, "meter loop stopped");
        Ok(())
    }

    /// One loop iteration: tick, transmit, then receive.
    pub fn step(&mut self) {
        let mut samples = Vec::with_capacity(self.samplers.len());
        let mut stalls = Vec::with_capacity(self.samplers.len());
        for s in &self.samplers {
            samples.push(s.latest());
            stalls.push(s.stalled_for_now());
        }
        for (i, stalled_for) in stalls.into_iter().enumerate() {
            self.watch_stall(i, samples[i].is_some(), stalled_for);
        }

        for msg in self.bank.tick_all(&samples) {
            if let Err(err) = self.transport.send(&encode(&msg)) {
                // The host link is best effort; metering continues without it.
                tracing::warn!(%err, "could not send frame to host");
            }
        }

        match self.transport.recv(self.poll) {
            Ok(Some(bytes)) => {
                self.decoder.extend(&bytes);
                while let Some(msg) = self.decoder.next_message() {
                    self.bank.apply(&msg);
                }
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(%err, "transport receive failed");
            }
        }
    }

    fn watch_stall(&mut self, index: usize, fresh: bool, stalled_for: u64) {
        if fresh {
            if self.stalled[index] {
                tracing::info!(meter = index, "sensor recovered");
                self.stalled[index] = false;
            }
        } else if stalled_for > self.stall_ms && !self.stalled[index] {
            tracing::warn!(meter = index, stalled_ms = stalled_for, "sensor stalled");
            self.stalled[index] = true;
        }
    }
}
