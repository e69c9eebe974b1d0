//! Simulated load cell: one full keg lifecycle with sensor noise.
//!
//! The profile is read-count driven, so it plays out at whatever rate the
//! sampler polls: rest empty, keg placed, hold full, drain linearly, rest
//! empty again.

use kegmeter_traits::LoadCell;
use std::time::Duration;

pub struct SimLoadCell {
    empty_kg: f64,
    full_kg: f64,
    rest_reads: u64,
    hold_reads: u64,
    drain_reads: u64,
    noise_amp: f64,
    reads: u64,
    rng: u32,
}

impl SimLoadCell {
    pub fn new(index: usize, start_full: bool) -> Self {
        Self {
            empty_kg: 4.0,
            full_kg: 20.0,
            // Stagger the slots a little so the bank is not in lockstep.
            rest_reads: if start_full { 0 } else { 400 + 25 * index as u64 },
            hold_reads: 600,
            drain_reads: 3_000,
            noise_amp: 0.01,
            reads: 0,
            rng: 0x9e37 ^ (index as u32 + 1),
        }
    }

    fn noise(&mut self) -> f64 {
        let mut x = self.rng;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.rng = x;
        (f64::from(x) / (f64::from(u32::MAX) + 1.0) * 2.0 - 1.0) * self.noise_amp
    }

    fn level(&self) -> f64 {
        let t = self.reads;
        if t < self.rest_reads {
            return self.empty_kg;
        }
        let t = t - self.rest_reads;
        if t < self.hold_reads {
            return self.full_kg;
        }
        let t = t - self.hold_reads;
        if t < self.drain_reads {
            let frac = t as f64 / self.drain_reads as f64;
            return self.full_kg - (self.full_kg - self.empty_kg) * frac;
        }
        self.empty_kg
    }
}

impl LoadCell for SimLoadCell {
    fn read(
        &mut self,
        _timeout: Duration,
    ) -> Result<f64, Box<dyn std::error::Error + Send + Sync>> {
        let v = self.level() + self.noise();
        self.reads += 1;
        Ok(v)
    }
}
