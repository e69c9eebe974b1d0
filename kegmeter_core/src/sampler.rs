//! Background load-cell sampling.
//!
//! One thread per sensor owns the `LoadCell`, publishes the freshest reading
//! over a bounded(1) channel, and records a last-ok timestamp so the control
//! loop can notice a stalled sensor. The thread is joined on drop.

use crossbeam_channel as xch;
use kegmeter_traits::LoadCell;
use kegmeter_traits::clock::Clock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

pub struct Sampler {
    rx: xch::Receiver<f64>,
    last_ok: Arc<AtomicU64>,
    epoch: Instant,
    shutdown: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl Sampler {
    /// Spawn a paced sampler reading at roughly `hz`.
    pub fn spawn<S: LoadCell + Send + 'static, C: Clock + Send + Sync + 'static>(
        mut cell: S,
        hz: u32,
        timeout: Duration,
        clock: C,
    ) -> Self {
        let (tx, rx) = xch::bounded(1);
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let last_ok = Arc::new(AtomicU64::new(0));
        let last_ok_thread = last_ok.clone();
        let period = Duration::from_micros(1_000_000 / u64::from(hz.max(1)));
        let epoch = clock.now();

        let join_handle = std::thread::spawn(move || {
            loop {
                if shutdown_thread.load(Ordering::Relaxed) {
                    break;
                }
                match cell.read(timeout) {
                    Ok(v) => {
                        // Never block on a slow consumer: a full slot just
                        // means the previous reading has not been drained yet.
                        match tx.try_send(v) {
                            Ok(()) | Err(xch::TrySendError::Full(_)) => {}
                            // Consumer gone means we are done.
                            Err(xch::TrySendError::Disconnected(_)) => break,
                        }
                        last_ok_thread.store(clock.ms_since(epoch), Ordering::Relaxed);
                    }
                    Err(err) => {
                        // Transient; the loop's stall tracking handles it.
                        tracing::trace!(%err, "load cell read failed");
                    }
                }
                if shutdown_thread.load(Ordering::Relaxed) {
                    break;
                }
                clock.sleep(period);
            }
            tracing::trace!("sampler thread exiting");
        });

        Self {
            rx,
            last_ok,
            epoch,
            shutdown,
            join_handle: Some(join_handle),
        }
    }

    /// Freshest reading since the last call, if any arrived.
    pub fn latest(&self) -> Option<f64> {
        self.rx.try_iter().last()
    }

    /// Milliseconds since the last successful read, against a live clock.
    pub fn stalled_for_now(&self) -> u64 {
        let now_ms = {
            let dur = Instant::now().saturating_duration_since(self.epoch);
            (dur.as_millis().min(u128::from(u64::MAX))) as u64
        };
        now_ms.saturating_sub(self.last_ok.load(Ordering::Relaxed))
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        // Worst case the join waits out one blocking read (sensor timeout).
        if let Some(handle) = self.join_handle.take() {
            if let Err(e) = handle.join() {
                tracing::warn!(?e, "sampler thread panicked during shutdown");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{NoopLoadCell, ScriptedLoadCell};
    use kegmeter_traits::clock::test_clock::TestClock;

    #[test]
    fn delivers_latest_reading_and_joins_on_drop() {
        let cell = ScriptedLoadCell::new(vec![1.0, 2.0, 3.0]);
        let sampler = Sampler::spawn(cell, 1000, Duration::from_millis(10), TestClock::new());
        let deadline = Instant::now() + Duration::from_secs(2);
        let mut got = None;
        while got.is_none() && Instant::now() < deadline {
            got = sampler.latest();
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(got.is_some(), "no reading arrived");
        drop(sampler); // must not hang
    }

    #[test]
    fn erroring_cell_never_moves_the_last_ok_stamp() {
        let sampler = Sampler::spawn(
            NoopLoadCell,
            1000,
            Duration::from_millis(1),
            TestClock::new(),
        );
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(sampler.latest(), None);
        // Every read failed, so the stall clock keeps running.
        assert!(sampler.stalled_for_now() >= 10);
        drop(sampler);
    }
}
