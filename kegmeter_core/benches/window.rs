use criterion::{Criterion, black_box, criterion_group, criterion_main};
use kegmeter_core::StatsWindow;

// Synthetic draining trace: slow ramp down with additive white noise
fn synth_trace(n: usize, noise_amp: f64, seed: u32) -> Vec<f64> {
    // tiny PRNG
    let mut state = seed.max(1);
    let mut next_f64 = || {
        let mut x = state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        state = x;
        f64::from(x) / (f64::from(u32::MAX) + 1.0)
    };
    let mut v = Vec::with_capacity(n);
    for i in 0..n {
        let level = 20.0 - 16.0 * (i as f64 / n as f64);
        let noise = (next_f64() * 2.0 - 1.0) * noise_amp;
        v.push(level + noise);
    }
    v
}

pub fn bench_window_push(c: &mut Criterion) {
    let trace = synth_trace(10_000, 0.05, 42);

    let mut g = c.benchmark_group("window_push");
    for cap in [10usize, 50, 255] {
        g.bench_function(format!("cap_{cap}"), |b| {
            b.iter(|| {
                let mut w = StatsWindow::new(cap, 0.0);
                let mut acc = 0.0;
                for &v in &trace {
                    let (mean, var) = w.push(black_box(v));
                    acc += mean + var;
                }
                black_box(acc)
            });
        });
    }
    g.finish();
}

criterion_group!(benches, bench_window_push);
criterion_main!(benches);
