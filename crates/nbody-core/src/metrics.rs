//! Per-stage latency and allocation counters (`metrics` feature).

use once_cell::sync::Lazy;
use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Instant,
};

/* ───────────── Roh‑Latenzen ─────────────────────────── */

static TIMES: Lazy<Mutex<Vec<(&'static str, u128)>>> = Lazy::new(|| Mutex::new(Vec::new()));

/// `record("step", start)` after the stage has finished.
pub fn record(name: &'static str, start: Instant) {
    let dur = start.elapsed().as_micros();
    if let Ok(mut times) = TIMES.lock() {
        times.push((name, dur));
    }
}

/* ───────────── Buffer‑Allokationen ───────────────────── */

pub static ALLOCS: AtomicUsize = AtomicUsize::new(0);
pub static ALLOC_BYTES: AtomicUsize = AtomicUsize::new(0);

/// `(stage, samples, mean µs, p95 µs)` per recorded stage, drained.
pub fn drain_stats() -> Vec<(&'static str, usize, u128, u128)> {
    let mut map: HashMap<&'static str, Vec<u128>> = HashMap::new();
    if let Ok(mut times) = TIMES.lock() {
        for (name, us) in times.drain(..) {
            map.entry(name).or_default().push(us);
        }
    }

    let mut stats: Vec<_> = map
        .into_iter()
        .map(|(name, mut v)| {
            v.sort_unstable();
            let mean = v.iter().sum::<u128>() / v.len() as u128;
            let p95 = v[((v.len() * 95) / 100).saturating_sub(1)];
            (name, v.len(), mean, p95)
        })
        .collect();
    stats.sort_by_key(|s| s.0);
    stats
}

/* ───────────── Zusammenfassung ausgeben ─────────────── */

/// Call once at the end of `main`.
pub fn summary() {
    println!("── metrics summary ──");
    for (name, n, mean, p95) in drain_stats() {
        println!("{:<12} n={:>6}  mean={:>8} µs   p95={:>8} µs", name, n, mean, p95);
    }

    let allocs = ALLOCS.load(Ordering::Relaxed);
    let bytes = ALLOC_BYTES.load(Ordering::Relaxed);
    println!("buffers allocated: {}   ({:.2} MiB)", allocs, bytes as f64 / (1024.0 * 1024.0));
}
