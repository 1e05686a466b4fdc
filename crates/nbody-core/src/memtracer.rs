//! Transfer/step timeline written as CSV (`memtrace` feature).

use once_cell::sync::Lazy;
use std::{fs::File, io::{BufWriter, Write}, path::Path, sync::Mutex, time::Instant};

/// Transfer direction or step event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dir {
    H2D,
    D2H,
    Step,
}

impl Dir {
    fn as_str(self) -> &'static str {
        match self {
            Dir::H2D => "H2D",
            Dir::D2H => "D2H",
            Dir::Step => "Step",
        }
    }
}

/// global zero point, set by the first `start()`
static T0: Lazy<Instant> = Lazy::new(Instant::now);

/// (start, end, bytes, dir, idle)
static LOG: Lazy<Mutex<Vec<(u128, u128, usize, &'static str, u128)>>> = Lazy::new(|| Mutex::new(Vec::new()));

pub struct CopyToken {
    start: Instant,
    bytes: usize,
    dir: Dir,
}

pub fn start(dir: Dir, bytes: usize) -> CopyToken {
    Lazy::force(&T0);
    CopyToken { start: Instant::now(), bytes, dir }
}

impl CopyToken {
    /// Appends one timeline row including the idle gap since the previous one.
    pub fn finish(self) {
        let t0 = *T0;
        let s = self.start.duration_since(t0).as_micros();
        let e = Instant::now().duration_since(t0).as_micros();

        if let Ok(mut log) = LOG.lock() {
            let prev_end = log.last().map(|entry| entry.1).unwrap_or(0);
            let idle = s.saturating_sub(prev_end);
            log.push((s, e, self.bytes, self.dir.as_str(), idle));
        }
    }
}

/// Number of rows recorded so far.
pub fn recorded() -> usize {
    LOG.lock().map(|log| log.len()).unwrap_or(0)
}

/// Writes the timeline to `path`; call once at the end of the program.
pub fn flush_csv(path: &Path) -> std::io::Result<()> {
    let mut f = BufWriter::new(File::create(path)?);
    writeln!(f, "t_start_us,t_end_us,bytes,dir,idle_us")?;
    if let Ok(log) = LOG.lock() {
        for (s, e, b, d, idle) in log.iter() {
            writeln!(f, "{},{},{},{},{}", s, e, b, d, idle)?;
        }
    }
    f.flush()
}
