//! Direct-summation N-body simulation with double-buffered, data-parallel
//! integration.
//!
//! The crate is split along the seams of a single step:
//!
//! - [`body`] / [`params`] – state and run configuration
//! - [`integrator`] – the [`ForceIntegrator`] contract, the shared per-body
//!   math and the thread-pool substrate
//! - [`reference`] – sequential re-implementation used as ground truth
//! - [`simulation`] – ping/pong buffer ownership and the step loop
//! - [`verify`] – tolerance-based comparison of two trajectories
//! - [`present`] – the per-frame hand-off used by interactive runs
//! - [`device`] – compute device enumeration (`gpu` adds OpenCL devices)

// ─── Feature‑Module ───────────────────────────────────────────────────
#[cfg(feature = "metrics")]
pub mod metrics;
#[cfg(feature = "metrics")]
pub use metrics::{summary, ALLOCS, ALLOC_BYTES};

#[cfg(feature = "memtrace")]
pub mod memtracer;
#[cfg(feature = "memtrace")]
pub use memtracer::{flush_csv, start as trace_start, CopyToken, Dir};

#[cfg(feature = "opencl")]
pub mod gpu;
#[cfg(feature = "opencl")]
pub use gpu::{ClIntegrator, GpuBuffer, GpuEventGuard, InFlight, Queued, Ready};

// ─── Core ─────────────────────────────────────────────────────────────
pub mod body;
pub mod device;
pub mod integrator;
pub mod params;
pub mod present;
pub mod reference;
pub mod simulation;
pub mod verify;

pub use body::{Float4, ParticleState, Position, Velocity};
pub use device::{device_list, select_device, ComputeDevice, DeviceKind};
pub use integrator::{ForceIntegrator, ParallelIntegrator};
pub use params::{ForceForm, InitDistribution, SimulationParameters};
pub use present::{CancelFlag, Presenter, TextureRenderer};
pub use reference::{run_reference, ReferenceIntegrator};
pub use simulation::{BufferSlot, LoopState, RunStats, SimulationLoop};
pub use verify::{verify, VerificationResult, MAX_REPORTED_ERRORS};

// ─── Fehler‑Typ ───────────────────────────────────────────────────────
#[derive(thiserror::Error, Debug)]
pub enum NBodyError {
    #[error("OpenCL API error: {0}")]
    Api(i32),
    #[error("Invalid buffer size: {0}")]
    InvalidSize(usize),
    #[error("buffer length mismatch: expected {expected} elements, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("Invalid device index {index} of {available} (try '--list')")]
    InvalidDevice { index: usize, available: usize },
    #[error("kernel build failed:\n{0}")]
    Build(String),
    #[error("work-group size {wgsize} does not divide {count} bodies")]
    InvalidWorkGroup { count: usize, wgsize: usize },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("thread pool: {0}")]
    ThreadPool(String),
    #[error("simulation already terminated")]
    Terminated,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("snapshot: {0}")]
    Image(#[from] image::ImageError),
}

#[cfg(feature = "opencl")]
impl From<opencl3::error_codes::ClError> for NBodyError {
    #[inline]
    fn from(err: opencl3::error_codes::ClError) -> Self {
        NBodyError::Api(err.0)
    }
}
