//! Double-buffered step loop.
//!
//! The loop owns two position slots and one velocity buffer. Each step reads
//! the current slot, writes the other one and then flips `current`: a role
//! exchange, never a copy. Velocities are updated in place because a body only
//! ever reads its own previous velocity.
//!
//! ```text
//!   Initializing ──► Stepping ──► Stepping ... ──► Terminating
//!                       │  integrate(current → next)
//!                       │  swap roles
//!                       └─ [interactive] publish current, poll cancel
//! ```

use std::time::{Duration, Instant};

use bytemuck::Zeroable;

use crate::body::{Float4, ParticleState, Position, Velocity};
use crate::integrator::ForceIntegrator;
use crate::params::SimulationParameters;
use crate::present::Presenter;
use crate::NBodyError;

#[cfg(feature = "metrics")]
use crate::metrics::record;
#[cfg(feature = "metrics")]
use std::sync::atomic::Ordering;

#[cfg(feature = "memtrace")]
use crate::memtracer::{start as trace_start, Dir};

/// One of the two position buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferSlot {
    A,
    B,
}

impl BufferSlot {
    #[inline(always)]
    pub fn other(self) -> Self {
        match self {
            BufferSlot::A => BufferSlot::B,
            BufferSlot::B => BufferSlot::A,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Initializing,
    Stepping,
    Terminating,
}

/// Wall-clock summary of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunStats {
    pub steps: u64,
    pub elapsed: Duration,
}

impl RunStats {
    pub fn millis(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1e3
    }

    /// Steps per second; 0 for an empty run.
    pub fn fps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 { self.steps as f64 / secs } else { 0.0 }
    }
}

pub struct SimulationLoop<I: ForceIntegrator> {
    integrator: I,
    params: SimulationParameters,
    positions: [I::Buffer; 2],
    velocities: I::Buffer,
    current: BufferSlot,
    state: LoopState,
    steps: u64,
    // host copy of the current slot handed to presenters
    staging: Vec<Position>,
}

impl<I: ForceIntegrator> SimulationLoop<I> {
    /// Uploads `initial` into slot A and the velocity buffer; slot B starts as
    /// scratch. The loop stays `Initializing` until the first step is
    /// dispatched.
    pub fn new(mut integrator: I, params: SimulationParameters, initial: &ParticleState) -> Result<Self, NBodyError> {
        params.validate()?;
        if initial.count() != params.count || initial.velocities.len() != params.count {
            return Err(NBodyError::LengthMismatch {
                expected: params.count,
                actual: initial.count().max(initial.velocities.len()),
            });
        }

        let scratch = vec![Float4::zeroed(); params.count];
        let a = upload(&mut integrator, &initial.positions)?;
        let b = upload(&mut integrator, &scratch)?;
        let velocities = upload(&mut integrator, &initial.velocities)?;

        log::info!("initialised {} bodies on {}", params.count, integrator.name());

        Ok(Self {
            integrator,
            params,
            positions: [a, b],
            velocities,
            current: BufferSlot::A,
            state: LoopState::Initializing,
            steps: 0,
            staging: scratch,
        })
    }

    /// Dispatches one step and swaps the slot roles once it has completed.
    ///
    /// A failed step terminates the loop; the trajectory is not resumable.
    pub fn step(&mut self) -> Result<(), NBodyError> {
        if self.state == LoopState::Terminating {
            return Err(NBodyError::Terminated);
        }
        self.state = LoopState::Stepping;

        #[cfg(feature = "metrics")]
        let t = Instant::now();
        #[cfg(feature = "memtrace")]
        let tok = trace_start(Dir::Step, 0);

        let [a, b] = &mut self.positions;
        let (input, output) = match self.current {
            BufferSlot::A => (&*a, b),
            BufferSlot::B => (&*b, a),
        };
        let result = self.integrator.integrate(
            input,
            &mut self.velocities,
            output,
            self.params.count,
            self.params.delta,
            self.params.softening,
        );

        #[cfg(feature = "memtrace")]
        tok.finish();

        if let Err(e) = result {
            log::error!("step {} failed: {e}", self.steps);
            self.state = LoopState::Terminating;
            return Err(e);
        }

        self.current = self.current.other();
        self.steps += 1;

        #[cfg(feature = "metrics")]
        record("step", t);

        log::trace!("step {} done, current slot {:?}", self.steps, self.current);
        Ok(())
    }

    /// Fixed-length run up to a total of `params.iterations` steps; steps
    /// already taken with [`step`](Self::step) count towards it.
    pub fn run(&mut self) -> Result<RunStats, NBodyError> {
        let iterations = self.params.iterations.ok_or_else(|| {
            NBodyError::Config("a fixed-length run needs an iteration count".to_owned())
        })?;
        let start = Instant::now();
        let first = self.steps;
        let remaining = u64::from(iterations).saturating_sub(self.steps);
        for _ in 0..remaining {
            self.step()?;
        }
        self.state = LoopState::Terminating;
        Ok(RunStats { steps: self.steps - first, elapsed: start.elapsed() })
    }

    /// Steps until `presenter` asks to stop, publishing every new frame.
    ///
    /// Cancellation is only checked between steps.
    pub fn run_interactive<P: Presenter>(&mut self, presenter: &mut P) -> Result<RunStats, NBodyError> {
        let start = Instant::now();
        let first = self.steps;
        loop {
            self.step()?;
            self.publish(presenter)?;
            if presenter.poll_cancel() {
                break;
            }
        }
        self.state = LoopState::Terminating;
        log::info!("render loop stopped after {} steps", self.steps - first);
        Ok(RunStats { steps: self.steps - first, elapsed: start.elapsed() })
    }

    /// Hands a host copy of the current slot to `presenter`.
    ///
    /// The read-back completes before `publish` is called, so the presenter
    /// never observes a slot that is being written. A failed hand-off
    /// terminates the loop.
    pub fn publish<P: Presenter>(&mut self, presenter: &mut P) -> Result<(), NBodyError> {
        if let Err(e) = self.hand_over(presenter) {
            log::error!("publishing step {} failed: {e}", self.steps);
            self.state = LoopState::Terminating;
            return Err(e);
        }
        Ok(())
    }

    fn hand_over<P: Presenter>(&mut self, presenter: &mut P) -> Result<(), NBodyError> {
        let [a, b] = &self.positions;
        let current = match self.current {
            BufferSlot::A => a,
            BufferSlot::B => b,
        };
        read_back(&mut self.integrator, current, &mut self.staging)?;

        #[cfg(feature = "metrics")]
        let t = Instant::now();
        presenter.publish(&self.staging)?;
        #[cfg(feature = "metrics")]
        record("publish", t);
        Ok(())
    }

    /// Host copy of the authoritative positions.
    pub fn final_positions(&mut self) -> Result<Vec<Position>, NBodyError> {
        let mut host = vec![Float4::zeroed(); self.params.count];
        let [a, b] = &self.positions;
        let current = match self.current {
            BufferSlot::A => a,
            BufferSlot::B => b,
        };
        read_back(&mut self.integrator, current, &mut host)?;
        Ok(host)
    }

    pub fn velocities(&mut self) -> Result<Vec<Velocity>, NBodyError> {
        let mut host = vec![Float4::zeroed(); self.params.count];
        read_back(&mut self.integrator, &self.velocities, &mut host)?;
        Ok(host)
    }

    /// Marks the run finished; further `step` calls fail.
    pub fn terminate(&mut self) {
        self.state = LoopState::Terminating;
    }

    #[inline]
    pub fn current_slot(&self) -> BufferSlot {
        self.current
    }

    #[inline]
    pub fn state(&self) -> LoopState {
        self.state
    }

    #[inline]
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn params(&self) -> &SimulationParameters {
        &self.params
    }

    pub fn integrator(&self) -> &I {
        &self.integrator
    }
}

fn upload<I: ForceIntegrator>(integrator: &mut I, host: &[Float4]) -> Result<I::Buffer, NBodyError> {
    let bytes = std::mem::size_of_val(host);

    #[cfg(feature = "metrics")]
    let t = Instant::now();
    #[cfg(feature = "memtrace")]
    let tok = trace_start(Dir::H2D, bytes);

    let buffer = integrator.upload(host)?;

    #[cfg(feature = "memtrace")]
    tok.finish();
    #[cfg(feature = "metrics")]
    {
        record("upload", t);
        crate::metrics::ALLOCS.fetch_add(1, Ordering::Relaxed);
        crate::metrics::ALLOC_BYTES.fetch_add(bytes, Ordering::Relaxed);
    }

    log::trace!("uploaded {bytes} bytes");
    Ok(buffer)
}

fn read_back<I: ForceIntegrator>(integrator: &mut I, buffer: &I::Buffer, host: &mut [Float4]) -> Result<(), NBodyError> {
    #[cfg(feature = "metrics")]
    let t = Instant::now();
    #[cfg(feature = "memtrace")]
    let tok = trace_start(Dir::D2H, std::mem::size_of_val(host));

    integrator.download(buffer, host)?;

    #[cfg(feature = "memtrace")]
    tok.finish();
    #[cfg(feature = "metrics")]
    record("read_back", t);
    Ok(())
}
