//! The per-step physics contract and the host thread-pool substrate.
//!
//! One step reads the previous positions (ping), updates every velocity in
//! place and writes the new positions (pong):
//!
//! ```text
//! d      = p_j - p_i
//! dist   = sqrt(|d|² + softening²)
//! F_i    = Σ_j  w_j / dist³ · d
//! v_i'   = v_i + F_i · delta
//! p_i'   = p_i + v_i' · delta        (w unchanged)
//! ```
//!
//! Every body only reads step-(k-1) state, so bodies are updated in any order
//! and in parallel. The free functions below are the single source of that
//! math; the parallel, reference and OpenCL substrates all follow it.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::body::{Float4, Position, Velocity};
use crate::params::{ForceForm, SimulationParameters};
use crate::NBodyError;

/// A compute substrate able to run one integration step over its own buffers.
///
/// `integrate` must not return before every body of the step has been written
/// (it is the step barrier).
pub trait ForceIntegrator {
    /// Storage for `count` 4-vectors on the substrate.
    type Buffer;

    /// Human readable substrate name for reports.
    fn name(&self) -> String;

    /// Allocates a buffer initialised with `host`.
    fn upload(&mut self, host: &[Float4]) -> Result<Self::Buffer, NBodyError>;

    /// Blocking copy of `buffer` into `host`.
    fn download(&mut self, buffer: &Self::Buffer, host: &mut [Float4]) -> Result<(), NBodyError>;

    fn integrate(
        &mut self,
        positions_in: &Self::Buffer,
        velocities: &mut Self::Buffer,
        positions_out: &mut Self::Buffer,
        count: usize,
        delta: f32,
        softening: f32,
    ) -> Result<(), NBodyError>;
}

// ─── Shared per-body math ─────────────────────────────────────────────

/// Softened separation `sqrt(|p_j - p_i|² + softening²)`.
#[inline(always)]
pub fn softened_distance(pi: &Position, pj: &Position, softening: f32) -> f32 {
    let dx = pj.x - pi.x;
    let dy = pj.y - pi.y;
    let dz = pj.z - pi.z;
    (dx * dx + dy * dy + dz * dz + softening * softening).sqrt()
}

/// Contribution of body `j` to the force on body `i`.
#[inline(always)]
pub fn interaction(pi: &Position, pj: &Position, softening: f32, form: ForceForm) -> [f32; 3] {
    let dx = pj.x - pi.x;
    let dy = pj.y - pi.y;
    let dz = pj.z - pi.z;
    let dist = (dx * dx + dy * dy + dz * dz + softening * softening).sqrt();
    let coeff = match form {
        ForceForm::Divide => pj.w / (dist * dist * dist),
        ForceForm::InverseCube => {
            let inv = 1.0 / dist;
            pj.w * (inv * inv * inv)
        }
    };
    [coeff * dx, coeff * dy, coeff * dz]
}

/// Adds the contribution of `block` (bodies `first..first + block.len()`) to
/// `force`, in ascending index order. Body `i` itself is skipped.
#[inline]
pub fn accumulate_force(
    i: usize,
    pi: &Position,
    block: &[Position],
    first: usize,
    softening: f32,
    form: ForceForm,
    force: &mut [f32; 3],
) {
    for (k, pj) in block.iter().enumerate() {
        if first + k == i {
            continue;
        }
        let f = interaction(pi, pj, softening, form);
        force[0] += f[0];
        force[1] += f[1];
        force[2] += f[2];
    }
}

/// Explicit Euler update: velocity first, then position with the new velocity.
#[inline(always)]
pub fn advance(pi: &Position, vi: &mut Velocity, force: [f32; 3], delta: f32) -> Position {
    vi.x += force[0] * delta;
    vi.y += force[1] * delta;
    vi.z += force[2] * delta;
    Float4::new(
        pi.x + vi.x * delta,
        pi.y + vi.y * delta,
        pi.z + vi.z * delta,
        pi.w,
    )
}

/// Full update of body `i` against every body in `positions`.
#[inline]
pub fn update_body(
    i: usize,
    positions: &[Position],
    vi: &mut Velocity,
    delta: f32,
    softening: f32,
    form: ForceForm,
) -> Position {
    let pi = positions[i];
    let mut force = [0.0_f32; 3];
    accumulate_force(i, &pi, positions, 0, softening, form, &mut force);
    advance(&pi, vi, force, delta)
}

/// All three buffers must hold exactly `count` elements.
pub(crate) fn check_lengths(count: usize, lens: [usize; 3]) -> Result<(), NBodyError> {
    match lens.into_iter().find(|&len| len != count) {
        Some(actual) => Err(NBodyError::LengthMismatch { expected: count, actual }),
        None => Ok(()),
    }
}

// ─── Thread-pool substrate ────────────────────────────────────────────

/// Data-parallel integrator on a dedicated rayon pool.
///
/// Bodies are split into work groups of `wgsize`; each group is one rayon
/// task. With `use_local` every group stages the source bodies tile by tile
/// into a group-local scratch buffer before accumulating.
pub struct ParallelIntegrator {
    pool: ThreadPool,
    wgsize: usize,
    use_local: bool,
    form: ForceForm,
}

impl ParallelIntegrator {
    /// `threads == None` lets rayon pick one worker per logical CPU.
    pub fn new(threads: Option<usize>, params: &SimulationParameters) -> Result<Self, NBodyError> {
        if params.wgsize == 0 {
            return Err(NBodyError::InvalidWorkGroup { count: params.count, wgsize: 0 });
        }
        let mut builder = ThreadPoolBuilder::new().thread_name(|i| format!("nbody-worker-{i}"));
        if let Some(n) = threads {
            builder = builder.num_threads(n);
        }
        let pool = builder
            .build()
            .map_err(|e| NBodyError::ThreadPool(e.to_string()))?;
        log::debug!(
            "thread pool ready: {} workers, wgsize {}, local tiles {}",
            pool.current_num_threads(),
            params.wgsize,
            params.use_local
        );
        Ok(Self {
            pool,
            wgsize: params.wgsize,
            use_local: params.use_local,
            form: params.force_form,
        })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl ForceIntegrator for ParallelIntegrator {
    type Buffer = Vec<Float4>;

    fn name(&self) -> String {
        format!("host thread pool ({} threads)", self.threads())
    }

    fn upload(&mut self, host: &[Float4]) -> Result<Self::Buffer, NBodyError> {
        Ok(host.to_vec())
    }

    fn download(&mut self, buffer: &Self::Buffer, host: &mut [Float4]) -> Result<(), NBodyError> {
        if buffer.len() != host.len() {
            return Err(NBodyError::LengthMismatch { expected: buffer.len(), actual: host.len() });
        }
        host.copy_from_slice(buffer);
        Ok(())
    }

    fn integrate(
        &mut self,
        positions_in: &Self::Buffer,
        velocities: &mut Self::Buffer,
        positions_out: &mut Self::Buffer,
        count: usize,
        delta: f32,
        softening: f32,
    ) -> Result<(), NBodyError> {
        check_lengths(count, [positions_in.len(), velocities.len(), positions_out.len()])?;

        let (wgsize, use_local, form) = (self.wgsize, self.use_local, self.form);
        let positions_in = positions_in.as_slice();

        // the join at the end of for_each is the step barrier
        self.pool.install(|| {
            positions_out
                .par_chunks_mut(wgsize)
                .zip(velocities.par_chunks_mut(wgsize))
                .enumerate()
                .for_each(|(group, (out, vel))| {
                    let base = group * wgsize;
                    if use_local {
                        integrate_group_tiled(base, positions_in, out, vel, wgsize, delta, softening, form);
                    } else {
                        for (k, (o, v)) in out.iter_mut().zip(vel.iter_mut()).enumerate() {
                            *o = update_body(base + k, positions_in, v, delta, softening, form);
                        }
                    }
                });
        });
        Ok(())
    }
}

/// One work group with group-local staging of the source bodies.
#[allow(clippy::too_many_arguments)]
fn integrate_group_tiled(
    base: usize,
    positions_in: &[Position],
    out: &mut [Position],
    vel: &mut [Velocity],
    wgsize: usize,
    delta: f32,
    softening: f32,
    form: ForceForm,
) {
    let mut scratch = vec![Float4::default(); wgsize];
    let mut forces = vec![[0.0_f32; 3]; out.len()];

    for (tile_index, tile) in positions_in.chunks(wgsize).enumerate() {
        let first = tile_index * wgsize;
        let local = &mut scratch[..tile.len()];
        local.copy_from_slice(tile);
        for (k, force) in forces.iter_mut().enumerate() {
            let i = base + k;
            accumulate_force(i, &positions_in[i], local, first, softening, form, force);
        }
    }

    for (k, ((o, v), force)) in out.iter_mut().zip(vel.iter_mut()).zip(forces).enumerate() {
        *o = advance(&positions_in[base + k], v, force, delta);
    }
}
