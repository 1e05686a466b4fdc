//! Body state: homogeneous 4-vectors and the initial particle distribution.
//!
//! Positions and velocities are both stored as [`Float4`] so a whole buffer is
//! one contiguous `[f32]` that can be handed to any compute substrate with
//! `bytemuck::cast_slice`. For positions `w` is the influence weight of the
//! body (1.0 for every body here); for velocities it is padding.

use bytemuck::{Pod, Zeroable};
use rand::Rng;
use std::f32::consts::PI;

use crate::params::{InitDistribution, SimulationParameters};

/// `cl_float4`-compatible vector.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Float4 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

pub type Position = Float4;
pub type Velocity = Float4;

impl Float4 {
    #[inline(always)]
    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    /// A unit-weight body at rest at `(x, y, z)`.
    #[inline(always)]
    pub const fn body(x: f32, y: f32, z: f32) -> Self {
        Self::new(x, y, z, 1.0)
    }

    #[inline(always)]
    pub fn xyz(&self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }

    /// Euclidean distance of the spatial components, `w` ignored.
    #[inline]
    pub fn distance(&self, other: &Float4) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        let dz = other.z - self.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// Host-side initial state of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleState {
    pub positions: Vec<Position>,
    pub velocities: Vec<Velocity>,
}

impl ParticleState {
    /// Wraps caller-provided buffers; both must have the same length.
    pub fn from_parts(positions: Vec<Position>, velocities: Vec<Velocity>) -> Result<Self, crate::NBodyError> {
        if positions.len() != velocities.len() {
            return Err(crate::NBodyError::LengthMismatch {
                expected: positions.len(),
                actual: velocities.len(),
            });
        }
        Ok(Self { positions, velocities })
    }

    /// `count` bodies placed by `params.init` with zero velocity.
    pub fn generate<R: Rng>(params: &SimulationParameters, rng: &mut R) -> Self {
        let positions = (0..params.count)
            .map(|_| match params.init {
                InitDistribution::Sphere => point_on_sphere(rng, params.sphere_radius),
                InitDistribution::Circle => point_on_circle(rng, params.sphere_radius),
            })
            .collect();
        Self {
            positions,
            velocities: vec![Velocity::zeroed(); params.count],
        }
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.positions.len()
    }
}

/// Uniform sample on the surface of a sphere.
pub fn point_on_sphere<R: Rng>(rng: &mut R, radius: f32) -> Position {
    let longitude = 2.0 * PI * rng.gen_range(0.0_f32..=1.0);
    // acos of a uniform [-1, 1] keeps the area density uniform
    let latitude = (2.0 * rng.gen_range(0.0_f32..=1.0) - 1.0).clamp(-1.0, 1.0).acos();
    Float4::body(
        radius * latitude.sin() * longitude.cos(),
        radius * latitude.sin() * longitude.sin(),
        radius * latitude.cos(),
    )
}

/// Uniform sample on the edge of a circle in the `z = 0` plane.
pub fn point_on_circle<R: Rng>(rng: &mut R, radius: f32) -> Position {
    let angle = 2.0 * PI * rng.gen_range(0.0_f32..=1.0);
    Float4::body(radius * angle.cos(), radius * angle.sin(), 0.0)
}
