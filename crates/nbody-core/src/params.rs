//! Run configuration.
//!
//! `SimulationParameters` is built once at startup (normally from the CLI) and
//! handed to the simulation loop by reference; nothing in it changes while a
//! run is in progress.

use crate::NBodyError;

/// Initial placement of the bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InitDistribution {
    /// uniform on the surface of a sphere
    #[default]
    Sphere,
    /// uniform on the edge of a circle in the xy-plane
    Circle,
}

/// Algebraic form of the interaction coefficient `w_j / |d|³`.
///
/// Both forms are conforming; they differ in the least significant bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ForceForm {
    /// `w_j / (dist * dist * dist)`
    #[default]
    Divide,
    /// `inv = 1 / dist; w_j * (inv * inv * inv)`
    InverseCube,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationParameters {
    pub count: usize,       // number of bodies
    pub delta: f32,         // time step
    pub softening: f32,     // added in quadrature to the squared distance
    pub iterations: Option<u32>, // None -> run until cancelled
    pub init: InitDistribution,
    pub sphere_radius: f32, // radius of the initial sphere/circle
    pub tolerance: f32,     // verification bound (euclidean distance)
    pub wgsize: usize,      // bodies per work group
    pub use_local: bool,    // tile source bodies into group-local scratch
    pub unroll: u32,        // inner-loop unroll factor of the OpenCL kernel
    pub force_form: ForceForm,
    pub seed: u64,          // rng seed for the initial distribution
}

impl Default for SimulationParameters {
    fn default() -> Self {
        Self {
            count: 4096,
            delta: 0.0002,
            softening: 0.05,
            iterations: Some(32),
            init: InitDistribution::Sphere,
            sphere_radius: 0.8,
            tolerance: 0.01,
            wgsize: 64,
            use_local: false,
            unroll: 1,
            force_form: ForceForm::Divide,
            seed: 0,
        }
    }
}

impl SimulationParameters {
    /// Defaults of the render-loop variant: pixel-scale radius, no iteration limit.
    pub fn interactive() -> Self {
        Self {
            delta: 0.1,
            softening: 10.0,
            iterations: None,
            sphere_radius: 128.0,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), NBodyError> {
        if !self.delta.is_finite() {
            return Err(NBodyError::Config(format!("delta must be finite, got {}", self.delta)));
        }
        if !self.softening.is_finite() || self.softening < 0.0 {
            return Err(NBodyError::Config(format!(
                "softening must be finite and >= 0, got {}",
                self.softening
            )));
        }
        if !(self.sphere_radius.is_finite() && self.sphere_radius > 0.0) {
            return Err(NBodyError::Config(format!(
                "sphere radius must be > 0, got {}",
                self.sphere_radius
            )));
        }
        if self.wgsize == 0 {
            return Err(NBodyError::InvalidWorkGroup { count: self.count, wgsize: 0 });
        }
        if self.unroll == 0 {
            return Err(NBodyError::Config("unroll factor must be >= 1".to_owned()));
        }
        if self.tolerance.is_nan() || self.tolerance < 0.0 {
            return Err(NBodyError::Config(format!(
                "tolerance must be >= 0, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }

    /// OpenCL build options selecting the kernel variant.
    pub fn kernel_options(&self) -> String {
        let mut options = format!(
            "-cl-single-precision-constant -DWGSIZE={} -DUNROLL_FACTOR={}",
            self.wgsize, self.unroll
        );
        if self.use_local {
            options.push_str(" -DUSE_LOCAL");
        }
        if self.force_form == ForceForm::InverseCube {
            options.push_str(" -DINVERSE_CUBE");
        }
        options
    }

    /// Pair interactions evaluated per step.
    #[inline]
    pub fn interactions_per_step(&self) -> u64 {
        (self.count as u64) * (self.count as u64)
    }
}
