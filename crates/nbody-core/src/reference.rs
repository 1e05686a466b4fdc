//! Sequential host integrator used as ground truth for verification.

use crate::body::{Float4, ParticleState, Position};
use crate::integrator::{check_lengths, update_body, ForceIntegrator};
use crate::params::{ForceForm, SimulationParameters};
use crate::simulation::SimulationLoop;
use crate::NBodyError;

/// Single-threaded, in-order evaluation of the step on plain host vectors.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceIntegrator {
    form: ForceForm,
}

impl ReferenceIntegrator {
    pub fn new(form: ForceForm) -> Self {
        Self { form }
    }
}

impl ForceIntegrator for ReferenceIntegrator {
    type Buffer = Vec<Float4>;

    fn name(&self) -> String {
        "reference (sequential host)".to_owned()
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
        for i in 0..count {
            positions_out[i] = update_body(i, positions_in, &mut velocities[i], delta, softening, self.form);
        }
        Ok(())
    }
}

/// Runs `params.iterations` reference steps from `initial` and returns the
/// final positions.
pub fn run_reference(initial: &ParticleState, params: &SimulationParameters) -> Result<Vec<Position>, NBodyError> {
    let mut sim = SimulationLoop::new(ReferenceIntegrator::new(params.force_form), params.clone(), initial)?;
    sim.run()?;
    sim.final_positions()
}
