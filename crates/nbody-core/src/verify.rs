//! Tolerance-based comparison of two trajectories.
//!
//! Parallel and sequential evaluation sum the same terms in a different order
//! (or with a different coefficient form), so exact equality is not expected;
//! each body's final position must lie within `tolerance` of the reference.

use std::fmt;

use crate::body::Position;
use crate::NBodyError;

/// Failing bodies listed in a report; the count covers all of them.
pub const MAX_REPORTED_ERRORS: usize = 8;

#[derive(Debug, Clone, PartialEq)]
pub struct VerificationResult {
    pub passed: bool,
    pub error_count: u32,
    /// `(body index, distance)` of the first failures, at most
    /// [`MAX_REPORTED_ERRORS`].
    pub first_errors: Vec<(usize, f32)>,
}

/// Compares `computed` with `reference` body by body.
///
/// A body fails when its euclidean distance exceeds `tolerance` or is NaN.
pub fn verify(computed: &[Position], reference: &[Position], tolerance: f32) -> Result<VerificationResult, NBodyError> {
    if computed.len() != reference.len() {
        return Err(NBodyError::LengthMismatch {
            expected: reference.len(),
            actual: computed.len(),
        });
    }

    let mut error_count = 0u32;
    let mut first_errors = Vec::new();
    for (i, (c, r)) in computed.iter().zip(reference).enumerate() {
        let dist = c.distance(r);
        // `NaN > tolerance` is false, so NaN needs its own check
        if dist > tolerance || dist.is_nan() {
            if first_errors.len() < MAX_REPORTED_ERRORS {
                first_errors.push((i, dist));
            }
            error_count += 1;
        }
    }

    if error_count > 0 {
        log::warn!("verification: {error_count} of {} bodies outside tolerance {tolerance}", computed.len());
    }

    Ok(VerificationResult {
        passed: error_count == 0,
        error_count,
        first_errors,
    })
}

impl fmt::Display for VerificationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.passed {
            return writeln!(f, "Verification passed.");
        }
        writeln!(f, "Verification failed:")?;
        for (i, dist) in &self.first_errors {
            writeln!(f, "-> Position error at {i}: {dist}")?;
        }
        writeln!(f, "Total errors: {}", self.error_count)
    }
}
