//! Concrete perturbations, grouped by family.

pub mod measurement;
pub mod random;
pub mod systematic;

pub use measurement::{DiscreteTimeShift, PercentualDeadBand, ZeroMeasurements};
pub use random::{AdditiveOuNoise, MultiplicativeGaussianNoise};
pub use systematic::{ConstantRandomPercentualBias, ConstantRandomPercentualScaling};

use crate::{PerturbationError, Result};

pub(crate) fn require_finite(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(PerturbationError::InvalidConfig(format!(
            "{name} must be finite, got {value}"
        )));
    }
    Ok(())
}

pub(crate) fn require_positive(name: &str, value: f64) -> Result<()> {
    require_finite(name, value)?;
    if value <= 0.0 {
        return Err(PerturbationError::InvalidConfig(format!(
            "{name} must be > 0, got {value}"
        )));
    }
    Ok(())
}

pub(crate) fn require_ordered_bounds(low: f64, high: f64) -> Result<()> {
    require_finite("uniform_low", low)?;
    require_finite("uniform_high", high)?;
    if low >= high {
        return Err(PerturbationError::InvalidConfig(format!(
            "uniform_low ({low}) must be less than uniform_high ({high})"
        )));
    }
    if !(high - low).is_finite() {
        return Err(PerturbationError::InvalidConfig(format!(
            "range uniform_high - uniform_low overflows for ({low}, {high})"
        )));
    }
    Ok(())
}
