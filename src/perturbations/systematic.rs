//! Systematic perturbations
//!
//! One random constant is drawn per column when the transformation is
//! inferred and applied identically at every timestep of that column, so
//! variance shows up across profile instances but not along time.

use ndarray::{Array2, ArrayView2};
use rand::distributions::{Distribution, Uniform};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::require_ordered_bounds;
use crate::kind::PerturbationKind;
use crate::perturbation::PerturbationModel;
use crate::profiles::{column_mean_abs, ensure_columns};
use crate::Result;

fn uniform_row(low: f64, high: f64, n_columns: usize, rng: &mut ChaCha8Rng) -> Array2<f64> {
    let uniform = Uniform::new(low, high);
    Array2::from_shape_fn((1, n_columns), |_| uniform.sample(rng))
}

/// Adds a per-column bias drawn as a fraction of the column's mean absolute
/// value.
///
/// `bias[c] = U(uniform_low, uniform_high) * mean(|x[:, c]|)`
#[derive(Clone, Debug, PartialEq)]
pub struct ConstantRandomPercentualBias {
    uniform_low: f64,
    uniform_high: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BiasTransformation {
    pub biases: Array2<f64>,
    pub shape: (usize, usize),
    pub uniform_low: f64,
    pub uniform_high: f64,
}

impl ConstantRandomPercentualBias {
    pub fn new(uniform_low: f64, uniform_high: f64) -> Result<Self> {
        require_ordered_bounds(uniform_low, uniform_high)?;
        Ok(Self {
            uniform_low,
            uniform_high,
        })
    }
}

impl Default for ConstantRandomPercentualBias {
    fn default() -> Self {
        Self {
            uniform_low: -1.0,
            uniform_high: 1.0,
        }
    }
}

impl PerturbationModel for ConstantRandomPercentualBias {
    type Transformation = BiasTransformation;

    const NAME: &'static str = "ConstantRandomPercentualBias";

    fn kind(&self) -> PerturbationKind {
        PerturbationKind::ConstantRandomPercentualBias {
            uniform_low: self.uniform_low,
            uniform_high: self.uniform_high,
        }
    }

    fn infer_transformation(
        &self,
        profiles: ArrayView2<'_, f64>,
        rng: &mut ChaCha8Rng,
    ) -> Result<BiasTransformation> {
        let base_biases = uniform_row(self.uniform_low, self.uniform_high, profiles.ncols(), rng);
        let biases = base_biases * column_mean_abs(profiles)?;
        Ok(BiasTransformation {
            shape: biases.dim(),
            biases,
            uniform_low: self.uniform_low,
            uniform_high: self.uniform_high,
        })
    }

    fn apply_transformation(
        &self,
        profiles: ArrayView2<'_, f64>,
        transformation: &BiasTransformation,
    ) -> Result<Array2<f64>> {
        ensure_columns(Self::NAME, transformation.biases.dim(), profiles)?;
        Ok(&profiles + &transformation.biases)
    }
}

/// Multiplies every column by a factor drawn once from
/// `U(uniform_low, uniform_high)`.
#[derive(Clone, Debug, PartialEq)]
pub struct ConstantRandomPercentualScaling {
    uniform_low: f64,
    uniform_high: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScalingTransformation {
    pub scaling: Array2<f64>,
    pub shape: (usize, usize),
    pub uniform_low: f64,
    pub uniform_high: f64,
}

impl ConstantRandomPercentualScaling {
    pub fn new(uniform_low: f64, uniform_high: f64) -> Result<Self> {
        require_ordered_bounds(uniform_low, uniform_high)?;
        Ok(Self {
            uniform_low,
            uniform_high,
        })
    }
}

impl Default for ConstantRandomPercentualScaling {
    fn default() -> Self {
        Self {
            uniform_low: 0.8,
            uniform_high: 1.2,
        }
    }
}

impl PerturbationModel for ConstantRandomPercentualScaling {
    type Transformation = ScalingTransformation;

    const NAME: &'static str = "ConstantRandomPercentualScaling";

    fn kind(&self) -> PerturbationKind {
        PerturbationKind::ConstantRandomPercentualScaling {
            uniform_low: self.uniform_low,
            uniform_high: self.uniform_high,
        }
    }

    fn infer_transformation(
        &self,
        profiles: ArrayView2<'_, f64>,
        rng: &mut ChaCha8Rng,
    ) -> Result<ScalingTransformation> {
        let scaling = uniform_row(self.uniform_low, self.uniform_high, profiles.ncols(), rng);
        Ok(ScalingTransformation {
            shape: scaling.dim(),
            scaling,
            uniform_low: self.uniform_low,
            uniform_high: self.uniform_high,
        })
    }

    fn apply_transformation(
        &self,
        profiles: ArrayView2<'_, f64>,
        transformation: &ScalingTransformation,
    ) -> Result<Array2<f64>> {
        ensure_columns(Self::NAME, transformation.scaling.dim(), profiles)?;
        Ok(&profiles * &transformation.scaling)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perturbation::{Perturbation, Stage};
    use crate::PerturbationError;
    use approx::assert_relative_eq;
    use ndarray::{array, Array2};

    fn fixed_profiles() -> Array2<f64> {
        Array2::from_shape_fn((10, 3), |(t, c)| match c {
            0 => 1.0 + t as f64,
            1 => -2.0 * (t as f64 + 1.0),
            _ => 5.0 + 0.5 * t as f64,
        })
    }

    #[test]
    fn bias_is_one_scalar_per_column_within_scaled_bounds() {
        let x = fixed_profiles();
        let mut stage =
            Stage::new(ConstantRandomPercentualBias::new(-0.1, 0.1).unwrap()).with_seed(42);
        let y = stage.apply(x.view()).unwrap();
        assert_eq!(y.dim(), x.dim());

        let means = column_mean_abs(x.view()).unwrap();
        let biases = &stage.cached_transformation().unwrap().biases;
        assert_eq!(biases.dim(), (1, 3));

        for c in 0..3 {
            let bias = y[[0, c]] - x[[0, c]];
            assert_relative_eq!(bias, biases[[0, c]], epsilon = 1e-12);
            assert!(bias.abs() <= 0.1 * means[[0, c]]);
            for t in 0..10 {
                assert_relative_eq!(y[[t, c]] - x[[t, c]], bias, epsilon = 1e-9);
            }
        }

        let mut again =
            Stage::new(ConstantRandomPercentualBias::new(-0.1, 0.1).unwrap()).with_seed(42);
        assert_eq!(again.apply(x.view()).unwrap(), y);
    }

    #[test]
    fn bias_transformation_records_bounds_and_shape() {
        let mut stage =
            Stage::new(ConstantRandomPercentualBias::new(-0.5, 0.25).unwrap()).with_seed(1);
        stage.apply(fixed_profiles().view()).unwrap();
        let record = stage.transformation().unwrap().unwrap();
        assert_eq!(record["uniform_low"], -0.5);
        assert_eq!(record["uniform_high"], 0.25);
        assert_eq!(record["shape"], serde_json::json!([1, 3]));
    }

    #[test]
    fn bias_reapplies_to_longer_input_with_same_columns() {
        let mut stage =
            Stage::new(ConstantRandomPercentualBias::new(-0.1, 0.1).unwrap()).with_seed(2);
        stage.apply(fixed_profiles().view()).unwrap();
        let longer = Array2::<f64>::zeros((24, 3));
        let y = stage.apply(longer.view()).unwrap();
        assert_eq!(y.dim(), (24, 3));

        let narrower = Array2::<f64>::zeros((10, 2));
        let err = stage.apply(narrower.view()).unwrap_err();
        assert!(matches!(err, PerturbationError::ShapeMismatch { .. }));
    }

    #[test]
    fn scaling_multiplies_each_column_by_a_bounded_factor() {
        let x = fixed_profiles();
        let mut stage =
            Stage::new(ConstantRandomPercentualScaling::new(0.8, 1.2).unwrap()).with_seed(42);
        let y = stage.apply(x.view()).unwrap();
        let transformation = stage.cached_transformation().unwrap();
        assert_eq!(transformation.shape, (1, 3));

        for c in 0..3 {
            let factor = transformation.scaling[[0, c]];
            assert!((0.8..1.2).contains(&factor));
            for t in 0..10 {
                assert_relative_eq!(y[[t, c]], x[[t, c]] * factor, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn degenerate_bounds_are_rejected() {
        assert!(ConstantRandomPercentualBias::new(1.0, -1.0).is_err());
        assert!(ConstantRandomPercentualScaling::new(1.0, 1.0).is_err());
        assert!(ConstantRandomPercentualScaling::new(f64::NAN, 1.0).is_err());
    }

    #[test]
    fn overflowing_range_is_rejected_at_construction() {
        assert!(ConstantRandomPercentualBias::new(-1e308, 1e308).is_err());
        assert!(ConstantRandomPercentualScaling::new(-f64::MAX, f64::MAX).is_err());
        assert!(ConstantRandomPercentualBias::new(-1e300, 1e300).is_ok());
    }

    #[test]
    fn zero_column_gets_zero_bias() {
        let x = array![[0.0, 1.0], [0.0, 3.0]];
        let mut stage =
            Stage::new(ConstantRandomPercentualBias::new(-1.0, 1.0).unwrap()).with_seed(7);
        let y = stage.apply(x.view()).unwrap();
        assert_eq!(y.column(0).to_vec(), vec![0.0, 0.0]);
    }
}
