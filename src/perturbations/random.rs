//! Random noise perturbations
//!
//! Both variants draw a full noise matrix with the input's shape at inference
//! time, so their transformations only apply to inputs of that exact shape.

use ndarray::{Array2, ArrayView2};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal, StandardNormal};
use serde::{Deserialize, Serialize};

use super::{require_finite, require_positive};
use crate::kind::PerturbationKind;
use crate::perturbation::PerturbationModel;
use crate::profiles::{column_mean_abs, ensure_shape};
use crate::{PerturbationError, Result};

/// Multiplies every reading by `1 + noise`, `noise ~ N(mean, std)`.
#[derive(Clone, Debug, PartialEq)]
pub struct MultiplicativeGaussianNoise {
    mean: f64,
    std: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GaussianNoiseTransformation {
    pub noise_samples: Array2<f64>,
    pub shape: (usize, usize),
    pub mean: f64,
    pub std: f64,
}

impl MultiplicativeGaussianNoise {
    pub fn new(mean: f64, std: f64) -> Result<Self> {
        require_finite("mean", mean)?;
        require_positive("std", std)?;
        Ok(Self { mean, std })
    }
}

impl Default for MultiplicativeGaussianNoise {
    fn default() -> Self {
        Self {
            mean: 0.0,
            std: 0.05,
        }
    }
}

impl PerturbationModel for MultiplicativeGaussianNoise {
    type Transformation = GaussianNoiseTransformation;

    const NAME: &'static str = "MultiplicativeGaussianNoise";

    fn kind(&self) -> PerturbationKind {
        PerturbationKind::MultiplicativeGaussianNoise {
            mean: self.mean,
            std: self.std,
        }
    }

    fn infer_transformation(
        &self,
        profiles: ArrayView2<'_, f64>,
        rng: &mut ChaCha8Rng,
    ) -> Result<GaussianNoiseTransformation> {
        let normal = Normal::new(self.mean, self.std)
            .map_err(|e| PerturbationError::InvalidConfig(e.to_string()))?;
        let noise_samples = Array2::from_shape_fn(profiles.dim(), |_| normal.sample(rng));
        Ok(GaussianNoiseTransformation {
            shape: noise_samples.dim(),
            noise_samples,
            mean: self.mean,
            std: self.std,
        })
    }

    fn apply_transformation(
        &self,
        profiles: ArrayView2<'_, f64>,
        transformation: &GaussianNoiseTransformation,
    ) -> Result<Array2<f64>> {
        ensure_shape(Self::NAME, transformation.noise_samples.dim(), profiles)?;
        let mut perturbed = profiles.to_owned();
        perturbed.zip_mut_with(&transformation.noise_samples, |x, &noise| {
            *x *= 1.0 + noise
        });
        Ok(perturbed)
    }
}

/// Adds a mean-reverting Ornstein-Uhlenbeck path to every column, scaled by
/// the column's mean absolute value.
///
/// `n[t] = n[t-1] + theta * (mu - n[t-1]) * dt + sigma * sqrt(dt) * z`, with
/// `n[0] = mu`.
#[derive(Clone, Debug, PartialEq)]
pub struct AdditiveOuNoise {
    theta: f64,
    mu: f64,
    sigma: f64,
    dt: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OuNoiseTransformation {
    pub noise: Array2<f64>,
    pub shape: (usize, usize),
    pub theta: f64,
    pub mu: f64,
    pub sigma: f64,
    pub dt: f64,
}

impl AdditiveOuNoise {
    pub fn new(theta: f64, mu: f64, sigma: f64, dt: f64) -> Result<Self> {
        require_positive("theta", theta)?;
        require_finite("mu", mu)?;
        require_positive("sigma", sigma)?;
        require_positive("dt", dt)?;
        Ok(Self {
            theta,
            mu,
            sigma,
            dt,
        })
    }
}

impl Default for AdditiveOuNoise {
    fn default() -> Self {
        Self {
            theta: 0.5,
            mu: 0.0,
            sigma: 0.1,
            dt: 1.0,
        }
    }
}

impl PerturbationModel for AdditiveOuNoise {
    type Transformation = OuNoiseTransformation;

    const NAME: &'static str = "AdditiveOUNoise";

    fn kind(&self) -> PerturbationKind {
        PerturbationKind::AdditiveOuNoise {
            theta: self.theta,
            mu: self.mu,
            sigma: self.sigma,
            dt: self.dt,
        }
    }

    fn infer_transformation(
        &self,
        profiles: ArrayView2<'_, f64>,
        rng: &mut ChaCha8Rng,
    ) -> Result<OuNoiseTransformation> {
        let (rows, cols) = profiles.dim();
        let scale = column_mean_abs(profiles)?;
        let diffusion = self.sigma * self.dt.sqrt();
        let mut noise = Array2::<f64>::zeros((rows, cols));

        for c in 0..cols {
            let mut value = self.mu;
            for t in 0..rows {
                if t > 0 {
                    let z: f64 = rng.sample(StandardNormal);
                    value += self.theta * (self.mu - value) * self.dt + diffusion * z;
                }
                noise[[t, c]] = value * scale[[0, c]];
            }
        }

        Ok(OuNoiseTransformation {
            shape: noise.dim(),
            noise,
            theta: self.theta,
            mu: self.mu,
            sigma: self.sigma,
            dt: self.dt,
        })
    }

    fn apply_transformation(
        &self,
        profiles: ArrayView2<'_, f64>,
        transformation: &OuNoiseTransformation,
    ) -> Result<Array2<f64>> {
        ensure_shape(Self::NAME, transformation.noise.dim(), profiles)?;
        Ok(&profiles + &transformation.noise)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perturbation::{Perturbation, Stage};
    use approx::assert_relative_eq;

    fn profiles() -> Array2<f64> {
        Array2::from_shape_fn((48, 3), |(t, c)| 10.0 + (t as f64 * 0.3).sin() + c as f64)
    }

    #[test]
    fn gaussian_noise_is_multiplicative() {
        let x = profiles();
        let mut stage =
            Stage::new(MultiplicativeGaussianNoise::new(0.0, 0.1).unwrap()).with_seed(42);
        let y = stage.apply(x.view()).unwrap();
        let noise = &stage.cached_transformation().unwrap().noise_samples;
        assert_eq!(noise.dim(), x.dim());
        for ((t, c), value) in y.indexed_iter() {
            assert_relative_eq!(*value, x[[t, c]] * (1.0 + noise[[t, c]]), epsilon = 1e-12);
        }
    }

    #[test]
    fn gaussian_noise_rejects_other_shapes_once_cached() {
        let mut stage =
            Stage::new(MultiplicativeGaussianNoise::new(0.0, 0.1).unwrap()).with_seed(1);
        stage.apply(profiles().view()).unwrap();
        let shorter = Array2::<f64>::ones((12, 3));
        let err = stage.apply(shorter.view()).unwrap_err();
        assert!(matches!(
            err,
            PerturbationError::ShapeMismatch {
                expected: (48, 3),
                got: (12, 3),
                ..
            }
        ));
    }

    #[test]
    fn gaussian_noise_requires_positive_std() {
        assert!(MultiplicativeGaussianNoise::new(0.0, 0.0).is_err());
        assert!(MultiplicativeGaussianNoise::new(f64::INFINITY, 0.1).is_err());
    }

    #[test]
    fn ou_noise_starts_at_mu_and_is_reproducible() {
        let x = profiles();
        let model = AdditiveOuNoise::new(0.3, 0.0, 0.05, 1.0).unwrap();
        let mut first = Stage::new(model.clone()).with_seed(5);
        let mut second = Stage::new(model).with_seed(5);

        let y1 = first.apply(x.view()).unwrap();
        let y2 = second.apply(x.view()).unwrap();
        assert_eq!(y1, y2);
        assert_eq!(y1.row(0), x.row(0));
        assert_ne!(y1, x);
    }

    #[test]
    fn ou_noise_reverts_towards_mu_without_diffusion_dominating() {
        let x = Array2::from_elem((400, 2), 1.0);
        let mut stage =
            Stage::new(AdditiveOuNoise::new(0.5, 0.2, 0.01, 1.0).unwrap()).with_seed(3);
        stage.apply(x.view()).unwrap();
        let noise = &stage.cached_transformation().unwrap().noise;
        let tail_mean = noise.slice(ndarray::s![200.., ..]).mean().unwrap();
        assert_relative_eq!(tail_mean, 0.2, epsilon = 0.02);
    }

    #[test]
    fn ou_noise_validates_parameters() {
        assert!(AdditiveOuNoise::new(0.0, 0.0, 0.1, 1.0).is_err());
        assert!(AdditiveOuNoise::new(0.5, 0.0, -0.1, 1.0).is_err());
        assert!(AdditiveOuNoise::new(0.5, 0.0, 0.1, 0.0).is_err());
    }
}
