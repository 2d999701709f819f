//! Measurement artifacts
//!
//! Perturbations that emulate sensor imperfection rather than physical
//! variation: dropped readings, a dead-band on reported changes, and a clock
//! offset per profile.

use ndarray::{Array2, ArrayView2, Zip};
use rand::distributions::{Bernoulli, Distribution};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::{require_finite, require_positive};
use crate::kind::PerturbationKind;
use crate::perturbation::PerturbationModel;
use crate::profiles::{column_mean_abs, ensure_columns, ensure_shape};
use crate::{PerturbationError, Result};

/// Zeroes out individual readings, each one independently with
/// `probability`.
#[derive(Clone, Debug, PartialEq)]
pub struct ZeroMeasurements {
    probability: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZeroMaskTransformation {
    pub mask: Array2<bool>,
    pub shape: (usize, usize),
    pub probability: f64,
}

impl ZeroMeasurements {
    pub fn new(probability: f64) -> Result<Self> {
        require_finite("probability", probability)?;
        if !(0.0..=1.0).contains(&probability) {
            return Err(PerturbationError::InvalidConfig(format!(
                "probability must be in [0, 1], got {probability}"
            )));
        }
        Ok(Self { probability })
    }
}

impl Default for ZeroMeasurements {
    fn default() -> Self {
        Self { probability: 0.01 }
    }
}

impl PerturbationModel for ZeroMeasurements {
    type Transformation = ZeroMaskTransformation;

    const NAME: &'static str = "ZeroMeasurements";

    fn kind(&self) -> PerturbationKind {
        PerturbationKind::ZeroMeasurements {
            probability: self.probability,
        }
    }

    fn infer_transformation(
        &self,
        profiles: ArrayView2<'_, f64>,
        rng: &mut ChaCha8Rng,
    ) -> Result<ZeroMaskTransformation> {
        let bernoulli = Bernoulli::new(self.probability)
            .map_err(|e| PerturbationError::InvalidConfig(e.to_string()))?;
        let mask = Array2::from_shape_fn(profiles.dim(), |_| bernoulli.sample(rng));
        Ok(ZeroMaskTransformation {
            shape: mask.dim(),
            mask,
            probability: self.probability,
        })
    }

    fn apply_transformation(
        &self,
        profiles: ArrayView2<'_, f64>,
        transformation: &ZeroMaskTransformation,
    ) -> Result<Array2<f64>> {
        ensure_shape(Self::NAME, transformation.mask.dim(), profiles)?;
        let mut perturbed = profiles.to_owned();
        Zip::from(&mut perturbed)
            .and(&transformation.mask)
            .for_each(|value, &dropped| {
                if dropped {
                    *value = 0.0;
                }
            });
        Ok(perturbed)
    }
}

/// Holds the last reported value of a column until a reading deviates from
/// it by more than `threshold` times the column's mean absolute value.
///
/// Bands are derived from the first matrix seen; no randomness is involved.
#[derive(Clone, Debug, PartialEq)]
pub struct PercentualDeadBand {
    threshold: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeadBandTransformation {
    pub bands: Array2<f64>,
    pub shape: (usize, usize),
    pub threshold: f64,
}

impl PercentualDeadBand {
    pub fn new(threshold: f64) -> Result<Self> {
        require_positive("threshold", threshold)?;
        Ok(Self { threshold })
    }
}

impl Default for PercentualDeadBand {
    fn default() -> Self {
        Self { threshold: 0.05 }
    }
}

impl PerturbationModel for PercentualDeadBand {
    type Transformation = DeadBandTransformation;

    const NAME: &'static str = "PercentualDeadBand";

    fn kind(&self) -> PerturbationKind {
        PerturbationKind::PercentualDeadBand {
            threshold: self.threshold,
        }
    }

    fn infer_transformation(
        &self,
        profiles: ArrayView2<'_, f64>,
        _rng: &mut ChaCha8Rng,
    ) -> Result<DeadBandTransformation> {
        let bands = column_mean_abs(profiles)? * self.threshold;
        Ok(DeadBandTransformation {
            shape: bands.dim(),
            bands,
            threshold: self.threshold,
        })
    }

    fn apply_transformation(
        &self,
        profiles: ArrayView2<'_, f64>,
        transformation: &DeadBandTransformation,
    ) -> Result<Array2<f64>> {
        ensure_columns(Self::NAME, transformation.bands.dim(), profiles)?;
        let mut perturbed = profiles.to_owned();

        for (c, mut column) in perturbed.columns_mut().into_iter().enumerate() {
            let band = transformation.bands[[0, c]];
            let mut reported = profiles[[0, c]];
            for (t, value) in column.iter_mut().enumerate() {
                let reading = profiles[[t, c]];
                if (reading - reported).abs() > band {
                    reported = reading;
                }
                *value = reported;
            }
        }

        Ok(perturbed)
    }
}

/// Rolls every column circularly by an integer number of timesteps drawn
/// from `shift_low..=shift_high`. Positive shifts move readings later.
#[derive(Clone, Debug, PartialEq)]
pub struct DiscreteTimeShift {
    shift_low: i64,
    shift_high: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeShiftTransformation {
    pub shifts: Vec<i64>,
    pub shape: (usize, usize),
    pub shift_low: i64,
    pub shift_high: i64,
}

impl DiscreteTimeShift {
    pub fn new(shift_low: i64, shift_high: i64) -> Result<Self> {
        if shift_low > shift_high {
            return Err(PerturbationError::InvalidConfig(format!(
                "shift_low ({shift_low}) must not exceed shift_high ({shift_high})"
            )));
        }
        Ok(Self {
            shift_low,
            shift_high,
        })
    }
}

impl Default for DiscreteTimeShift {
    fn default() -> Self {
        Self {
            shift_low: -1,
            shift_high: 1,
        }
    }
}

impl PerturbationModel for DiscreteTimeShift {
    type Transformation = TimeShiftTransformation;

    const NAME: &'static str = "DiscreteTimeShift";

    fn kind(&self) -> PerturbationKind {
        PerturbationKind::DiscreteTimeShift {
            shift_low: self.shift_low,
            shift_high: self.shift_high,
        }
    }

    fn infer_transformation(
        &self,
        profiles: ArrayView2<'_, f64>,
        rng: &mut ChaCha8Rng,
    ) -> Result<TimeShiftTransformation> {
        let shifts: Vec<i64> = (0..profiles.ncols())
            .map(|_| rng.gen_range(self.shift_low..=self.shift_high))
            .collect();
        Ok(TimeShiftTransformation {
            shape: (1, shifts.len()),
            shifts,
            shift_low: self.shift_low,
            shift_high: self.shift_high,
        })
    }

    fn apply_transformation(
        &self,
        profiles: ArrayView2<'_, f64>,
        transformation: &TimeShiftTransformation,
    ) -> Result<Array2<f64>> {
        ensure_columns(Self::NAME, (1, transformation.shifts.len()), profiles)?;
        let rows = profiles.nrows();
        let mut perturbed = Array2::<f64>::zeros(profiles.dim());

        for (c, &shift) in transformation.shifts.iter().enumerate() {
            let offset = shift.rem_euclid(rows as i64) as usize;
            for t in 0..rows {
                perturbed[[(t + offset) % rows, c]] = profiles[[t, c]];
            }
        }

        Ok(perturbed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perturbation::{Perturbation, Stage};
    use ndarray::array;

    #[test]
    fn zero_measurements_only_touches_masked_readings() {
        let x = Array2::from_shape_fn((50, 4), |(t, c)| 1.0 + t as f64 + c as f64);
        let mut stage = Stage::new(ZeroMeasurements::new(0.3).unwrap()).with_seed(42);
        let y = stage.apply(x.view()).unwrap();
        let mask = &stage.cached_transformation().unwrap().mask;

        let mut dropped = 0;
        for ((t, c), &value) in y.indexed_iter() {
            if mask[[t, c]] {
                dropped += 1;
                assert_eq!(value, 0.0);
            } else {
                assert_eq!(value, x[[t, c]]);
            }
        }
        assert!(dropped > 0 && dropped < 200);
    }

    #[test]
    fn zero_measurements_bounds() {
        assert!(ZeroMeasurements::new(1.5).is_err());
        assert!(ZeroMeasurements::new(-0.1).is_err());
        let mut never = Stage::new(ZeroMeasurements::new(0.0).unwrap()).with_seed(1);
        let x = Array2::from_elem((5, 2), 3.0);
        assert_eq!(never.apply(x.view()).unwrap(), x);
    }

    #[test]
    fn dead_band_flattens_small_deviations() {
        // Column mean |x| is about 10.2, so the band is just over 1.0.
        let x = array![[10.0], [10.5], [9.6], [11.5], [11.0], [8.4]];
        let mut stage = Stage::new(PercentualDeadBand::new(0.1).unwrap());
        let y = stage.apply(x.view()).unwrap();
        assert_eq!(y, array![[10.0], [10.0], [10.0], [11.5], [11.5], [8.4]]);
    }

    #[test]
    fn dead_band_is_deterministic_without_seed() {
        let x = Array2::from_shape_fn((30, 3), |(t, c)| ((t * (c + 1)) as f64).cos());
        let mut a = Stage::new(PercentualDeadBand::new(0.2).unwrap());
        let mut b = Stage::new(PercentualDeadBand::new(0.2).unwrap());
        assert_eq!(a.apply(x.view()).unwrap(), b.apply(x.view()).unwrap());
    }

    #[test]
    fn time_shift_rolls_columns() {
        let x = array![[1.0, 10.0], [2.0, 20.0], [3.0, 30.0], [4.0, 40.0]];
        let transformation = TimeShiftTransformation {
            shifts: vec![1, -1],
            shape: (1, 2),
            shift_low: -1,
            shift_high: 1,
        };
        let mut stage =
            Stage::new(DiscreteTimeShift::default()).with_transformation(transformation);
        let y = stage.apply(x.view()).unwrap();
        assert_eq!(y, array![[4.0, 20.0], [1.0, 30.0], [2.0, 40.0], [3.0, 10.0]]);
    }

    #[test]
    fn time_shift_draws_within_inclusive_range() {
        let x = Array2::from_shape_fn((6, 40), |(t, c)| (t + c) as f64);
        let mut stage = Stage::new(DiscreteTimeShift::new(-2, 3).unwrap()).with_seed(9);
        stage.apply(x.view()).unwrap();
        let shifts = &stage.cached_transformation().unwrap().shifts;
        assert_eq!(shifts.len(), 40);
        assert!(shifts.iter().all(|s| (-2..=3).contains(s)));
    }

    #[test]
    fn fixed_offset_is_a_valid_range() {
        assert!(DiscreteTimeShift::new(2, 2).is_ok());
        assert!(DiscreteTimeShift::new(3, 2).is_err());
    }
}
