//! Declarative perturbation configuration.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::perturbation::{Perturbation, Stage};
use crate::perturbations::{
    AdditiveOuNoise, ConstantRandomPercentualBias, ConstantRandomPercentualScaling,
    DiscreteTimeShift, MultiplicativeGaussianNoise, PercentualDeadBand, ZeroMeasurements,
};
use crate::Result;

/// Variant and hyperparameters of a perturbation.
///
/// This is the configuration record a perturbation reports for provenance,
/// and it can be turned back into a fresh perturbation with
/// [`build_perturbation`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PerturbationKind {
    MultiplicativeGaussianNoise {
        mean: f64,
        std: f64,
    },
    AdditiveOuNoise {
        theta: f64,
        mu: f64,
        sigma: f64,
        dt: f64,
    },
    ConstantRandomPercentualBias {
        uniform_low: f64,
        uniform_high: f64,
    },
    ConstantRandomPercentualScaling {
        uniform_low: f64,
        uniform_high: f64,
    },
    ZeroMeasurements {
        probability: f64,
    },
    PercentualDeadBand {
        threshold: f64,
    },
    DiscreteTimeShift {
        shift_low: i64,
        shift_high: i64,
    },
}

/// Builds an unparameterized perturbation, validating the hyperparameters.
pub fn build_perturbation(
    kind: &PerturbationKind,
    seed: Option<u64>,
) -> Result<Box<dyn Perturbation>> {
    let stage = match *kind {
        PerturbationKind::MultiplicativeGaussianNoise { mean, std } => {
            seeded(Stage::new(MultiplicativeGaussianNoise::new(mean, std)?), seed)
        }
        PerturbationKind::AdditiveOuNoise {
            theta,
            mu,
            sigma,
            dt,
        } => seeded(Stage::new(AdditiveOuNoise::new(theta, mu, sigma, dt)?), seed),
        PerturbationKind::ConstantRandomPercentualBias {
            uniform_low,
            uniform_high,
        } => seeded(
            Stage::new(ConstantRandomPercentualBias::new(uniform_low, uniform_high)?),
            seed,
        ),
        PerturbationKind::ConstantRandomPercentualScaling {
            uniform_low,
            uniform_high,
        } => seeded(
            Stage::new(ConstantRandomPercentualScaling::new(uniform_low, uniform_high)?),
            seed,
        ),
        PerturbationKind::ZeroMeasurements { probability } => {
            seeded(Stage::new(ZeroMeasurements::new(probability)?), seed)
        }
        PerturbationKind::PercentualDeadBand { threshold } => {
            seeded(Stage::new(PercentualDeadBand::new(threshold)?), seed)
        }
        PerturbationKind::DiscreteTimeShift {
            shift_low,
            shift_high,
        } => seeded(Stage::new(DiscreteTimeShift::new(shift_low, shift_high)?), seed),
    };
    Ok(stage)
}

fn seeded<M>(stage: Stage<M>, seed: Option<u64>) -> Box<dyn Perturbation>
where
    M: crate::perturbation::PerturbationModel + 'static,
{
    match seed {
        Some(seed) => stage.with_seed(seed).boxed(),
        None => stage.boxed(),
    }
}

impl PerturbationKind {
    pub fn name(&self) -> &'static str {
        match self {
            PerturbationKind::MultiplicativeGaussianNoise { .. } => "MultiplicativeGaussianNoise",
            PerturbationKind::AdditiveOuNoise { .. } => "AdditiveOUNoise",
            PerturbationKind::ConstantRandomPercentualBias { .. } => "ConstantRandomPercentualBias",
            PerturbationKind::ConstantRandomPercentualScaling { .. } => {
                "ConstantRandomPercentualScaling"
            }
            PerturbationKind::ZeroMeasurements { .. } => "ZeroMeasurements",
            PerturbationKind::PercentualDeadBand { .. } => "PercentualDeadBand",
            PerturbationKind::DiscreteTimeShift { .. } => "DiscreteTimeShift",
        }
    }

    pub fn family(&self) -> &'static str {
        match self {
            PerturbationKind::MultiplicativeGaussianNoise { .. }
            | PerturbationKind::AdditiveOuNoise { .. } => "random",
            PerturbationKind::ConstantRandomPercentualBias { .. }
            | PerturbationKind::ConstantRandomPercentualScaling { .. } => "systematic",
            PerturbationKind::ZeroMeasurements { .. }
            | PerturbationKind::PercentualDeadBand { .. }
            | PerturbationKind::DiscreteTimeShift { .. } => "measurement",
        }
    }

    /// Hyperparameters in declaration order, formatted for display.
    pub fn parameters(&self) -> Vec<(&'static str, String)> {
        match self {
            PerturbationKind::MultiplicativeGaussianNoise { mean, std } => {
                vec![("mean", mean.to_string()), ("std", std.to_string())]
            }
            PerturbationKind::AdditiveOuNoise {
                theta,
                mu,
                sigma,
                dt,
            } => vec![
                ("theta", theta.to_string()),
                ("mu", mu.to_string()),
                ("sigma", sigma.to_string()),
                ("dt", dt.to_string()),
            ],
            PerturbationKind::ConstantRandomPercentualBias {
                uniform_low,
                uniform_high,
            }
            | PerturbationKind::ConstantRandomPercentualScaling {
                uniform_low,
                uniform_high,
            } => vec![
                ("uniform_low", uniform_low.to_string()),
                ("uniform_high", uniform_high.to_string()),
            ],
            PerturbationKind::ZeroMeasurements { probability } => {
                vec![("probability", probability.to_string())]
            }
            PerturbationKind::PercentualDeadBand { threshold } => {
                vec![("threshold", threshold.to_string())]
            }
            PerturbationKind::DiscreteTimeShift {
                shift_low,
                shift_high,
            } => vec![
                ("shift_low", shift_low.to_string()),
                ("shift_high", shift_high.to_string()),
            ],
        }
    }
}

impl fmt::Display for PerturbationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parameters = self
            .parameters()
            .into_iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "{}({parameters})", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::{build_perturbation, PerturbationKind};
    use crate::PerturbationError;

    #[test]
    fn built_perturbation_reports_its_kind() {
        let kind = PerturbationKind::PercentualDeadBand { threshold: 0.1 };
        let perturbation = build_perturbation(&kind, Some(8)).unwrap();
        assert_eq!(perturbation.config(), kind);
        assert_eq!(perturbation.seed(), Some(8));
        assert_eq!(perturbation.name(), "PercentualDeadBand");
    }

    #[test]
    fn invalid_bounds_fail_at_build_time() {
        let kind = PerturbationKind::ConstantRandomPercentualBias {
            uniform_low: 0.2,
            uniform_high: 0.2,
        };
        assert!(matches!(
            build_perturbation(&kind, None),
            Err(PerturbationError::InvalidConfig(_))
        ));
    }

    #[test]
    fn kinds_serialize_with_type_tag() {
        let kind = PerturbationKind::DiscreteTimeShift {
            shift_low: -2,
            shift_high: 3,
        };
        let value = serde_json::to_value(&kind).unwrap();
        assert_eq!(value["type"], "discrete_time_shift");
        let back: PerturbationKind = serde_json::from_value(value).unwrap();
        assert_eq!(back, kind);
        assert_eq!(back.family(), "measurement");
    }

    #[test]
    fn display_matches_constructor_arguments() {
        let kind = PerturbationKind::MultiplicativeGaussianNoise {
            mean: 0.0,
            std: 0.05,
        };
        assert_eq!(kind.to_string(), "MultiplicativeGaussianNoise(mean=0, std=0.05)");
    }
}
