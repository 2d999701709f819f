//! Noisy load profiles
//!
//! Seed-reproducible perturbations for load-profile time series. A profile
//! matrix holds one timestep per row and one independent profile per column;
//! every perturbation returns a matrix of the same shape with noise, bias or
//! measurement artifacts injected.
//!
//! Perturbations infer their random parameters once from the first matrix they
//! see, cache them, and reapply the cached parameters until they are reset. A
//! [`Pipeline`] chains several perturbations and manages seeding across the
//! whole chain so repeated apply/reset cycles yield a reproducible ensemble of
//! scenarios.
//!
//! None of the types here lock internally. Mutating operations take `&mut
//! self`; sharing one instance between threads needs external synchronization.

pub mod kind;
pub mod perturbation;
pub mod perturbations;
pub mod pipeline;
pub mod profiles;

use thiserror::Error;

pub use kind::{build_perturbation, PerturbationKind};
pub use perturbation::{Perturbation, PerturbationModel, Stage};
pub use perturbations::{
    AdditiveOuNoise, ConstantRandomPercentualBias, ConstantRandomPercentualScaling,
    DiscreteTimeShift, MultiplicativeGaussianNoise, PercentualDeadBand, ZeroMeasurements,
};
pub use pipeline::{Pipeline, PipelineConfig, StageConfig, StageTransformation};

pub type Result<T, E = PerturbationError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum PerturbationError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("profiles must be a 2D array (timesteps x profiles), got {ndim} dimension(s)")]
    WrongRank { ndim: usize },
    #[error("profiles array cannot be empty (got shape {rows}x{cols})")]
    EmptyProfiles { rows: usize, cols: usize },
    #[error("{context} shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        context: &'static str,
        expected: (usize, usize),
        got: (usize, usize),
    },
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("error applying perturbation {index} ({stage}): {source}")]
    Stage {
        index: usize,
        stage: String,
        #[source]
        source: Box<PerturbationError>,
    },
}
