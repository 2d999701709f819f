//! Perturbation lifecycle
//!
//! Every perturbation follows the same infer-once/apply-many contract: the
//! first profile matrix seen since construction (or since the last reset)
//! parameterizes a transformation, which is cached and reused on every later
//! call. Concrete variants only supply the formulas through
//! [`PerturbationModel`]; [`Stage`] owns the seed, the cache and input
//! tracking, and exposes the object-safe [`Perturbation`] trait that
//! [`Pipeline`](crate::Pipeline) works with.

use std::fmt;

use ndarray::{Array2, ArrayView2};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace};

use crate::kind::PerturbationKind;
use crate::profiles::validate_profiles;
use crate::Result;

/// Formulas of one perturbation variant.
pub trait PerturbationModel: fmt::Debug + Send {
    /// Frozen parameters produced by inference.
    type Transformation: Clone + fmt::Debug + Serialize + DeserializeOwned + Send;

    const NAME: &'static str;

    /// Constructor hyperparameters.
    fn kind(&self) -> PerturbationKind;

    /// Derives the transformation from the first matrix of a lifecycle.
    fn infer_transformation(
        &self,
        profiles: ArrayView2<'_, f64>,
        rng: &mut ChaCha8Rng,
    ) -> Result<Self::Transformation>;

    /// Applies a cached transformation. Must not draw randomness, and must
    /// reject inputs whose shape the transformation cannot cover.
    fn apply_transformation(
        &self,
        profiles: ArrayView2<'_, f64>,
        transformation: &Self::Transformation,
    ) -> Result<Array2<f64>>;
}

/// Object-safe view of a stateful perturbation.
pub trait Perturbation: fmt::Display + fmt::Debug + Send {
    fn name(&self) -> &'static str;

    /// Perturbs `profiles`, inferring and caching a transformation first if
    /// none is cached yet.
    fn apply(&mut self, profiles: ArrayView2<'_, f64>) -> Result<Array2<f64>>;

    /// Cached transformation as JSON, `None` before the first apply.
    fn transformation(&self) -> Result<Option<Value>>;

    /// Installs an externally supplied transformation. It is kept across
    /// resets, like one given at construction.
    fn load_transformation(&mut self, record: Value) -> Result<()>;

    fn is_parameterized(&self) -> bool;

    fn config(&self) -> PerturbationKind;

    fn seed(&self) -> Option<u64>;

    /// Sets the seed used by the next inference. With `reset` the cache is
    /// dropped so the new seed takes effect immediately.
    fn set_seed(&mut self, seed: u64, reset: bool);

    /// Drops the cached transformation and tracked input. Seed and
    /// configuration are left untouched.
    fn reset(&mut self);

    fn tracking(&self) -> bool;

    fn set_tracking(&mut self, track: bool);

    /// Copy of the last input, when tracking is enabled.
    fn tracked_input(&self) -> Option<&Array2<f64>>;
}

/// Cache of a perturbation's transformation.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformationState<T> {
    Uninitialized,
    Parameterized(T),
}

impl<T> TransformationState<T> {
    pub fn as_ref(&self) -> Option<&T> {
        match self {
            TransformationState::Uninitialized => None,
            TransformationState::Parameterized(transformation) => Some(transformation),
        }
    }

    pub fn is_parameterized(&self) -> bool {
        matches!(self, TransformationState::Parameterized(_))
    }

    /// Runs `init` only when nothing is cached, then returns the cached value.
    pub fn get_or_try_init<F>(&mut self, init: F) -> Result<&T>
    where
        F: FnOnce() -> Result<T>,
    {
        if let TransformationState::Uninitialized = self {
            *self = TransformationState::Parameterized(init()?);
        }
        match &*self {
            TransformationState::Parameterized(transformation) => Ok(transformation),
            TransformationState::Uninitialized => unreachable!("state initialised above"),
        }
    }
}

impl<T> Default for TransformationState<T> {
    fn default() -> Self {
        TransformationState::Uninitialized
    }
}

/// A perturbation variant together with its seed, cache and tracking state.
#[derive(Debug, Clone)]
pub struct Stage<M: PerturbationModel> {
    model: M,
    seed: Option<u64>,
    preset: Option<M::Transformation>,
    state: TransformationState<M::Transformation>,
    track_input_profiles: bool,
    tracked_input: Option<Array2<f64>>,
}

impl<M: PerturbationModel> Stage<M> {
    pub fn new(model: M) -> Self {
        Self {
            model,
            seed: None,
            preset: None,
            state: TransformationState::Uninitialized,
            track_input_profiles: false,
            tracked_input: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Uses `transformation` instead of inferring one.
    pub fn with_transformation(mut self, transformation: M::Transformation) -> Self {
        self.preset = Some(transformation);
        self.state = TransformationState::Uninitialized;
        self
    }

    pub fn with_tracking(mut self, track: bool) -> Self {
        self.track_input_profiles = track;
        self
    }

    /// Typed access to the cached transformation.
    pub fn cached_transformation(&self) -> Option<&M::Transformation> {
        self.state.as_ref()
    }

    pub fn boxed(self) -> Box<dyn Perturbation>
    where
        M: 'static,
    {
        Box::new(self)
    }
}

fn stage_rng(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    }
}

impl<M: PerturbationModel> Perturbation for Stage<M> {
    fn name(&self) -> &'static str {
        M::NAME
    }

    fn apply(&mut self, profiles: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        validate_profiles(profiles)?;

        let model = &self.model;
        let preset = &self.preset;
        let seed = self.seed;
        let transformation = self.state.get_or_try_init(|| match preset {
            Some(preset) => {
                debug!(perturbation = M::NAME, "using supplied transformation");
                Ok(preset.clone())
            }
            None => {
                debug!(
                    perturbation = M::NAME,
                    seed = ?seed,
                    rows = profiles.nrows(),
                    cols = profiles.ncols(),
                    "inferring transformation"
                );
                model.infer_transformation(profiles, &mut stage_rng(seed))
            }
        })?;

        trace!(perturbation = M::NAME, "applying cached transformation");
        let perturbed = model.apply_transformation(profiles, transformation)?;

        if self.track_input_profiles {
            self.tracked_input = Some(profiles.to_owned());
        }
        Ok(perturbed)
    }

    fn transformation(&self) -> Result<Option<Value>> {
        self.state
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(Into::into)
    }

    fn load_transformation(&mut self, record: Value) -> Result<()> {
        let transformation: M::Transformation = serde_json::from_value(record)?;
        self.preset = Some(transformation.clone());
        self.state = TransformationState::Parameterized(transformation);
        Ok(())
    }

    fn is_parameterized(&self) -> bool {
        self.state.is_parameterized()
    }

    fn config(&self) -> PerturbationKind {
        self.model.kind()
    }

    fn seed(&self) -> Option<u64> {
        self.seed
    }

    fn set_seed(&mut self, seed: u64, reset: bool) {
        self.seed = Some(seed);
        if reset {
            self.reset();
        }
    }

    fn reset(&mut self) {
        self.state = TransformationState::Uninitialized;
        self.tracked_input = None;
    }

    fn tracking(&self) -> bool {
        self.track_input_profiles
    }

    fn set_tracking(&mut self, track: bool) {
        self.track_input_profiles = track;
        if !track {
            self.tracked_input = None;
        }
    }

    fn tracked_input(&self) -> Option<&Array2<f64>> {
        self.tracked_input.as_ref()
    }
}

impl<M: PerturbationModel> fmt::Display for Stage<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", M::NAME)?;
        for (name, value) in self.model.kind().parameters() {
            write!(f, "{name}={value}, ")?;
        }
        match self.seed {
            Some(seed) => write!(f, "seed={seed})"),
            None => write!(f, "seed=None)"),
        }
    }
}
