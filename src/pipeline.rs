//! Sequential composition of perturbations
//!
//! A pipeline feeds a profile matrix through its stages in order and keeps
//! their seeds in step. Seeds advance on reset with one of two policies:
//!
//! - the pipeline was given a seed: that seed is incremented and pushed to
//!   every stage, overwriting whatever seed a stage had;
//! - otherwise every stage that has its own seed increments it.
//!
//! Either way repeated apply/reset cycles walk a reproducible sequence of
//! distinct scenarios.

use std::fmt;
use std::ops::Index;

use ndarray::{Array2, ArrayBase, Data, Dimension};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace};

use crate::kind::{build_perturbation, PerturbationKind};
use crate::perturbation::Perturbation;
use crate::profiles::as_profile_matrix;
use crate::{PerturbationError, Result};

/// Configuration of one stage, identified by its position.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    pub index: usize,
    pub label: String,
    pub seed: Option<u64>,
    pub config: PerturbationKind,
}

/// Cached transformation of one stage, `None` until the pipeline is applied.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StageTransformation {
    pub index: usize,
    pub label: String,
    pub transformation: Option<Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub perturbations: Vec<StageConfig>,
    pub num_perturbations: usize,
    pub seed: Option<u64>,
}

/// Ordered chain of perturbations with shared seeding and reset.
#[derive(Debug)]
pub struct Pipeline {
    perturbations: Vec<Box<dyn Perturbation>>,
    is_applied: bool,
    seed: Option<u64>,
}

impl Pipeline {
    /// Fails on an empty stage list. A pipeline seed, if given, replaces the
    /// seed of every stage.
    pub fn new(perturbations: Vec<Box<dyn Perturbation>>, seed: Option<u64>) -> Result<Self> {
        if perturbations.is_empty() {
            return Err(PerturbationError::InvalidConfig(
                "pipeline must contain at least one perturbation".to_string(),
            ));
        }

        let mut pipeline = Self {
            perturbations,
            is_applied: false,
            seed: None,
        };
        if let Some(seed) = seed {
            pipeline.set_seed(seed, true);
        }
        Ok(pipeline)
    }

    pub fn from_kinds(kinds: &[PerturbationKind], seed: Option<u64>) -> Result<Self> {
        let perturbations = kinds
            .iter()
            .map(|kind| build_perturbation(kind, None))
            .collect::<Result<Vec<_>>>()?;
        Self::new(perturbations, seed)
    }

    /// Rebuilds an unapplied pipeline from a recorded configuration,
    /// including per-stage seeds.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        if config.num_perturbations != config.perturbations.len() {
            return Err(PerturbationError::InvalidConfig(format!(
                "num_perturbations ({}) does not match the {} recorded stages",
                config.num_perturbations,
                config.perturbations.len()
            )));
        }
        let perturbations = config
            .perturbations
            .iter()
            .map(|stage| build_perturbation(&stage.config, stage.seed))
            .collect::<Result<Vec<_>>>()?;
        Self::new(perturbations, config.seed)
    }

    /// Runs every stage in order on a copy of `profiles`.
    ///
    /// The input must be a non-empty 2D matrix; it is checked before any stage
    /// runs. A failing stage is reported with its index and representation.
    pub fn apply<S, D>(&mut self, profiles: &ArrayBase<S, D>) -> Result<Array2<f64>>
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        let profiles = as_profile_matrix(profiles)?;
        debug!(
            stages = self.perturbations.len(),
            rows = profiles.nrows(),
            cols = profiles.ncols(),
            "applying pipeline"
        );

        let mut current = profiles.to_owned();
        for (index, perturbation) in self.perturbations.iter_mut().enumerate() {
            trace!(index, perturbation = perturbation.name(), "applying stage");
            current = perturbation
                .apply(current.view())
                .map_err(|source| PerturbationError::Stage {
                    index,
                    stage: perturbation.to_string(),
                    source: Box::new(source),
                })?;
        }

        self.is_applied = true;
        Ok(current)
    }

    /// Generates `n` scenarios by alternating apply and a seed-advancing
    /// reset. The first scenario uses whatever the stages currently cache;
    /// the pipeline is left reset so a later call continues the sequence.
    pub fn ensemble<S, D>(
        &mut self,
        profiles: &ArrayBase<S, D>,
        n: usize,
    ) -> Result<Vec<Array2<f64>>>
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        let profiles = as_profile_matrix(profiles)?;
        let mut scenarios = Vec::with_capacity(n);
        for _ in 0..n {
            scenarios.push(self.apply(&profiles)?);
            self.reset(true);
        }
        Ok(scenarios)
    }

    /// Enables or disables input tracking on every stage.
    pub fn track_perturbation_process(&mut self, track: bool) {
        for perturbation in &mut self.perturbations {
            perturbation.set_tracking(track);
        }
    }

    pub fn transformations(&self) -> Result<Vec<StageTransformation>> {
        self.perturbations
            .iter()
            .enumerate()
            .map(|(index, perturbation)| {
                let transformation = if self.is_applied {
                    perturbation.transformation()?
                } else {
                    None
                };
                Ok(StageTransformation {
                    index,
                    label: perturbation.to_string(),
                    transformation,
                })
            })
            .collect()
    }

    pub fn configs(&self) -> Vec<StageConfig> {
        self.perturbations
            .iter()
            .enumerate()
            .map(|(index, perturbation)| StageConfig {
                index,
                label: perturbation.to_string(),
                seed: perturbation.seed(),
                config: perturbation.config(),
            })
            .collect()
    }

    pub fn config(&self) -> PipelineConfig {
        PipelineConfig {
            perturbations: self.configs(),
            num_perturbations: self.perturbations.len(),
            seed: self.seed,
        }
    }

    /// Clears every stage's cache, first advancing seeds when
    /// `increment_seed` is set (see the module docs for the policy).
    pub fn reset(&mut self, increment_seed: bool) {
        if increment_seed {
            match self.seed {
                Some(seed) => {
                    let next = seed.wrapping_add(1);
                    self.seed = Some(next);
                    for perturbation in &mut self.perturbations {
                        perturbation.set_seed(next, false);
                    }
                    debug!(seed = next, "advanced pipeline seed");
                }
                None => {
                    for perturbation in &mut self.perturbations {
                        if let Some(seed) = perturbation.seed() {
                            perturbation.set_seed(seed.wrapping_add(1), false);
                        }
                    }
                    debug!("advanced stage seeds");
                }
            }
        }

        for perturbation in &mut self.perturbations {
            perturbation.reset();
        }
        self.is_applied = false;
    }

    /// Pushes `seed` to every stage and adopts it as the pipeline seed.
    /// With `reset`, caches are cleared first without advancing any seed.
    pub fn set_seed(&mut self, seed: u64, reset: bool) {
        if reset {
            self.reset(false);
        }
        for perturbation in &mut self.perturbations {
            perturbation.set_seed(seed, false);
        }
        self.seed = Some(seed);
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    pub fn is_applied(&self) -> bool {
        self.is_applied
    }

    pub fn len(&self) -> usize {
        self.perturbations.len()
    }

    /// Always false; construction rejects empty pipelines.
    pub fn is_empty(&self) -> bool {
        self.perturbations.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&dyn Perturbation> {
        self.perturbations.get(index).map(Box::as_ref)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut dyn Perturbation> {
        match self.perturbations.get_mut(index) {
            Some(perturbation) => Some(perturbation.as_mut()),
            None => None,
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Box<dyn Perturbation>> {
        self.perturbations.iter()
    }
}

impl Index<usize> for Pipeline {
    type Output = dyn Perturbation;

    fn index(&self, index: usize) -> &Self::Output {
        self.perturbations[index].as_ref()
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Pipeline(")?;
        for perturbation in &self.perturbations {
            writeln!(f, "\t{perturbation}")?;
        }
        write!(f, ")")
    }
}
