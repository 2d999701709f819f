//! Bias Ensemble Example
//!
//! Builds a noise + bias + dead-band pipeline, generates a small ensemble of
//! perturbed daily load profiles and prints the per-scenario column means
//! together with the JSON provenance record of the pipeline.
//!
//! Set `RUST_LOG=noisy_load_profiles=debug` to see inference and seed events.

use ndarray::{Array2, Axis};
use noisy_load_profiles::{Pipeline, PerturbationError, PerturbationKind};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), PerturbationError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("Running load-profile ensemble generation...\n");

    // Three households, one reading per 15 minutes over a day.
    let profiles = Array2::from_shape_fn((96, 3), |(t, c)| {
        let hour = t as f64 / 4.0;
        let evening_peak = (-(hour - 19.0).powi(2) / 4.0).exp();
        0.3 + 0.2 * c as f64 + (1.2 + 0.3 * c as f64) * evening_peak
    });

    let mut pipeline = Pipeline::from_kinds(
        &[
            PerturbationKind::MultiplicativeGaussianNoise {
                mean: 0.0,
                std: 0.03,
            },
            PerturbationKind::ConstantRandomPercentualBias {
                uniform_low: -0.1,
                uniform_high: 0.1,
            },
            PerturbationKind::PercentualDeadBand { threshold: 0.02 },
        ],
        Some(42),
    )?;

    for stage in pipeline.configs() {
        println!("[{}] {:<11} {}", stage.index, stage.config.family(), stage.config);
    }
    println!();

    let baseline = profiles.mean_axis(Axis(0)).unwrap_or_default();
    println!("Baseline column means: {baseline:.4}");

    let scenarios = pipeline.ensemble(&profiles, 5)?;
    for (i, scenario) in scenarios.iter().enumerate() {
        let means = scenario.mean_axis(Axis(0)).unwrap_or_default();
        println!("Scenario {i} column means: {means:.4}");
    }

    println!("\nNext pipeline seed: {:?}", pipeline.seed());
    println!("{}", serde_json::to_string_pretty(&pipeline.config())?);

    Ok(())
}
