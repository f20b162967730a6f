use analytics::AnalyticsError;
use configuration::ConfigError;
use ml_features::FeatureError;
use ml_models::{ArtifactError, ModelError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrainerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Dataset error: {0}")]
    Dataset(#[from] FeatureError),

    #[error("Invalid labels: {0}")]
    Labels(String),

    /// The primary classifier could not be fitted. Unlike the secondary,
    /// there is nothing to fall back to.
    #[error("Primary model failed to fit: {0}")]
    ModelFit(#[source] ModelError),

    #[error("Models were fitted against different class sets: {0}")]
    Misaligned(String),

    #[error("Model inference failed during evaluation: {0}")]
    Inference(#[from] ModelError),

    #[error("Evaluation error: {0}")]
    Evaluation(#[from] AnalyticsError),

    #[error("Failed to persist artifact set: {0}")]
    Persistence(#[from] ArtifactError),

    #[error("Failed to render training report: {0}")]
    Report(#[from] serde_json::Error),
}
