use ml_features::FeatureError;
use ml_models::{ArtifactError, ModelError};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Neither ensemble metadata nor a legacy model exists. Training must be
    /// run before the engine can be constructed.
    #[error("No usable artifact set found in {0}; run training first")]
    ArtifactMissing(PathBuf),

    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    /// The request does not match the feature schema. Fatal for that request only.
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(#[from] FeatureError),

    #[error("Artifacts do not agree with their metadata: {0}")]
    Incompatible(String),

    #[error("Inference failed: {0}")]
    Inference(#[from] ModelError),
}
