use crate::ensemble::{EnsembleWeights, WEIGHT_TOLERANCE};
use crate::error::ArtifactError;
use chrono::{DateTime, Utc};
use ml_features::FeatureSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Class ordering assumed for artifact sets that predate the metadata file.
pub const DEFAULT_CLASSES: [&str; 3] = ["BUY", "HOLD", "SELL"];

/// Newest metadata layout this build understands.
pub const METADATA_FORMAT_VERSION: u32 = 1;

fn default_format_version() -> u32 {
    METADATA_FORMAT_VERSION
}

/// The descriptor that binds a set of model artifacts together.
///
/// Serialized as JSON next to the artifacts. The weight and availability
/// fields keep the names older training runs wrote (`rf_weight`,
/// `mlp_weight`, `dl_available`) so existing model directories keep loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleMetadata {
    #[serde(default = "default_format_version")]
    pub format_version: u32,
    #[serde(rename = "rf_weight")]
    pub primary_weight: f64,
    #[serde(rename = "mlp_weight")]
    pub secondary_weight: f64,
    #[serde(rename = "dl_available")]
    pub secondary_available: bool,
    pub classes: Vec<String>,
    pub features: FeatureSchema,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trained_at: Option<DateTime<Utc>>,
}

impl EnsembleMetadata {
    /// Metadata for a freshly trained set. When the secondary is unavailable
    /// the weights are recorded as `{1.0, 0.0}` regardless of `weights`.
    pub fn new(
        classes: Vec<String>,
        features: FeatureSchema,
        weights: EnsembleWeights,
        secondary_available: bool,
    ) -> Self {
        let weights = if secondary_available {
            weights
        } else {
            EnsembleWeights::PRIMARY_ONLY
        };
        Self {
            format_version: METADATA_FORMAT_VERSION,
            primary_weight: weights.primary,
            secondary_weight: weights.secondary,
            secondary_available,
            classes,
            features,
            trained_at: None,
        }
    }

    /// What a legacy single-model directory is assumed to contain: the default
    /// classes over the default schema, primary only.
    pub fn legacy_default() -> Self {
        Self::new(
            DEFAULT_CLASSES.iter().map(|c| c.to_string()).collect(),
            FeatureSchema::default(),
            EnsembleWeights::PRIMARY_ONLY,
            false,
        )
    }

    pub fn with_trained_at(mut self, at: DateTime<Utc>) -> Self {
        self.trained_at = Some(at);
        self
    }

    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn validate(&self) -> Result<(), ArtifactError> {
        if self.format_version > METADATA_FORMAT_VERSION {
            return Err(ArtifactError::Incompatible(format!(
                "metadata format version {} is newer than supported version {}",
                self.format_version, METADATA_FORMAT_VERSION
            )));
        }
        if self.classes.len() < 2 {
            return Err(ArtifactError::Incompatible(format!(
                "metadata lists {} classes, at least 2 are required",
                self.classes.len()
            )));
        }
        let unique: HashSet<&str> = self.classes.iter().map(String::as_str).collect();
        if unique.len() != self.classes.len() {
            return Err(ArtifactError::Incompatible(
                "metadata class labels are not unique".to_string(),
            ));
        }
        if !(self.primary_weight >= 0.0 && self.secondary_weight >= 0.0) {
            return Err(ArtifactError::Incompatible(format!(
                "metadata weights must be non-negative, got {} / {}",
                self.primary_weight, self.secondary_weight
            )));
        }
        if self.secondary_available
            && (self.primary_weight + self.secondary_weight - 1.0).abs() > WEIGHT_TOLERANCE
        {
            return Err(ArtifactError::Incompatible(format!(
                "metadata weights sum to {}, expected 1.0",
                self.primary_weight + self.secondary_weight
            )));
        }
        Ok(())
    }

    /// The weights inference should apply, given only what the metadata
    /// declares. Without a secondary this is always `{1.0, 0.0}`.
    pub fn effective_weights(&self) -> EnsembleWeights {
        if self.secondary_available {
            EnsembleWeights {
                primary: self.primary_weight,
                secondary: self.secondary_weight,
            }
        } else {
            if self.primary_weight != 1.0 || self.secondary_weight != 0.0 {
                tracing::warn!(
                    rf_weight = self.primary_weight,
                    mlp_weight = self.secondary_weight,
                    "Secondary model declared unavailable; ignoring stored weights"
                );
            }
            EnsembleWeights::PRIMARY_ONLY
        }
    }
}
