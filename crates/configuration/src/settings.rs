use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The root configuration structure for the entire application.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub artifacts: ArtifactSettings,
    pub ensemble: EnsembleSettings,
    pub training: TrainingSettings,
    pub logging: LoggingSettings,
}

impl Config {
    /// Checks the cross-field invariants that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ensemble.validate()?;
        self.training.validate()?;
        Ok(())
    }
}

/// Where the trained artifact set lives on disk.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ArtifactSettings {
    pub model_dir: PathBuf,
}

impl Default for ArtifactSettings {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
        }
    }
}

/// Combination weights written into the ensemble metadata when the secondary
/// classifier trains successfully.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EnsembleSettings {
    pub primary_weight: f64,
    pub secondary_weight: f64,
}

impl Default for EnsembleSettings {
    fn default() -> Self {
        Self {
            primary_weight: 0.55,
            secondary_weight: 0.45,
        }
    }
}

impl EnsembleSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Negated comparisons so NaN is rejected too.
        if !(self.primary_weight >= 0.0 && self.secondary_weight >= 0.0) {
            return Err(ConfigError::ValidationError(format!(
                "ensemble weights must be non-negative numbers, got {} / {}",
                self.primary_weight, self.secondary_weight
            )));
        }
        let total = self.primary_weight + self.secondary_weight;
        if !((total - 1.0).abs() <= 1e-9) {
            return Err(ConfigError::ValidationError(format!(
                "ensemble weights must sum to 1.0, got {total}"
            )));
        }
        Ok(())
    }
}

/// Parameters for a single training run.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TrainingSettings {
    /// Fraction of every class held out for evaluation.
    pub test_fraction: f64,
    /// Seed for the split, the forest bootstraps and the network.
    pub seed: u64,
    pub forest: ForestParams,
    pub network: NetworkParams,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            seed: 42,
            forest: ForestParams::default(),
            network: NetworkParams::default(),
        }
    }
}

impl TrainingSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(ConfigError::ValidationError(format!(
                "training.test_fraction must be in (0, 1), got {}",
                self.test_fraction
            )));
        }
        self.forest.validate()?;
        self.network.validate()?;
        Ok(())
    }
}

/// Hyper-parameters of the tree-ensemble (primary) classifier.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ForestParams {
    pub n_trees: usize,
    /// `None` grows trees until leaves are pure or too small to split.
    pub max_depth: Option<usize>,
    pub min_samples_leaf: usize,
    pub min_samples_split: usize,
    /// Features tried per split. `None` means `sqrt(n_features)`.
    pub max_features: Option<usize>,
    /// Weight classes inversely to their frequency in the training split.
    pub class_balanced: bool,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 300,
            max_depth: Some(12),
            min_samples_leaf: 2,
            min_samples_split: 2,
            max_features: None,
            class_balanced: true,
        }
    }
}

impl ForestParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_trees == 0 {
            return Err(ConfigError::ValidationError(
                "training.forest.n_trees must be at least 1".to_string(),
            ));
        }
        if self.min_samples_leaf == 0 || self.min_samples_split < 2 {
            return Err(ConfigError::ValidationError(
                "training.forest requires min_samples_leaf >= 1 and min_samples_split >= 2"
                    .to_string(),
            ));
        }
        if self.max_features == Some(0) {
            return Err(ConfigError::ValidationError(
                "training.forest.max_features must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Hyper-parameters of the feed-forward (secondary) classifier.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkParams {
    pub hidden_layers: Vec<usize>,
    pub learning_rate: f64,
    /// L2 penalty applied through AdamW's decoupled weight decay.
    pub weight_decay: f64,
    pub batch_size: usize,
    pub max_epochs: usize,
    /// Epochs without a validation-loss improvement before training stops.
    pub patience: usize,
    /// Share of the training split held back for early stopping.
    pub validation_fraction: f64,
    /// Minimum validation-loss decrease that counts as an improvement.
    pub tolerance: f64,
}

impl Default for NetworkParams {
    fn default() -> Self {
        Self {
            hidden_layers: vec![256, 128, 64, 32],
            learning_rate: 1e-3,
            weight_decay: 1e-4,
            batch_size: 64,
            max_epochs: 500,
            patience: 20,
            validation_fraction: 0.1,
            tolerance: 1e-4,
        }
    }
}

impl NetworkParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hidden_layers.is_empty() || self.hidden_layers.contains(&0) {
            return Err(ConfigError::ValidationError(
                "training.network.hidden_layers must be non-empty with non-zero widths"
                    .to_string(),
            ));
        }
        if self.batch_size == 0 || self.max_epochs == 0 {
            return Err(ConfigError::ValidationError(
                "training.network batch_size and max_epochs must be at least 1".to_string(),
            ));
        }
        if !(self.validation_fraction > 0.0 && self.validation_fraction < 1.0) {
            return Err(ConfigError::ValidationError(format!(
                "training.network.validation_fraction must be in (0, 1), got {}",
                self.validation_fraction
            )));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(ConfigError::ValidationError(format!(
                "training.network.learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        for (name, value) in [("weight_decay", self.weight_decay), ("tolerance", self.tolerance)] {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(ConfigError::ValidationError(format!(
                    "training.network.{name} must be a non-negative number, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Logging setup for the binaries.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive; `RUST_LOG` takes precedence when set.
    pub level: String,
    /// When set, logs are also written to a daily rolling file in this directory.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn negative_weight_is_rejected() {
        let settings = EnsembleSettings {
            primary_weight: 1.2,
            secondary_weight: -0.2,
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn nan_or_infinite_weights_are_rejected() {
        for (primary_weight, secondary_weight) in [
            (f64::NAN, 0.45),
            (0.55, f64::NAN),
            (f64::NAN, f64::NAN),
            (f64::INFINITY, 0.0),
        ] {
            let settings = EnsembleSettings {
                primary_weight,
                secondary_weight,
            };
            assert!(
                settings.validate().is_err(),
                "{primary_weight} / {secondary_weight} accepted"
            );
        }
    }

    #[test]
    fn non_finite_network_rates_are_rejected() {
        let mut network = NetworkParams::default();
        network.learning_rate = f64::NAN;
        assert!(network.validate().is_err());

        let mut network = NetworkParams::default();
        network.weight_decay = f64::NAN;
        assert!(network.validate().is_err());

        let mut network = NetworkParams::default();
        network.tolerance = f64::INFINITY;
        assert!(network.validate().is_err());
    }

    #[test]
    fn test_fraction_bounds_are_enforced() {
        let mut training = TrainingSettings::default();
        training.test_fraction = 1.0;
        assert!(training.validate().is_err());
        training.test_fraction = 0.0;
        assert!(training.validate().is_err());
    }

    #[test]
    fn zero_width_hidden_layer_is_rejected() {
        let mut network = NetworkParams::default();
        network.hidden_layers = vec![64, 0];
        assert!(network.validate().is_err());
    }
}
