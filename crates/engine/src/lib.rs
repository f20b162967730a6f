//! # Ensemble Decision Engine
//!
//! Turns one feature vector into a BUY/HOLD/SELL decision using the artifact
//! set produced by the training pipeline.
//!
//! An [`EnsembleEngine`] is constructed once per process. Construction reads
//! every artifact and settles on an [`EngineState`]; after that, `predict` is
//! a pure function of its input and the loaded models, so one engine can be
//! shared by reference across threads without locking. New artifacts are only
//! picked up by constructing a new engine.

use configuration::Config;
use core_types::{ClassProbability, ContributingModels, DecisionResult, FeatureVector, RationaleEntry};
use ml_models::ensemble::{combine, round_to, select_class, to_percentage};
use ml_models::{
    ArtifactError, ArtifactStore, Classifier, EnsembleMetadata, EnsembleWeights, ModelError, SecondaryLoad,
};
use std::path::Path;

pub mod error;
pub mod state;

pub use error::EngineError;
pub use state::EngineState;

/// Number of features reported in a decision's rationale.
const RATIONALE_LEN: usize = 3;

/// A loaded artifact set, ready to serve predictions.
pub struct EnsembleEngine {
    metadata: EnsembleMetadata,
    primary: Box<dyn Classifier>,
    secondary: Option<Box<dyn Classifier>>,
    weights: EnsembleWeights,
    state: EngineState,
    rationale: Vec<RationaleEntry>,
}

impl EnsembleEngine {
    /// Loads the artifact set in `model_dir`.
    ///
    /// Ensemble metadata takes precedence over a legacy single model. A
    /// secondary model that fails to load degrades the engine instead of
    /// failing it; a missing or broken primary is fatal.
    pub fn load(model_dir: impl AsRef<Path>) -> Result<Self, EngineError> {
        let store = ArtifactStore::new(model_dir.as_ref());
        let snapshot = match store.snapshot() {
            Ok(snapshot) => snapshot,
            Err(ArtifactError::NotFound(_)) => {
                return Err(EngineError::ArtifactMissing(store.root().to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };

        if snapshot.has_metadata() {
            let metadata = snapshot.load_metadata()?;
            let primary = snapshot.load_primary()?;
            let secondary = if metadata.secondary_available {
                snapshot.load_secondary(metadata.features.len(), metadata.n_classes())
            } else {
                SecondaryLoad::Unavailable("not part of this artifact set".to_string())
            };
            tracing::debug!(set = %snapshot.dir().display(), "Loading artifact set");
            Self::assemble(metadata, Box::new(primary), secondary, false)
        } else if snapshot.has_legacy() {
            let primary = snapshot.load_legacy()?;
            Self::assemble(
                EnsembleMetadata::legacy_default(),
                Box::new(primary),
                SecondaryLoad::Unavailable("legacy artifact set".to_string()),
                true,
            )
        } else {
            Err(EngineError::ArtifactMissing(store.root().to_path_buf()))
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, EngineError> {
        Self::load(&config.artifacts.model_dir)
    }

    /// Builds an engine from in-memory parts, applying the same state rules
    /// as [`EnsembleEngine::load`].
    pub fn from_parts(
        metadata: EnsembleMetadata,
        primary: Box<dyn Classifier>,
        secondary: SecondaryLoad,
    ) -> Result<Self, EngineError> {
        Self::assemble(metadata, primary, secondary, false)
    }

    fn assemble(
        metadata: EnsembleMetadata,
        primary: Box<dyn Classifier>,
        secondary: SecondaryLoad,
        legacy: bool,
    ) -> Result<Self, EngineError> {
        metadata.validate()?;

        let n_features = metadata.features.len();
        let n_classes = metadata.n_classes();
        if primary.n_classes() != n_classes {
            return Err(EngineError::Incompatible(format!(
                "primary model emits {} classes, metadata lists {}",
                primary.n_classes(),
                n_classes
            )));
        }
        if primary.n_features() != n_features {
            return Err(EngineError::Incompatible(format!(
                "primary model expects {} features, metadata lists {}",
                primary.n_features(),
                n_features
            )));
        }

        let (state, secondary) = match (legacy, metadata.secondary_available, secondary) {
            (true, _, _) => (EngineState::LegacySingleModel, None),
            (false, false, _) => (EngineState::EnsemblePrimaryOnly, None),
            (false, true, SecondaryLoad::Unavailable(reason)) => {
                (EngineState::EnsembleDegraded { reason }, None)
            }
            (false, true, SecondaryLoad::Loaded(model)) => {
                if model.n_classes() != n_classes || model.n_features() != n_features {
                    let reason = format!(
                        "secondary model shape {}x{} does not match metadata {}x{}",
                        model.n_features(),
                        model.n_classes(),
                        n_features,
                        n_classes
                    );
                    (EngineState::EnsembleDegraded { reason }, None)
                } else {
                    (EngineState::EnsembleFull, Some(model))
                }
            }
        };

        let weights = if secondary.is_some() {
            metadata.effective_weights()
        } else {
            EnsembleWeights::PRIMARY_ONLY
        };

        match &state {
            EngineState::EnsembleDegraded { reason } => {
                tracing::warn!(%reason, "Secondary model unavailable, serving primary only");
            }
            EngineState::LegacySingleModel => {
                tracing::warn!("No ensemble metadata found, serving legacy single model with default schema");
            }
            _ => {}
        }
        tracing::info!(
            state = %state,
            primary_weight = weights.primary,
            secondary_weight = weights.secondary,
            classes = ?metadata.classes,
            "Decision engine ready"
        );

        let rationale = Self::build_rationale(&metadata, &*primary);

        Ok(Self {
            metadata,
            primary,
            secondary,
            weights,
            state,
            rationale,
        })
    }

    /// Top features by primary importance. Importances never change after
    /// load, so this is computed once.
    fn build_rationale(metadata: &EnsembleMetadata, primary: &dyn Classifier) -> Vec<RationaleEntry> {
        let Some(importances) = primary.feature_importances() else {
            return Vec::new();
        };
        if importances.len() != metadata.features.len() {
            tracing::warn!(
                expected = metadata.features.len(),
                got = importances.len(),
                "Ignoring feature importances of the wrong length"
            );
            return Vec::new();
        }
        let mut ranked: Vec<(&String, f64)> =
            metadata.features.names().iter().zip(importances).collect();
        // Stable sort: equal importances keep schema order.
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
            .into_iter()
            .take(RATIONALE_LEN)
            .map(|(feature, importance)| RationaleEntry {
                feature: feature.clone(),
                importance: round_to(importance, 3),
            })
            .collect()
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn metadata(&self) -> &EnsembleMetadata {
        &self.metadata
    }

    /// The weights actually applied, after any degradation.
    pub fn weights(&self) -> EnsembleWeights {
        self.weights
    }

    pub fn contributing_models(&self) -> ContributingModels {
        if self.secondary.is_some() && self.weights.uses_secondary() {
            ContributingModels::Ensemble
        } else {
            ContributingModels::PrimaryOnly
        }
    }

    /// Decides for one feature vector.
    ///
    /// The vector must carry exactly the metadata's features. Ties between
    /// classes go to the one listed first in the metadata.
    pub fn predict(&self, features: &FeatureVector) -> Result<DecisionResult, EngineError> {
        let input = self.metadata.features.vectorize(features)?;
        let n_classes = self.metadata.n_classes();

        let primary = self.primary.predict_proba(&input)?;
        if primary.len() != n_classes {
            return Err(ModelError::DimensionMismatch {
                expected: n_classes,
                got: primary.len(),
            }
            .into());
        }

        let (distribution, contributing_models) = match &self.secondary {
            Some(secondary) if self.contributing_models().uses_secondary() => {
                match secondary
                    .predict_proba(&input)
                    .and_then(|s| combine(&primary, &s, self.weights))
                {
                    Ok(combined) => (combined, ContributingModels::Ensemble),
                    // This request only: the engine state stays as loaded.
                    Err(e) => {
                        tracing::warn!(error = %e, "Secondary model failed on this input, using primary alone");
                        (primary, ContributingModels::PrimaryOnly)
                    }
                }
            }
            // Primary alone: its distribution is used untouched.
            _ => (primary, self.contributing_models()),
        };

        let index = select_class(&distribution).ok_or_else(|| {
            EngineError::Inference(ModelError::InvalidInput(
                "model produced no usable probabilities".to_string(),
            ))
        })?;

        tracing::debug!(decision = %self.metadata.classes[index], ?distribution, "Prediction");

        Ok(DecisionResult {
            decision: self.metadata.classes[index].clone(),
            confidence: to_percentage(distribution[index]),
            rationale: self.rationale.clone(),
            contributing_models,
            probabilities: self
                .metadata
                .classes
                .iter()
                .zip(&distribution)
                .map(|(label, &probability)| ClassProbability {
                    label: label.clone(),
                    probability,
                })
                .collect(),
        })
    }
}
