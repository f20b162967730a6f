use crate::encoder::LabelEncoder;
use crate::error::TrainerError;
use crate::report::TrainingReport;
use analytics::{AnalyticsEngine, ClassificationReport};
use chrono::Utc;
use configuration::{Config, ConfigError, TrainingSettings};
use ml_features::LabeledDataset;
use ml_models::ensemble::{combine, select_class};
use ml_models::sampling::stratified_split;
use ml_models::{
    ArtifactSet, ArtifactStore, Classifier, EnsembleMetadata, EnsembleWeights, FeatureScaler,
    ModelError, NeuralNetwork, RandomForest,
};
use ndarray::{Array2, Axis};
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

/// Fits, evaluates and packages the primary and secondary classifiers.
///
/// A run is a single synchronous batch job. Only the artifact store touches
/// the filesystem, and only in [`TrainedEnsemble::persist`].
pub struct TrainingPipeline {
    settings: TrainingSettings,
    weights: EnsembleWeights,
}

/// The in-memory result of a run, ready to be persisted as one artifact set.
pub struct TrainedEnsemble {
    pub primary: RandomForest,
    pub secondary: Option<(NeuralNetwork, FeatureScaler)>,
    pub metadata: EnsembleMetadata,
    pub report: TrainingReport,
}

impl TrainingPipeline {
    pub fn new(settings: TrainingSettings, weights: EnsembleWeights) -> Self {
        Self { settings, weights }
    }

    pub fn from_config(config: &Config) -> Result<Self, TrainerError> {
        let weights = EnsembleWeights::new(
            config.ensemble.primary_weight,
            config.ensemble.secondary_weight,
        )
        .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        Ok(Self::new(config.training.clone(), weights))
    }

    pub fn run(&self, dataset: &LabeledDataset) -> Result<TrainedEnsemble, TrainerError> {
        let seed = self.settings.seed;
        let encoder = LabelEncoder::fit(dataset.labels())?;
        let y = encoder.transform(dataset.labels())?;
        let n_classes = encoder.n_classes();

        let (train_idx, test_idx) =
            stratified_split(&y, n_classes, self.settings.test_fraction, seed);
        if test_idx.is_empty() {
            return Err(TrainerError::Labels(
                "too few samples per class to hold out a test split".to_string(),
            ));
        }
        let x_train = dataset.features().select(Axis(0), &train_idx);
        let x_test = dataset.features().select(Axis(0), &test_idx);
        let y_train: Vec<usize> = train_idx.iter().map(|&i| y[i]).collect();
        let y_test: Vec<usize> = test_idx.iter().map(|&i| y[i]).collect();

        tracing::info!(
            samples = dataset.n_samples(),
            train = train_idx.len(),
            test = test_idx.len(),
            classes = ?encoder.classes(),
            "Starting training run"
        );

        let primary = RandomForest::fit(&x_train, &y_train, n_classes, &self.settings.forest, seed)
            .map_err(TrainerError::ModelFit)?;
        tracing::info!(trees = primary.n_trees(), "Primary classifier fitted");

        let (secondary, secondary_failure) = match self.fit_secondary(&x_train, &y_train, n_classes) {
            Ok(fitted) => (Some(fitted), None),
            Err(reason) => {
                tracing::warn!(%reason, "Secondary classifier unavailable, continuing with primary only");
                (None, Some(reason))
            }
        };

        // Both classifiers must index probabilities by the encoder's classes.
        if primary.n_classes() != n_classes {
            return Err(TrainerError::Misaligned(format!(
                "primary emits {} classes, encoder has {n_classes}",
                primary.n_classes()
            )));
        }
        if let Some((network, _)) = &secondary {
            if network.n_classes() != n_classes {
                return Err(TrainerError::Misaligned(format!(
                    "secondary emits {} classes, encoder has {n_classes}",
                    network.n_classes()
                )));
            }
        }

        let metadata = EnsembleMetadata::new(
            encoder.classes().to_vec(),
            dataset.schema().clone(),
            self.weights,
            secondary.is_some(),
        )
        .with_trained_at(Utc::now());
        let weights = metadata.effective_weights();

        let analytics = AnalyticsEngine::new();
        let primary_proba = primary.predict_proba_batch(&x_test)?;
        let primary_report =
            analytics.evaluate(encoder.classes(), &y_test, &argmax_rows(&primary_proba)?)?;

        let (secondary_report, ensemble_report) = match &secondary {
            Some((network, scaler)) => {
                let secondary_proba = network.predict_proba_batch(&scaler.transform(&x_test)?)?;
                let secondary_report = analytics.evaluate(
                    encoder.classes(),
                    &y_test,
                    &argmax_rows(&secondary_proba)?,
                )?;
                let mut ensemble_pred = Vec::with_capacity(y_test.len());
                for (p, s) in primary_proba.outer_iter().zip(secondary_proba.outer_iter()) {
                    let combined = combine(&p.to_vec(), &s.to_vec(), weights)?;
                    ensemble_pred.push(argmax(&combined)?);
                }
                let ensemble_report = analytics.evaluate(encoder.classes(), &y_test, &ensemble_pred)?;
                (Some(secondary_report), ensemble_report)
            }
            None => (None, primary_report.clone()),
        };

        log_accuracy("primary", &primary_report);
        if let Some(report) = &secondary_report {
            log_accuracy("secondary", report);
        }
        log_accuracy("ensemble", &ensemble_report);

        let mut class_distribution = BTreeMap::new();
        for label in dataset.labels() {
            *class_distribution.entry(label.clone()).or_insert(0) += 1;
        }

        let report = TrainingReport {
            trained_at: metadata.trained_at.unwrap_or_else(Utc::now),
            seed,
            n_samples: dataset.n_samples(),
            n_train: train_idx.len(),
            n_test: test_idx.len(),
            classes: encoder.classes().to_vec(),
            features: dataset.schema().names().to_vec(),
            class_distribution,
            primary_weight: metadata.primary_weight,
            secondary_weight: metadata.secondary_weight,
            primary: primary_report,
            secondary: secondary_report,
            ensemble: ensemble_report,
            secondary_failure,
        };

        Ok(TrainedEnsemble {
            primary,
            secondary,
            metadata,
            report,
        })
    }

    /// Fits the scaler on the training split and the network on its output.
    ///
    /// Every failure, including a panic inside the tensor backend, is turned
    /// into a reason string: losing the secondary never aborts the run.
    fn fit_secondary(
        &self,
        x_train: &Array2<f64>,
        y_train: &[usize],
        n_classes: usize,
    ) -> Result<(NeuralNetwork, FeatureScaler), String> {
        let attempt = panic::catch_unwind(AssertUnwindSafe(|| -> Result<_, ModelError> {
            let scaler = FeatureScaler::fit(x_train)?;
            let scaled = scaler.transform(x_train)?;
            let network = NeuralNetwork::fit(
                &scaled,
                y_train,
                n_classes,
                &self.settings.network,
                self.settings.seed,
            )?;
            Ok((network, scaler))
        }));
        match attempt {
            Ok(Ok(fitted)) => Ok(fitted),
            Ok(Err(e)) => Err(e.to_string()),
            Err(payload) => Err(payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "secondary fit panicked".to_string())),
        }
    }
}

impl TrainedEnsemble {
    /// Publishes the whole set (models, scaler, report, metadata last) as the
    /// active set in `model_dir` and returns the set's own directory.
    pub fn persist(&self, model_dir: &Path) -> Result<PathBuf, TrainerError> {
        let report_json = serde_json::to_string_pretty(&self.report)?;
        let published = ArtifactStore::new(model_dir).write_set(&ArtifactSet {
            primary: &self.primary,
            secondary: self.secondary.as_ref().map(|(network, scaler)| (network, scaler)),
            metadata: &self.metadata,
            report_json: Some(report_json),
        })?;
        Ok(published)
    }
}

fn argmax(distribution: &[f64]) -> Result<usize, TrainerError> {
    select_class(distribution).ok_or_else(|| {
        TrainerError::Inference(ModelError::InvalidInput(
            "model produced no usable probabilities".to_string(),
        ))
    })
}

fn argmax_rows(probabilities: &Array2<f64>) -> Result<Vec<usize>, TrainerError> {
    probabilities
        .outer_iter()
        .map(|row| argmax(&row.to_vec()))
        .collect()
}

fn log_accuracy(model: &str, report: &ClassificationReport) {
    tracing::info!(
        model,
        accuracy = report.accuracy,
        macro_f1 = report.macro_avg.f1,
        "Held-out evaluation"
    );
}
