use analytics::ClassificationReport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Everything a training run measured, persisted as `training_report.json`
/// next to the artifacts it describes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub trained_at: DateTime<Utc>,
    pub seed: u64,
    pub n_samples: usize,
    pub n_train: usize,
    pub n_test: usize,
    pub classes: Vec<String>,
    pub features: Vec<String>,
    /// Sample count per label over the whole dataset.
    pub class_distribution: BTreeMap<String, usize>,
    /// The weights written to the metadata.
    pub primary_weight: f64,
    pub secondary_weight: f64,
    pub primary: ClassificationReport,
    pub secondary: Option<ClassificationReport>,
    pub ensemble: ClassificationReport,
    /// Why the secondary classifier is absent, when it is.
    pub secondary_failure: Option<String>,
}
