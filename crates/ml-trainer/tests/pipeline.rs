use configuration::{ForestParams, NetworkParams, TrainingSettings};
use ml_features::{FeatureSchema, LabeledDataset, load_dataset};
use ml_models::artifacts::{REPORT_FILE, SECONDARY_FILE};
use ml_models::{ArtifactStore, EnsembleWeights};
use ml_trainer::{TrainingPipeline, TrainingReport};
use ndarray::Array2;
use std::io::Write;

const LABELS: [&str; 3] = ["SELL", "BUY", "HOLD"];

/// Labels cycle SELL, BUY, HOLD; "momentum" carries the signal.
fn dataset(n: usize) -> LabeledDataset {
    let schema = FeatureSchema::new(["momentum", "volume", "rsi"]).unwrap();
    let labels: Vec<String> = (0..n).map(|i| LABELS[i % 3].to_string()).collect();
    let features = Array2::from_shape_fn((n, 3), |(i, j)| match j {
        0 => (i % 3) as f64 * 4.0 + (i / 3) as f64 * 0.01,
        1 => 100.0 + (i % 5) as f64,
        _ => 50.0,
    });
    LabeledDataset::new(schema, features, labels).unwrap()
}

fn settings() -> TrainingSettings {
    TrainingSettings {
        test_fraction: 0.2,
        seed: 7,
        forest: ForestParams {
            n_trees: 12,
            max_depth: Some(6),
            ..ForestParams::default()
        },
        network: NetworkParams {
            hidden_layers: vec![8],
            learning_rate: 0.05,
            batch_size: 8,
            max_epochs: 40,
            patience: 10,
            ..NetworkParams::default()
        },
    }
}

fn pipeline(settings: TrainingSettings) -> TrainingPipeline {
    TrainingPipeline::new(settings, EnsembleWeights::new(0.55, 0.45).unwrap())
}

#[test]
fn run_produces_aligned_metadata_and_report() {
    let trained = pipeline(settings()).run(&dataset(60)).unwrap();

    assert_eq!(trained.metadata.classes, vec!["BUY", "HOLD", "SELL"]);
    assert_eq!(trained.metadata.features.names(), ["momentum", "volume", "rsi"]);
    assert!(trained.metadata.secondary_available);
    assert_eq!(trained.metadata.primary_weight, 0.55);
    assert!(trained.metadata.trained_at.is_some());

    let report = &trained.report;
    assert_eq!(report.n_samples, 60);
    assert_eq!(report.n_test, 12);
    assert_eq!(report.n_train, 48);
    assert_eq!(report.class_distribution["BUY"], 20);
    assert!(report.secondary.is_some());
    assert!(report.secondary_failure.is_none());
    assert!(report.primary.accuracy > 0.9, "primary accuracy {}", report.primary.accuracy);
    assert_eq!(report.ensemble.n_samples, 12);
}

#[test]
fn same_seed_gives_same_primary_evaluation() {
    let data = dataset(45);
    let a = pipeline(settings()).run(&data).unwrap();
    let b = pipeline(settings()).run(&data).unwrap();
    assert_eq!(a.report.primary, b.report.primary);
    assert_eq!(a.report.n_test, b.report.n_test);
}

#[test]
fn secondary_fit_failure_falls_back_to_primary_only() {
    let mut settings = settings();
    // Too small to leave any sample for early-stopping validation.
    settings.network.validation_fraction = 0.01;
    let trained = pipeline(settings).run(&dataset(30)).unwrap();

    assert!(trained.secondary.is_none());
    assert!(trained.report.secondary_failure.is_some());
    assert!(!trained.metadata.secondary_available);
    assert_eq!(trained.metadata.primary_weight, 1.0);
    assert_eq!(trained.metadata.secondary_weight, 0.0);
    assert_eq!(trained.report.ensemble, trained.report.primary);
}

#[test]
fn single_label_dataset_is_rejected() {
    let schema = FeatureSchema::new(["momentum"]).unwrap();
    let features = Array2::from_shape_vec((4, 1), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
    let data = LabeledDataset::new(schema, features, vec!["BUY".to_string(); 4]).unwrap();
    assert!(pipeline(settings()).run(&data).is_err());
}

#[test]
fn persisted_set_contains_report_and_models() {
    let trained = pipeline(settings()).run(&dataset(45)).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let models = dir.path().join("models");
    let published = trained.persist(&models).unwrap();

    let snapshot = ArtifactStore::new(&models).snapshot().unwrap();
    assert_eq!(snapshot.dir(), std::fs::canonicalize(&published).unwrap());
    assert_eq!(snapshot.load_metadata().unwrap(), trained.metadata);
    assert!(snapshot.path(SECONDARY_FILE).is_file());

    let raw = std::fs::read_to_string(snapshot.path(REPORT_FILE)).unwrap();
    let report: TrainingReport = serde_json::from_str(&raw).unwrap();
    assert_eq!(report.n_samples, trained.report.n_samples);
    assert_eq!(report.classes, trained.report.classes);
    assert_eq!(report.ensemble.confusion_matrix, trained.report.ensemble.confusion_matrix);
    assert!((report.primary.accuracy - trained.report.primary.accuracy).abs() < 1e-12);
}

#[test]
fn trains_from_a_csv_file() {
    let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    writeln!(file, "momentum,volume,rsi,label").unwrap();
    for i in 0..30 {
        let label = LABELS[i % 3];
        writeln!(file, "{},{},{},{label}", (i % 3) as f64 * 4.0, 100 + i % 5, 50).unwrap();
    }
    file.flush().unwrap();

    let schema = FeatureSchema::new(["momentum", "volume", "rsi"]).unwrap();
    let data = load_dataset(file.path(), &schema).unwrap();
    let trained = pipeline(settings()).run(&data).unwrap();
    assert_eq!(trained.report.n_samples, 30);
}
