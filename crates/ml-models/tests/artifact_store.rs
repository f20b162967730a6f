use configuration::{ForestParams, NetworkParams};
use ml_features::FeatureSchema;
use ml_models::artifacts::{
    CURRENT_LINK, METADATA_FILE, PRIMARY_FILE, REPORT_FILE, SCALER_FILE, SECONDARY_FILE, SETS_DIR,
    STAGING_DIR,
};
use ml_models::{
    ArtifactError, ArtifactSet, ArtifactStore, Classifier, EnsembleMetadata, EnsembleWeights, FeatureScaler,
    NeuralNetwork, RandomForest, SecondaryLoad,
};
use ndarray::Array2;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

fn training_data() -> (Array2<f64>, Vec<usize>) {
    let mut data = Vec::new();
    let mut labels = Vec::new();
    for k in 0..30 {
        let class = k % 3;
        let offset = (k / 3) as f64 * 0.1;
        data.push(class as f64 * 5.0 + offset);
        data.push(offset);
        labels.push(class);
    }
    (Array2::from_shape_vec((30, 2), data).unwrap(), labels)
}

fn forest_params() -> ForestParams {
    ForestParams {
        n_trees: 10,
        max_depth: Some(4),
        ..ForestParams::default()
    }
}

fn network_params() -> NetworkParams {
    NetworkParams {
        hidden_layers: vec![6],
        learning_rate: 0.05,
        batch_size: 8,
        max_epochs: 20,
        patience: 5,
        validation_fraction: 0.2,
        ..NetworkParams::default()
    }
}

fn metadata(secondary_available: bool) -> EnsembleMetadata {
    EnsembleMetadata::new(
        vec!["BUY".into(), "HOLD".into(), "SELL".into()],
        FeatureSchema::new(["price", "volume"]).unwrap(),
        EnsembleWeights::new(0.55, 0.45).unwrap(),
        secondary_available,
    )
}

struct Fitted {
    forest: RandomForest,
    scaler: FeatureScaler,
    network: NeuralNetwork,
}

fn fitted(seed: u64) -> Fitted {
    let (x, y) = training_data();
    let forest = RandomForest::fit(&x, &y, 3, &forest_params(), seed).unwrap();
    let scaler = FeatureScaler::fit(&x).unwrap();
    let network =
        NeuralNetwork::fit(&scaler.transform(&x).unwrap(), &y, 3, &network_params(), seed).unwrap();
    Fitted { forest, scaler, network }
}

fn full_set<'a>(models: &'a Fitted, meta: &'a EnsembleMetadata) -> ArtifactSet<'a> {
    ArtifactSet {
        primary: &models.forest,
        secondary: Some((&models.network, &models.scaler)),
        metadata: meta,
        report_json: None,
    }
}

fn primary_only_set<'a>(models: &'a Fitted, meta: &'a EnsembleMetadata) -> ArtifactSet<'a> {
    ArtifactSet {
        primary: &models.forest,
        secondary: None,
        metadata: meta,
        report_json: None,
    }
}

fn set_names(root: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(root.join(SETS_DIR))
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn full_set_round_trips_through_the_store() {
    let models = fitted(42);
    let meta = metadata(true);

    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("models");
    let store = ArtifactStore::new(&root);
    let published = store
        .write_set(&ArtifactSet {
            report_json: Some("{}".to_string()),
            ..full_set(&models, &meta)
        })
        .unwrap();

    let snapshot = store.snapshot().unwrap();
    assert_eq!(snapshot.dir(), fs::canonicalize(&published).unwrap());
    for file in [PRIMARY_FILE, SECONDARY_FILE, SCALER_FILE, METADATA_FILE, REPORT_FILE] {
        assert!(snapshot.path(file).is_file(), "{file} missing");
    }
    assert!(fs::symlink_metadata(root.join(CURRENT_LINK)).unwrap().file_type().is_symlink());
    assert_eq!(fs::read_dir(root.join(STAGING_DIR)).unwrap().count(), 0);

    assert_eq!(snapshot.load_metadata().unwrap(), meta);
    let primary = snapshot.load_primary().unwrap();
    let row = [5.2, 0.3];
    assert_eq!(primary.predict_proba(&row).unwrap(), models.forest.predict_proba(&row).unwrap());

    match snapshot.load_secondary(2, 3) {
        SecondaryLoad::Loaded(secondary) => {
            let scaled = models.scaler.transform_row(&row).unwrap();
            assert_eq!(
                secondary.predict_proba(&row).unwrap(),
                models.network.predict_proba(&scaled).unwrap()
            );
        }
        SecondaryLoad::Unavailable(reason) => panic!("secondary unavailable: {reason}"),
    }
}

#[test]
fn rewriting_replaces_the_previous_set_wholesale() {
    let models = fitted(1);
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("models");
    let store = ArtifactStore::new(&root);

    let full = metadata(true);
    let first = store.write_set(&full_set(&models, &full)).unwrap();

    let primary_only = metadata(false);
    let second = store.write_set(&primary_only_set(&models, &primary_only)).unwrap();

    // The second run had no secondary, so nothing of the first may show through.
    let snapshot = store.snapshot().unwrap();
    assert!(!snapshot.path(SECONDARY_FILE).exists());
    assert!(!snapshot.path(SCALER_FILE).exists());
    assert!(!snapshot.load_metadata().unwrap().secondary_available);
    // The replaced set is kept for readers that resolved it before the swap.
    assert!(first.join(SECONDARY_FILE).is_file());

    let third = store.write_set(&full_set(&models, &full)).unwrap();
    assert!(!first.exists());
    let mut expected: Vec<String> = [&second, &third]
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    expected.sort();
    assert_eq!(set_names(&root), expected);
    assert!(store.snapshot().unwrap().load_metadata().unwrap().secondary_available);
}

#[test]
fn failed_write_leaves_the_active_set_untouched() {
    let models = fitted(5);
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("models");
    let store = ArtifactStore::new(&root);
    let full = metadata(true);
    store.write_set(&full_set(&models, &full)).unwrap();

    // Staging can no longer be created, so the second write fails midway.
    fs::remove_dir_all(root.join(STAGING_DIR)).unwrap();
    fs::write(root.join(STAGING_DIR), b"in the way").unwrap();
    let primary_only = metadata(false);
    let err = store.write_set(&primary_only_set(&models, &primary_only)).unwrap_err();
    assert!(matches!(err, ArtifactError::Io { .. }), "unexpected error: {err:?}");

    let snapshot = store.snapshot().unwrap();
    assert_eq!(snapshot.load_metadata().unwrap(), full);
    let row = [0.1, 0.9];
    assert_eq!(
        snapshot.load_primary().unwrap().predict_proba(&row).unwrap(),
        models.forest.predict_proba(&row).unwrap()
    );
    assert!(snapshot.load_secondary(2, 3).is_loaded());
    assert_eq!(set_names(&root).len(), 1);
}

#[test]
fn inconsistent_set_is_rejected_before_anything_is_written() {
    let models = fitted(6);
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("models");
    let store = ArtifactStore::new(&root);
    let full = metadata(true);
    store.write_set(&full_set(&models, &full)).unwrap();

    // Metadata says primary-only, but a secondary is supplied.
    let primary_only = metadata(false);
    let err = store.write_set(&full_set(&models, &primary_only)).unwrap_err();
    assert!(matches!(err, ArtifactError::Incompatible(_)), "unexpected error: {err:?}");

    // Metadata lists three features; the models were fitted on two.
    let wide = EnsembleMetadata::new(
        vec!["BUY".into(), "HOLD".into(), "SELL".into()],
        FeatureSchema::new(["price", "volume", "spread"]).unwrap(),
        EnsembleWeights::new(0.55, 0.45).unwrap(),
        true,
    );
    let err = store.write_set(&full_set(&models, &wide)).unwrap_err();
    assert!(matches!(err, ArtifactError::Incompatible(_)), "unexpected error: {err:?}");

    assert_eq!(store.snapshot().unwrap().load_metadata().unwrap(), full);
    assert_eq!(set_names(&root).len(), 1);
}

#[test]
fn readers_see_only_complete_sets_while_a_writer_publishes() {
    let models = fitted(7);
    let full = metadata(true);
    let primary_only = metadata(false);
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path().join("models"));
    store.write_set(&full_set(&models, &full)).unwrap();

    let done = AtomicBool::new(false);
    thread::scope(|s| {
        s.spawn(|| {
            for round in 0..12 {
                let set = if round % 2 == 0 {
                    primary_only_set(&models, &primary_only)
                } else {
                    full_set(&models, &full)
                };
                store.write_set(&set).unwrap();
            }
            done.store(true, Ordering::SeqCst);
        });

        let mut reads = 0;
        while !done.load(Ordering::SeqCst) || reads == 0 {
            let snapshot = store.snapshot().unwrap();
            let loaded = snapshot
                .load_metadata()
                .and_then(|meta| snapshot.load_primary().map(|primary| (meta, primary)));
            let consistent = match &loaded {
                Ok((meta, primary)) => {
                    primary.n_features() == 2
                        && meta.secondary_available == snapshot.path(SECONDARY_FILE).is_file()
                        && meta.secondary_available == snapshot.load_secondary(2, 3).is_loaded()
                }
                Err(_) => false,
            };
            if consistent {
                reads += 1;
            } else {
                // Only a set that has since been superseded may be pruned away
                // under a reader; the active set is always whole.
                assert_ne!(
                    store.snapshot().unwrap().dir(),
                    snapshot.dir(),
                    "active set read inconsistently: {:?}",
                    loaded.err()
                );
            }
        }
    });
}

#[test]
fn secondary_with_wrong_class_count_is_unavailable() {
    let models = fitted(3);
    let meta = metadata(true);

    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path().join("models"));
    store.write_set(&full_set(&models, &meta)).unwrap();

    let snapshot = store.snapshot().unwrap();
    assert!(!snapshot.load_secondary(2, 4).is_loaded());
    assert!(!snapshot.load_secondary(5, 3).is_loaded());
}
