//! The persisted artifact set: file layout, typed loading, atomic publication.
//!
//! A model directory holds immutable versioned sets and a `current` symlink:
//!
//! ```text
//! models/
//!   current -> sets/set-20261016T120000Z-Ab3dEf
//!   sets/set-20261016T120000Z-Ab3dEf/{random_forest.bin, ..., ensemble_meta.json}
//!   .staging/            (in-progress writes, one unique directory each)
//! ```
//!
//! Readers resolve `current` once into an [`ArtifactSnapshot`] and read every
//! file from that one set. A directory without `current` is read flat, which
//! covers hand-placed and legacy artifacts.

use crate::classifier::{Classifier, Standardized};
use crate::error::ArtifactError;
use crate::forest::RandomForest;
use crate::metadata::EnsembleMetadata;
use crate::network::NeuralNetwork;
use crate::scaler::FeatureScaler;
use chrono::Utc;
use std::fmt;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const PRIMARY_FILE: &str = "random_forest.bin";
pub const SECONDARY_FILE: &str = "neural_network.safetensors";
pub const SCALER_FILE: &str = "scaler.bin";
pub const METADATA_FILE: &str = "ensemble_meta.json";
pub const REPORT_FILE: &str = "training_report.json";
/// Single-classifier artifact written before ensembles existed.
pub const LEGACY_FILE: &str = "decision_model.bin";

/// Symlink naming the published set readers should use.
pub const CURRENT_LINK: &str = "current";
pub const SETS_DIR: &str = "sets";
pub const STAGING_DIR: &str = ".staging";
const SET_PREFIX: &str = "set-";

/// Creates (or truncates) `path`, writes `bytes` and flushes them to disk.
pub(crate) fn write_file(path: &Path, bytes: &[u8]) -> Result<(), ArtifactError> {
    let mut file = File::create(path).map_err(|e| ArtifactError::io(path, e))?;
    file.write_all(bytes).map_err(|e| ArtifactError::io(path, e))?;
    file.sync_all().map_err(|e| ArtifactError::io(path, e))
}

/// Flushes a file written by a third-party writer.
pub(crate) fn sync_file(path: &Path) -> Result<(), ArtifactError> {
    File::open(path)
        .and_then(|f| f.sync_all())
        .map_err(|e| ArtifactError::io(path, e))
}

/// Outcome of trying to load the secondary classifier and its scaler.
///
/// Failure here is never fatal: the engine consumes `Unavailable` by falling
/// back to the primary classifier alone.
pub enum SecondaryLoad {
    Loaded(Box<dyn Classifier>),
    Unavailable(String),
}

impl SecondaryLoad {
    pub fn is_loaded(&self) -> bool {
        matches!(self, SecondaryLoad::Loaded(_))
    }
}

impl fmt::Debug for SecondaryLoad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecondaryLoad::Loaded(model) => f.debug_tuple("Loaded").field(&model.name()).finish(),
            SecondaryLoad::Unavailable(reason) => f.debug_tuple("Unavailable").field(reason).finish(),
        }
    }
}

/// Everything one training run persists, borrowed from the pipeline.
pub struct ArtifactSet<'a> {
    pub primary: &'a RandomForest,
    pub secondary: Option<(&'a NeuralNetwork, &'a FeatureScaler)>,
    pub metadata: &'a EnsembleMetadata,
    /// Pre-rendered training report, stored alongside the models.
    pub report_json: Option<String>,
}

impl ArtifactSet<'_> {
    /// Checks the models agree with the metadata before anything is written.
    fn check(&self) -> Result<(), ArtifactError> {
        let meta = self.metadata;
        meta.validate()?;
        let (n_features, n_classes) = (meta.features.len(), meta.n_classes());
        if self.primary.n_features() != n_features || self.primary.n_classes() != n_classes {
            return Err(ArtifactError::Incompatible(format!(
                "primary model is {}x{}, metadata lists {} features and {} classes",
                self.primary.n_features(),
                self.primary.n_classes(),
                n_features,
                n_classes
            )));
        }
        if meta.secondary_available != self.secondary.is_some() {
            return Err(ArtifactError::Incompatible(format!(
                "metadata says dl_available={}, but the set {} a secondary model",
                meta.secondary_available,
                if self.secondary.is_some() { "carries" } else { "has no" }
            )));
        }
        if let Some((network, scaler)) = self.secondary {
            if network.n_features() != n_features
                || scaler.n_features() != n_features
                || network.n_classes() != n_classes
            {
                return Err(ArtifactError::Incompatible(format!(
                    "secondary model is {}x{} with a {}-feature scaler, metadata lists {} features and {} classes",
                    network.n_features(),
                    network.n_classes(),
                    scaler.n_features(),
                    n_features,
                    n_classes
                )));
            }
        }
        Ok(())
    }
}

/// A model directory on disk.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves the active set once. Every load made through the returned
    /// snapshot reads the same set, even if a writer publishes a new one
    /// in the meantime.
    ///
    /// Returns `NotFound` when the model directory (or the set `current`
    /// points at) does not exist.
    pub fn snapshot(&self) -> Result<ArtifactSnapshot, ArtifactError> {
        let link = self.root.join(CURRENT_LINK);
        let target = if fs::symlink_metadata(&link).is_ok() { &link } else { &self.root };
        let dir = fs::canonicalize(target).map_err(|e| ArtifactError::io(target, e))?;
        Ok(ArtifactSnapshot { dir })
    }

    /// Publishes `set` as the new active set and returns its directory.
    ///
    /// The set is written into a unique directory under `.staging` (metadata
    /// last, every file and the directory fsynced), renamed into `sets/`, and
    /// only then made visible by renaming a fresh symlink over `current`.
    /// Readers see either the previous complete set or the new one. On any
    /// failure `current` is left untouched. After a successful swap, sets
    /// other than the new one and the one it replaced are removed.
    pub fn write_set(&self, set: &ArtifactSet<'_>) -> Result<PathBuf, ArtifactError> {
        set.check()?;

        let staging_root = self.root.join(STAGING_DIR);
        let sets = self.root.join(SETS_DIR);
        for dir in [&staging_root, &sets] {
            fs::create_dir_all(dir).map_err(|e| ArtifactError::io(dir, e))?;
        }

        // Removed on drop unless it has been renamed away.
        let staging = tempfile::Builder::new()
            .prefix(SET_PREFIX)
            .tempdir_in(&staging_root)
            .map_err(|e| ArtifactError::io(&staging_root, e))?;
        write_files(staging.path(), set)?;

        let unique = staging
            .path()
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| name.strip_prefix(SET_PREFIX))
            .unwrap_or_default()
            .to_string();
        let version = format!(
            "{SET_PREFIX}{}-{unique}",
            Utc::now().format("%Y%m%dT%H%M%S%.6fZ")
        );
        let published = sets.join(&version);
        fs::rename(staging.path(), &published).map_err(|e| ArtifactError::io(&published, e))?;
        sync_dir(&sets)?;

        let current = self.root.join(CURRENT_LINK);
        let replaced = fs::read_link(&current).ok();
        if let Err(e) = self.point_current_at(&Path::new(SETS_DIR).join(&version), &unique) {
            if let Err(cleanup) = fs::remove_dir_all(&published) {
                tracing::warn!(path = %published.display(), error = %cleanup, "Could not remove unpublished artifact set");
            }
            return Err(e);
        }
        // The swap has happened; a failed flush must not report the publish as failed.
        if let Err(e) = sync_dir(&self.root) {
            tracing::warn!(error = %e, "Could not flush the model directory after publishing");
        }

        let keep_replaced = replaced
            .as_deref()
            .and_then(Path::file_name)
            .map(|name| name.to_os_string());
        self.prune(&sets, &version, keep_replaced.as_deref());

        tracing::info!(
            dir = %published.display(),
            secondary = set.secondary.is_some(),
            "Artifact set published"
        );
        Ok(published)
    }

    /// Atomically repoints `current` at `target` (relative to the root).
    fn point_current_at(&self, target: &Path, unique: &str) -> Result<(), ArtifactError> {
        let fresh = self.root.join(format!(".{CURRENT_LINK}-{unique}"));
        symlink_dir(target, &fresh).map_err(|e| ArtifactError::io(&fresh, e))?;
        let current = self.root.join(CURRENT_LINK);
        if let Err(e) = fs::rename(&fresh, &current) {
            let _ = fs::remove_file(&fresh);
            return Err(ArtifactError::io(&current, e));
        }
        Ok(())
    }

    /// Removes published sets other than `keep` and `replaced`.
    fn prune(&self, sets: &Path, keep: &str, replaced: Option<&std::ffi::OsStr>) {
        let entries = match fs::read_dir(sets) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(path = %sets.display(), error = %e, "Could not list artifact sets");
                return;
            }
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            if name == keep || Some(name.as_os_str()) == replaced {
                continue;
            }
            let path = entry.path();
            if let Err(e) = fs::remove_dir_all(&path) {
                tracing::warn!(path = %path.display(), error = %e, "Could not remove old artifact set");
            }
        }
    }
}

/// Writes the set's files into `dir`, metadata last.
fn write_files(dir: &Path, set: &ArtifactSet<'_>) -> Result<(), ArtifactError> {
    set.primary.save(&dir.join(PRIMARY_FILE))?;
    if let Some((network, scaler)) = set.secondary {
        network.save(&dir.join(SECONDARY_FILE))?;
        let path = dir.join(SCALER_FILE);
        let bytes = bincode::serialize(scaler).map_err(|e| ArtifactError::corrupt(&path, e))?;
        write_file(&path, &bytes)?;
    }
    if let Some(report) = &set.report_json {
        write_file(&dir.join(REPORT_FILE), report.as_bytes())?;
    }

    let path = dir.join(METADATA_FILE);
    let json =
        serde_json::to_string_pretty(set.metadata).map_err(|e| ArtifactError::corrupt(&path, e))?;
    write_file(&path, json.as_bytes())?;
    sync_dir(dir)
}

/// One resolved artifact set. Paths never follow `current` again.
#[derive(Debug, Clone)]
pub struct ArtifactSnapshot {
    dir: PathBuf,
}

impl ArtifactSnapshot {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    pub fn has_metadata(&self) -> bool {
        self.path(METADATA_FILE).is_file()
    }

    pub fn has_legacy(&self) -> bool {
        self.path(LEGACY_FILE).is_file()
    }

    pub fn load_metadata(&self) -> Result<EnsembleMetadata, ArtifactError> {
        let path = self.path(METADATA_FILE);
        let raw = fs::read_to_string(&path).map_err(|e| ArtifactError::io(&path, e))?;
        let metadata: EnsembleMetadata =
            serde_json::from_str(&raw).map_err(|e| ArtifactError::corrupt(&path, e))?;
        metadata.validate()?;
        Ok(metadata)
    }

    pub fn load_primary(&self) -> Result<RandomForest, ArtifactError> {
        RandomForest::load(&self.path(PRIMARY_FILE))
    }

    pub fn load_legacy(&self) -> Result<RandomForest, ArtifactError> {
        RandomForest::load(&self.path(LEGACY_FILE))
    }

    pub fn load_scaler(&self) -> Result<FeatureScaler, ArtifactError> {
        let path = self.path(SCALER_FILE);
        let bytes = fs::read(&path).map_err(|e| ArtifactError::io(&path, e))?;
        let scaler: FeatureScaler =
            bincode::deserialize(&bytes).map_err(|e| ArtifactError::corrupt(&path, e))?;
        // Re-validate: deserialization bypasses the constructor checks.
        FeatureScaler::from_parts(scaler.means().to_vec(), scaler.stds().to_vec())
            .map_err(|e| ArtifactError::corrupt(&path, e))
    }

    /// Loads the network and its scaler as one standardized classifier, and
    /// checks it matches the expected input and output sizes. Every failure
    /// is reported as `Unavailable` with a readable reason.
    pub fn load_secondary(&self, n_features: usize, n_classes: usize) -> SecondaryLoad {
        let network = match NeuralNetwork::load(&self.path(SECONDARY_FILE)) {
            Ok(network) => network,
            Err(e) => return SecondaryLoad::Unavailable(e.to_string()),
        };
        let scaler = match self.load_scaler() {
            Ok(scaler) => scaler,
            Err(e) => return SecondaryLoad::Unavailable(e.to_string()),
        };
        if network.n_classes() != n_classes {
            return SecondaryLoad::Unavailable(format!(
                "secondary model emits {} classes, metadata lists {}",
                network.n_classes(),
                n_classes
            ));
        }
        let secondary = match Standardized::new(scaler, network) {
            Ok(secondary) => secondary,
            Err(e) => {
                return SecondaryLoad::Unavailable(format!("scaler does not match network: {e}"));
            }
        };
        if secondary.n_features() != n_features {
            return SecondaryLoad::Unavailable(format!(
                "secondary model expects {} features, metadata lists {}",
                secondary.n_features(),
                n_features
            ));
        }
        SecondaryLoad::Loaded(Box::new(secondary))
    }
}

#[cfg(unix)]
fn symlink_dir(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink_dir(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_dir(target, link)
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<(), ArtifactError> {
    sync_file(dir)
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<(), ArtifactError> {
    Ok(())
}
