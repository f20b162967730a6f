//! # Models and Artifacts
//!
//! The classifiers the ensemble is built from, and the on-disk artifact set
//! that binds them together.
//!
//! ## Architectural Principles
//!
//! - **Capability, not concrete type:** everything downstream sees a
//!   [`Classifier`], i.e. "give me a per-class distribution for this vector".
//!   The tree ensemble, the feed-forward network and test stubs are
//!   interchangeable behind it.
//! - **One combination rule:** [`ensemble::combine`] and
//!   [`ensemble::select_class`] are used both by offline evaluation and by the
//!   online engine, so the accuracy reported at training time is the accuracy
//!   of the rule that serves requests.
//! - **Write-then-publish:** [`ArtifactStore::write_set`] stages every file
//!   (metadata last) into a versioned set, then repoints `current` at it.

pub mod artifacts;
pub mod classifier;
pub mod ensemble;
pub mod error;
pub mod forest;
pub mod metadata;
pub mod network;
pub mod sampling;
pub mod scaler;
mod tree;

pub use artifacts::{ArtifactSet, ArtifactSnapshot, ArtifactStore, SecondaryLoad};
pub use classifier::{Classifier, Standardized};
pub use ensemble::EnsembleWeights;
pub use error::{ArtifactError, ModelError};
pub use forest::RandomForest;
pub use metadata::{DEFAULT_CLASSES, EnsembleMetadata, METADATA_FORMAT_VERSION};
pub use network::NeuralNetwork;
pub use scaler::FeatureScaler;
