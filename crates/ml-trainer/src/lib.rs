//! # Training Pipeline
//!
//! Produces the artifact set the decision engine serves from: a class-balanced
//! random forest on raw features, a feed-forward network on standardized
//! features, their held-out evaluation, and the metadata binding them.
//!
//! The secondary network is optional by construction. If it cannot be fitted
//! the run still succeeds, records why, and writes primary-only metadata.

pub mod encoder;
pub mod error;
pub mod pipeline;
pub mod report;

pub use encoder::LabelEncoder;
pub use error::TrainerError;
pub use pipeline::{TrainedEnsemble, TrainingPipeline};
pub use report::TrainingReport;
