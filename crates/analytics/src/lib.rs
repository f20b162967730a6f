//! # Verdict Analytics
//!
//! Classification metrics for judging a fitted model on held-out data. It acts
//! as the "unbiased judge" of the training pipeline.
//!
//! ## Architectural Principles
//!
//! - **Pure logic:** no knowledge of models, files or the engine. Inputs are
//!   encoded class indices and the label names they map to.
//! - **Stateless Calculation:** the `AnalyticsEngine` takes true and predicted
//!   indices and produces a `ClassificationReport`. Nothing is cached between
//!   calls.
//!
//! ## Public API
//!
//! - `AnalyticsEngine`: the calculator.
//! - `ClassificationReport`: accuracy, per-class precision/recall/F1/support,
//!   macro and weighted averages, and the confusion matrix.
//! - `AnalyticsError`: the specific error types that can be returned from this crate.

pub mod engine;
pub mod error;
pub mod report;

pub use engine::AnalyticsEngine;
pub use error::AnalyticsError;
pub use report::{AverageMetrics, ClassMetrics, ClassificationReport};
