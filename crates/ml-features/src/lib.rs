//! # Feature Schema
//!
//! The fixed, ordered contract of named numeric inputs shared by training and
//! inference. Both sides go through [`FeatureSchema`], so a vector is laid out
//! for a classifier in exactly one way.
//!
//! - [`FeatureSchema::vectorize`] turns a request's [`core_types::FeatureVector`]
//!   into the positional array the classifiers consume.
//! - [`load_dataset`] reads a labeled CSV/Parquet file into a [`LabeledDataset`].

pub mod dataset;
pub mod error;
pub mod schema;

pub use dataset::{LABEL_COLUMN, LabeledDataset, load_dataset};
pub use error::FeatureError;
pub use schema::{DEFAULT_FEATURES, FeatureSchema};
