use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeatureError {
    #[error("Feature schema must contain at least one feature")]
    EmptySchema,

    #[error("Feature '{0}' appears more than once in the schema")]
    DuplicateFeature(String),

    #[error("Missing required feature: {0}")]
    MissingFeature(String),

    #[error("Unexpected feature not in schema: {0}")]
    UnexpectedFeature(String),

    #[error("Feature '{0}' has a non-finite value")]
    NonFiniteValue(String),

    #[error("Invalid dataset: {0}")]
    Dataset(String),

    #[error("Failed to read dataset: {0}")]
    Io(#[from] std::io::Error),

    #[error("Dataframe error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),
}
