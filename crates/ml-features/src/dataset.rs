use crate::error::FeatureError;
use crate::schema::FeatureSchema;
use ndarray::Array2;
use polars::prelude::*;
use std::fs::File;
use std::path::Path;

/// Name of the target column in training datasets.
pub const LABEL_COLUMN: &str = "label";

/// A labeled training dataset: one row per sample, columns in schema order.
#[derive(Debug, Clone)]
pub struct LabeledDataset {
    schema: FeatureSchema,
    features: Array2<f64>,
    labels: Vec<String>,
}

impl LabeledDataset {
    pub fn new(
        schema: FeatureSchema,
        features: Array2<f64>,
        labels: Vec<String>,
    ) -> Result<Self, FeatureError> {
        let (n_rows, n_cols) = features.dim();
        if n_cols != schema.len() {
            return Err(FeatureError::Dataset(format!(
                "expected {} feature columns, got {}",
                schema.len(),
                n_cols
            )));
        }
        if n_rows != labels.len() {
            return Err(FeatureError::Dataset(format!(
                "{} feature rows but {} labels",
                n_rows,
                labels.len()
            )));
        }
        if n_rows == 0 {
            return Err(FeatureError::Dataset("dataset has no rows".to_string()));
        }
        if let Some(((_, col), _)) = features.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(FeatureError::NonFiniteValue(schema.names()[col].clone()));
        }

        Ok(Self {
            schema,
            features,
            labels,
        })
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn features(&self) -> &Array2<f64> {
        &self.features
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn n_samples(&self) -> usize {
        self.labels.len()
    }
}

/// Reads a labeled dataset from a `.csv` or `.parquet` file.
///
/// Only the schema's columns and the `label` column are kept; any other
/// column (timestamps, identifiers) is ignored. Rows with nulls are dropped.
pub fn load_dataset(path: &Path, schema: &FeatureSchema) -> Result<LabeledDataset, FeatureError> {
    let df = match path.extension().and_then(|ext| ext.to_str()) {
        Some("parquet") => {
            let file = File::open(path)?;
            ParquetReader::new(file).finish()?
        }
        Some("csv") => CsvReader::from_path(path)?.has_header(true).finish()?,
        other => {
            return Err(FeatureError::Dataset(format!(
                "unsupported dataset format {:?} for {}",
                other,
                path.display()
            )));
        }
    };

    let available: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();
    for name in schema.names() {
        if !available.contains(name) {
            return Err(FeatureError::MissingFeature(name.clone()));
        }
    }
    if !available.iter().any(|name| name == LABEL_COLUMN) {
        return Err(FeatureError::Dataset(format!(
            "missing '{}' column",
            LABEL_COLUMN
        )));
    }

    let mut selection: Vec<&str> = schema.names().iter().map(String::as_str).collect();
    selection.push(LABEL_COLUMN);
    let raw_rows = df.height();
    let df = df.select(selection)?.drop_nulls::<&str>(None)?;
    if df.height() < raw_rows {
        tracing::warn!(
            dropped = raw_rows - df.height(),
            "Dropped dataset rows containing null values"
        );
    }

    let mut columns: Vec<Vec<f64>> = Vec::with_capacity(schema.len());
    for name in schema.names() {
        let series = df.column(name)?.cast(&DataType::Float64)?;
        columns.push(series.f64()?.into_no_null_iter().collect());
    }

    let labels_series = df.column(LABEL_COLUMN)?.cast(&DataType::String)?;
    let labels: Vec<String> = labels_series
        .str()?
        .into_no_null_iter()
        .map(|label| label.trim().to_string())
        .collect();

    let features = Array2::from_shape_fn((df.height(), schema.len()), |(row, col)| {
        columns[col][row]
    });

    tracing::info!(
        path = %path.display(),
        rows = labels.len(),
        features = schema.len(),
        "Loaded labeled dataset"
    );

    LabeledDataset::new(schema.clone(), features, labels)
}
