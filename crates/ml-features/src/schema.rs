use crate::error::FeatureError;
use core_types::FeatureVector;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// The 11 market features every model has been trained on so far.
///
/// Also the schema synthesized for legacy single-model artifacts, which carry
/// no metadata of their own.
pub const DEFAULT_FEATURES: [&str; 11] = [
    "price",
    "volume",
    "volatility",
    "liquidity",
    "rsi",
    "momentum",
    "macd",
    "trend",
    "sentiment",
    "holders",
    "market_cap",
];

/// Ordered list of feature names. Position `i` in every model input is the
/// value of `names[i]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct FeatureSchema {
    names: Vec<String>,
}

impl FeatureSchema {
    pub fn new<I, S>(names: I) -> Result<Self, FeatureError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Err(FeatureError::EmptySchema);
        }
        let mut seen = HashSet::with_capacity(names.len());
        for name in &names {
            if !seen.insert(name.as_str()) {
                return Err(FeatureError::DuplicateFeature(name.clone()));
            }
        }
        Ok(Self { names })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Builds the positional model input for `vector`.
    ///
    /// The vector must carry exactly the schema's names. Absent features are
    /// never defaulted: the first missing name (in schema order) is reported.
    pub fn vectorize(&self, vector: &FeatureVector) -> Result<Vec<f64>, FeatureError> {
        let mut values = Vec::with_capacity(self.names.len());
        for name in &self.names {
            let value = vector
                .get(name)
                .ok_or_else(|| FeatureError::MissingFeature(name.clone()))?;
            if !value.is_finite() {
                return Err(FeatureError::NonFiniteValue(name.clone()));
            }
            values.push(value);
        }

        if vector.len() != self.names.len() {
            if let Some(extra) = vector.names().find(|name| self.index_of(name).is_none()) {
                return Err(FeatureError::UnexpectedFeature(extra.to_string()));
            }
        }

        Ok(values)
    }
}

impl Default for FeatureSchema {
    fn default() -> Self {
        Self {
            names: DEFAULT_FEATURES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl TryFrom<Vec<String>> for FeatureSchema {
    type Error = FeatureError;

    fn try_from(names: Vec<String>) -> Result<Self, Self::Error> {
        FeatureSchema::new(names)
    }
}

impl From<FeatureSchema> for Vec<String> {
    fn from(schema: FeatureSchema) -> Self {
        schema.names
    }
}
