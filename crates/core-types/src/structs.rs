use crate::enums::ContributingModels;
use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single inference request: feature name mapped to its numeric value.
///
/// Order carries no meaning here; the active feature schema decides how the
/// values are laid out before they reach a classifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector {
    values: BTreeMap<String, f64>,
}

impl FeatureVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON object of the form `{"price": 120.5, "rsi": 62.0, ...}`.
    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        let trimmed = json.trim();
        if trimmed.is_empty() {
            return Err(CoreError::InvalidInput(
                "feature vector".to_string(),
                "no JSON data provided".to_string(),
            ));
        }
        Ok(serde_json::from_str(trimmed)?)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) -> Option<f64> {
        self.values.insert(name.into(), value)
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Feature names in lexical order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for FeatureVector {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// One line of the human-readable explanation attached to a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RationaleEntry {
    pub feature: String,
    /// Importance weight of the feature in the primary classifier, rounded to 3 decimals.
    pub importance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassProbability {
    pub label: String,
    pub probability: f64,
}

/// The output of one `predict` call. Produced fresh per request, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionResult {
    /// The selected class label (e.g. "BUY").
    pub decision: String,
    /// Combined probability of `decision` as a percentage in [0, 100], 2 decimals.
    pub confidence: f64,
    /// Up to three most important features, highest first. Empty when the
    /// primary classifier exposes no importances.
    pub rationale: Vec<RationaleEntry>,
    pub contributing_models: ContributingModels,
    /// The combined distribution in class order.
    pub probabilities: Vec<ClassProbability>,
}

impl DecisionResult {
    pub fn to_json_pretty(&self) -> Result<String, CoreError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_vector_parses_json_object() {
        let vector = FeatureVector::from_json(r#"{"price": 120.5, "rsi": 62}"#).unwrap();
        assert_eq!(vector.len(), 2);
        assert_eq!(vector.get("price"), Some(120.5));
        assert_eq!(vector.get("rsi"), Some(62.0));
        assert!(!vector.contains("macd"));
    }

    #[test]
    fn empty_input_is_rejected() {
        let err = FeatureVector::from_json("   \n").unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_, _)));
    }

    #[test]
    fn non_numeric_values_are_rejected() {
        assert!(FeatureVector::from_json(r#"{"price": "high"}"#).is_err());
    }

    #[test]
    fn decision_result_serializes_contributing_models_in_snake_case() {
        let result = DecisionResult {
            decision: "SELL".to_string(),
            confidence: 70.0,
            rationale: vec![RationaleEntry {
                feature: "rsi".to_string(),
                importance: 0.214,
            }],
            contributing_models: ContributingModels::PrimaryOnly,
            probabilities: vec![],
        };
        let json = result.to_json_pretty().unwrap();
        assert!(json.contains("\"primary_only\""));
        assert!(json.contains("\"decision\": \"SELL\""));
    }
}
