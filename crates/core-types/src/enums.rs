use serde::{Deserialize, Serialize};
use std::fmt;

/// Which classifiers contributed to a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContributingModels {
    /// Primary and secondary probabilities were blended by their weights.
    Ensemble,
    /// Only the primary classifier was consulted.
    PrimaryOnly,
}

impl ContributingModels {
    /// Returns true when the secondary classifier took part in the decision.
    pub fn uses_secondary(&self) -> bool {
        matches!(self, ContributingModels::Ensemble)
    }
}

impl fmt::Display for ContributingModels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContributingModels::Ensemble => write!(f, "Random Forest + Neural Network (Ensemble)"),
            ContributingModels::PrimaryOnly => write!(f, "Random Forest"),
        }
    }
}
