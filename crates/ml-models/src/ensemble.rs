//! The weighted combination rule shared by offline evaluation and online inference.

use crate::error::ModelError;
use serde::{Deserialize, Serialize};

/// Tolerance used when checking that weights sum to one.
pub const WEIGHT_TOLERANCE: f64 = 1e-6;

/// How much each classifier contributes to the combined distribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnsembleWeights {
    pub primary: f64,
    pub secondary: f64,
}

impl EnsembleWeights {
    pub const PRIMARY_ONLY: EnsembleWeights = EnsembleWeights {
        primary: 1.0,
        secondary: 0.0,
    };

    pub fn new(primary: f64, secondary: f64) -> Result<Self, ModelError> {
        if !(primary >= 0.0 && secondary >= 0.0) {
            return Err(ModelError::InvalidInput(format!(
                "weights must be non-negative, got {primary} / {secondary}"
            )));
        }
        if (primary + secondary - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(ModelError::InvalidInput(format!(
                "weights must sum to 1.0, got {}",
                primary + secondary
            )));
        }
        Ok(Self { primary, secondary })
    }

    pub fn uses_secondary(&self) -> bool {
        self.secondary > 0.0
    }
}

/// `primary_weight * primary + secondary_weight * secondary`, element-wise.
///
/// Both distributions must be indexed by the same class ordering.
pub fn combine(
    primary: &[f64],
    secondary: &[f64],
    weights: EnsembleWeights,
) -> Result<Vec<f64>, ModelError> {
    if primary.len() != secondary.len() {
        return Err(ModelError::DimensionMismatch {
            expected: primary.len(),
            got: secondary.len(),
        });
    }
    Ok(primary
        .iter()
        .zip(secondary)
        .map(|(p, s)| weights.primary * p + weights.secondary * s)
        .collect())
}

/// Index of the largest probability. Ties go to the lowest index.
pub fn select_class(distribution: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (index, &p) in distribution.iter().enumerate() {
        match best {
            Some((_, best_p)) if p <= best_p => {}
            _ if p.is_nan() => {}
            _ => best = Some((index, p)),
        }
    }
    best.map(|(index, _)| index)
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// A probability in [0, 1] as a percentage rounded to 2 decimals.
pub fn to_percentage(probability: f64) -> f64 {
    round_to(probability * 100.0, 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weighted_combination_matches_hand_computation() {
        let weights = EnsembleWeights::new(0.55, 0.45).unwrap();
        let combined = combine(&[0.2, 0.3, 0.5], &[0.6, 0.2, 0.2], weights).unwrap();
        let expected = [0.38, 0.255, 0.365];
        for (c, e) in combined.iter().zip(expected) {
            assert!((c - e).abs() < 1e-12);
        }
        assert_eq!(select_class(&combined), Some(0));
        assert_eq!(to_percentage(combined[0]), 38.0);
    }

    #[test]
    fn ties_resolve_to_lowest_index() {
        assert_eq!(select_class(&[0.4, 0.4, 0.2]), Some(0));
        assert_eq!(select_class(&[0.2, 0.4, 0.4]), Some(1));
        assert_eq!(select_class(&[1.0 / 3.0; 3]), Some(0));
    }

    #[test]
    fn empty_and_nan_distributions() {
        assert_eq!(select_class(&[]), None);
        assert_eq!(select_class(&[f64::NAN, 0.3, 0.7]), Some(2));
    }

    #[test]
    fn invalid_weights_are_rejected() {
        assert!(EnsembleWeights::new(0.6, 0.6).is_err());
        assert!(EnsembleWeights::new(1.5, -0.5).is_err());
        assert!(EnsembleWeights::new(f64::NAN, 1.0).is_err());
    }

    #[test]
    fn combine_rejects_misaligned_distributions() {
        let weights = EnsembleWeights::new(0.5, 0.5).unwrap();
        assert!(combine(&[0.5, 0.5], &[0.2, 0.3, 0.5], weights).is_err());
    }

    #[test]
    fn percentage_rounds_to_two_decimals() {
        assert_eq!(to_percentage(0.7), 70.0);
        assert_eq!(to_percentage(0.123456), 12.35);
        assert_eq!(round_to(0.21449, 3), 0.214);
    }
}
