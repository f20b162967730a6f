use crate::error::ModelError;
use crate::scaler::FeatureScaler;
use ndarray::Array2;

/// The one capability the ensemble needs from a fitted model: a probability
/// distribution over the class indices for a positional feature vector.
///
/// Implementations must be free of side effects on read, so a single loaded
/// instance can serve concurrent callers without locking.
pub trait Classifier: Send + Sync {
    /// Short, human-readable model name used in logs.
    fn name(&self) -> &str;

    /// Length of the input vector this model was fitted on.
    fn n_features(&self) -> usize;

    /// Length of the distributions returned by `predict_proba`.
    fn n_classes(&self) -> usize;

    /// Per-class probabilities for a single sample, aligned with the encoded
    /// class indices the model was trained on.
    fn predict_proba(&self, features: &[f64]) -> Result<Vec<f64>, ModelError>;

    /// Per-class probabilities for every row of `rows`.
    fn predict_proba_batch(&self, rows: &Array2<f64>) -> Result<Array2<f64>, ModelError> {
        let mut out = Array2::zeros((rows.nrows(), self.n_classes()));
        for (i, row) in rows.outer_iter().enumerate() {
            let probs = self.predict_proba(&row.to_vec())?;
            if probs.len() != self.n_classes() {
                return Err(ModelError::DimensionMismatch {
                    expected: self.n_classes(),
                    got: probs.len(),
                });
            }
            for (j, p) in probs.into_iter().enumerate() {
                out[[i, j]] = p;
            }
        }
        Ok(out)
    }

    /// Relative importance of each input feature, if the model can explain itself.
    fn feature_importances(&self) -> Option<Vec<f64>> {
        None
    }
}

impl<C: Classifier + ?Sized> Classifier for Box<C> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn n_features(&self) -> usize {
        (**self).n_features()
    }

    fn n_classes(&self) -> usize {
        (**self).n_classes()
    }

    fn predict_proba(&self, features: &[f64]) -> Result<Vec<f64>, ModelError> {
        (**self).predict_proba(features)
    }

    fn predict_proba_batch(&self, rows: &Array2<f64>) -> Result<Array2<f64>, ModelError> {
        (**self).predict_proba_batch(rows)
    }

    fn feature_importances(&self) -> Option<Vec<f64>> {
        (**self).feature_importances()
    }
}

/// A classifier that only ever sees standardized inputs.
///
/// Pairs the scaler fitted at training time with the model fitted on its
/// output, so callers pass raw vectors and the scaling can never be skipped
/// or refit.
pub struct Standardized<C> {
    scaler: FeatureScaler,
    inner: C,
}

impl<C: Classifier> Standardized<C> {
    pub fn new(scaler: FeatureScaler, inner: C) -> Result<Self, ModelError> {
        if scaler.n_features() != inner.n_features() {
            return Err(ModelError::DimensionMismatch {
                expected: inner.n_features(),
                got: scaler.n_features(),
            });
        }
        Ok(Self { scaler, inner })
    }

    pub fn scaler(&self) -> &FeatureScaler {
        &self.scaler
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

impl<C: Classifier> Classifier for Standardized<C> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn n_features(&self) -> usize {
        self.scaler.n_features()
    }

    fn n_classes(&self) -> usize {
        self.inner.n_classes()
    }

    fn predict_proba(&self, features: &[f64]) -> Result<Vec<f64>, ModelError> {
        let scaled = self.scaler.transform_row(features)?;
        self.inner.predict_proba(&scaled)
    }

    fn predict_proba_batch(&self, rows: &Array2<f64>) -> Result<Array2<f64>, ModelError> {
        let scaled = self.scaler.transform(rows)?;
        self.inner.predict_proba_batch(&scaled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    /// Echoes the first input as P(class 1).
    struct Echo;

    impl Classifier for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn n_features(&self) -> usize {
            2
        }
        fn n_classes(&self) -> usize {
            2
        }
        fn predict_proba(&self, features: &[f64]) -> Result<Vec<f64>, ModelError> {
            let p = features[0].clamp(0.0, 1.0);
            Ok(vec![1.0 - p, p])
        }
    }

    #[test]
    fn default_batch_prediction_matches_single_rows() {
        let rows = array![[0.25, 0.0], [0.75, 1.0]];
        let out = Echo.predict_proba_batch(&rows).unwrap();
        assert_eq!(out, array![[0.75, 0.25], [0.25, 0.75]]);
    }

    #[test]
    fn standardized_scales_before_delegating() {
        let scaler = FeatureScaler::from_parts(vec![10.0, 0.0], vec![20.0, 1.0]).unwrap();
        let model = Standardized::new(scaler, Echo).unwrap();
        // (15 - 10) / 20 = 0.25
        let probs = model.predict_proba(&[15.0, 3.0]).unwrap();
        assert_eq!(probs, vec![0.75, 0.25]);
    }

    #[test]
    fn standardized_rejects_mismatched_scaler() {
        let scaler = FeatureScaler::from_parts(vec![0.0; 3], vec![1.0; 3]).unwrap();
        assert!(Standardized::new(scaler, Echo).is_err());
    }

    #[test]
    fn boxed_classifier_delegates() {
        let boxed: Box<dyn Classifier> = Box::new(Echo);
        assert_eq!(boxed.name(), "echo");
        assert!(boxed.feature_importances().is_none());
        assert_eq!(boxed.predict_proba(&[1.0, 0.0]).unwrap(), vec![0.0, 1.0]);
    }
}
