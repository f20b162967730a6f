use crate::error::ModelError;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Zero-mean / unit-variance standardization, one (mean, std) pair per feature.
///
/// Fitted once on the training split and persisted; inference always reuses
/// the stored parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureScaler {
    means: Vec<f64>,
    stds: Vec<f64>,
}

impl FeatureScaler {
    /// Learns per-column means and population standard deviations.
    ///
    /// Constant columns get a standard deviation of 1.0 so they map to 0.
    pub fn fit(data: &Array2<f64>) -> Result<Self, ModelError> {
        let (n_samples, n_features) = data.dim();
        if n_samples == 0 || n_features == 0 {
            return Err(ModelError::InvalidInput(
                "scaler needs at least one sample and one feature".to_string(),
            ));
        }

        let mut means = vec![0.0; n_features];
        let mut stds = vec![0.0; n_features];

        for j in 0..n_features {
            let column = data.column(j);
            let mean = column.sum() / n_samples as f64;
            let var = column.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n_samples as f64;
            let std = var.sqrt();
            means[j] = mean;
            // Avoid division by zero
            stds[j] = if std < 1e-10 || !std.is_finite() { 1.0 } else { std };
        }

        Ok(Self { means, stds })
    }

    /// Rebuilds a scaler from stored parameters.
    pub fn from_parts(means: Vec<f64>, stds: Vec<f64>) -> Result<Self, ModelError> {
        if means.len() != stds.len() {
            return Err(ModelError::DimensionMismatch {
                expected: means.len(),
                got: stds.len(),
            });
        }
        if means.is_empty() {
            return Err(ModelError::InvalidInput("scaler has no features".to_string()));
        }
        if stds.iter().any(|s| !s.is_finite() || *s <= 0.0) || means.iter().any(|m| !m.is_finite()) {
            return Err(ModelError::InvalidInput(
                "scaler parameters must be finite with positive deviations".to_string(),
            ));
        }
        Ok(Self { means, stds })
    }

    pub fn n_features(&self) -> usize {
        self.means.len()
    }

    pub fn means(&self) -> &[f64] {
        &self.means
    }

    pub fn stds(&self) -> &[f64] {
        &self.stds
    }

    pub fn transform_row(&self, row: &[f64]) -> Result<Vec<f64>, ModelError> {
        if row.len() != self.means.len() {
            return Err(ModelError::DimensionMismatch {
                expected: self.means.len(),
                got: row.len(),
            });
        }
        Ok(row
            .iter()
            .zip(self.means.iter().zip(&self.stds))
            .map(|(v, (mean, std))| (v - mean) / std)
            .collect())
    }

    pub fn transform(&self, data: &Array2<f64>) -> Result<Array2<f64>, ModelError> {
        let (n_samples, n_features) = data.dim();
        if n_features != self.means.len() {
            return Err(ModelError::DimensionMismatch {
                expected: self.means.len(),
                got: n_features,
            });
        }

        let mut scaled = Array2::zeros((n_samples, n_features));
        for i in 0..n_samples {
            for j in 0..n_features {
                scaled[[i, j]] = (data[[i, j]] - self.means[j]) / self.stds[j];
            }
        }
        Ok(scaled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn fit_produces_zero_mean_unit_variance() {
        let data = array![[1.0, 10.0], [2.0, 20.0], [3.0, 30.0], [4.0, 40.0]];
        let scaler = FeatureScaler::fit(&data).unwrap();
        let scaled = scaler.transform(&data).unwrap();

        for j in 0..2 {
            let column = scaled.column(j);
            let mean = column.sum() / 4.0;
            let var = column.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / 4.0;
            assert!(mean.abs() < 1e-12);
            assert!((var - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn constant_column_maps_to_zero() {
        let data = array![[5.0, 1.0], [5.0, 2.0]];
        let scaler = FeatureScaler::fit(&data).unwrap();
        assert_eq!(scaler.stds()[0], 1.0);
        assert_eq!(scaler.transform_row(&[5.0, 1.5]).unwrap()[0], 0.0);
    }

    #[test]
    fn transform_row_checks_width() {
        let scaler = FeatureScaler::from_parts(vec![0.0, 0.0], vec![1.0, 1.0]).unwrap();
        assert!(matches!(
            scaler.transform_row(&[1.0]),
            Err(ModelError::DimensionMismatch { expected: 2, got: 1 })
        ));
    }

    #[test]
    fn row_and_matrix_transforms_agree() {
        let data = array![[1.0, -3.0], [4.0, 8.0], [0.5, 2.0]];
        let scaler = FeatureScaler::fit(&data).unwrap();
        let matrix = scaler.transform(&data).unwrap();
        let row = scaler.transform_row(&[4.0, 8.0]).unwrap();
        assert_eq!(row, matrix.row(1).to_vec());
    }

    #[test]
    fn from_parts_rejects_non_positive_deviation() {
        assert!(FeatureScaler::from_parts(vec![0.0], vec![0.0]).is_err());
        assert!(FeatureScaler::from_parts(vec![0.0], vec![1.0, 2.0]).is_err());
    }
}
