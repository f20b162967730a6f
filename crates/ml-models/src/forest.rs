use crate::classifier::Classifier;
use crate::error::{ArtifactError, ModelError};
use crate::tree::{DecisionTree, TreeSettings};
use configuration::ForestParams;
use ndarray::Array2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Bootstrap-aggregated classification trees: the primary classifier.
///
/// Operates on raw (unscaled) features. Class-balanced weights enter both the
/// Gini impurity and the leaf distributions, so a skewed label distribution is
/// compensated for without resampling the data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    n_features: usize,
    n_classes: usize,
    importances: Vec<f64>,
}

/// `n_samples / (n_classes * count_c)` per class; absent classes get 1.0.
pub fn balanced_class_weights(y: &[usize], n_classes: usize) -> Vec<f64> {
    let mut counts = vec![0usize; n_classes];
    for &label in y {
        counts[label] += 1;
    }
    counts
        .iter()
        .map(|&count| {
            if count == 0 {
                1.0
            } else {
                y.len() as f64 / (n_classes as f64 * count as f64)
            }
        })
        .collect()
}

impl RandomForest {
    /// Fits `params.n_trees` trees in parallel.
    ///
    /// Tree `t` draws its bootstrap and feature subsets from its own RNG
    /// seeded with `seed + t`, so the fitted forest is identical for a given
    /// seed regardless of how the work is scheduled.
    pub fn fit(
        x: &Array2<f64>,
        y: &[usize],
        n_classes: usize,
        params: &ForestParams,
        seed: u64,
    ) -> Result<Self, ModelError> {
        let (n_samples, n_features) = x.dim();
        if n_samples == 0 || n_features == 0 {
            return Err(ModelError::InvalidInput(
                "random forest needs at least one sample and one feature".to_string(),
            ));
        }
        if n_samples != y.len() {
            return Err(ModelError::DimensionMismatch {
                expected: n_samples,
                got: y.len(),
            });
        }
        if n_classes < 2 {
            return Err(ModelError::InvalidInput(format!(
                "need at least 2 classes, got {n_classes}"
            )));
        }
        if let Some(&bad) = y.iter().find(|&&label| label >= n_classes) {
            return Err(ModelError::InvalidInput(format!(
                "label index {bad} out of range for {n_classes} classes"
            )));
        }
        if params.n_trees == 0 {
            return Err(ModelError::InvalidInput("n_trees must be at least 1".to_string()));
        }

        let class_weights = if params.class_balanced {
            balanced_class_weights(y, n_classes)
        } else {
            vec![1.0; n_classes]
        };
        tracing::debug!(?class_weights, "Random forest class weights");

        let settings = TreeSettings {
            max_depth: params.max_depth,
            min_samples_leaf: params.min_samples_leaf.max(1),
            min_samples_split: params.min_samples_split.max(2),
            max_features: params
                .max_features
                .unwrap_or_else(|| (n_features as f64).sqrt().round() as usize)
                .clamp(1, n_features),
        };

        let view = x.view();
        let fitted: Vec<(DecisionTree, Vec<f64>)> = (0..params.n_trees)
            .into_par_iter()
            .map(|t| {
                let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(t as u64));
                let bootstrap: Vec<usize> =
                    (0..n_samples).map(|_| rng.random_range(0..n_samples)).collect();
                DecisionTree::fit(view, y, &class_weights, n_classes, bootstrap, &settings, &mut rng)
            })
            .collect();

        let mut importances = vec![0.0; n_features];
        let mut trees = Vec::with_capacity(fitted.len());
        for (tree, tree_importances) in fitted {
            let sum: f64 = tree_importances.iter().sum();
            if sum > 0.0 {
                for (acc, v) in importances.iter_mut().zip(&tree_importances) {
                    *acc += v / sum;
                }
            }
            trees.push(tree);
        }
        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            importances.iter_mut().for_each(|v| *v /= total);
        }

        Ok(Self {
            trees,
            n_features,
            n_classes,
            importances,
        })
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Checks the internal structure after deserialization.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.trees.is_empty() {
            return Err(ModelError::InvalidInput("forest has no trees".to_string()));
        }
        if self.importances.len() != self.n_features {
            return Err(ModelError::DimensionMismatch {
                expected: self.n_features,
                got: self.importances.len(),
            });
        }
        if !self
            .trees
            .iter()
            .all(|tree| tree.is_consistent(self.n_features, self.n_classes))
        {
            return Err(ModelError::InvalidInput(
                "forest contains malformed trees".to_string(),
            ));
        }
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<(), ArtifactError> {
        let bytes = bincode::serialize(self).map_err(|e| ArtifactError::corrupt(path, e))?;
        crate::artifacts::write_file(path, &bytes)
    }

    pub fn load(path: &Path) -> Result<Self, ArtifactError> {
        let bytes = std::fs::read(path).map_err(|e| ArtifactError::io(path, e))?;
        let forest: RandomForest =
            bincode::deserialize(&bytes).map_err(|e| ArtifactError::corrupt(path, e))?;
        forest.validate().map_err(|e| ArtifactError::corrupt(path, e))?;
        Ok(forest)
    }
}

impl Classifier for RandomForest {
    fn name(&self) -> &str {
        "random_forest"
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn n_classes(&self) -> usize {
        self.n_classes
    }

    fn predict_proba(&self, features: &[f64]) -> Result<Vec<f64>, ModelError> {
        if features.len() != self.n_features {
            return Err(ModelError::DimensionMismatch {
                expected: self.n_features,
                got: features.len(),
            });
        }
        let mut probs = vec![0.0; self.n_classes];
        for tree in &self.trees {
            for (acc, p) in probs.iter_mut().zip(tree.leaf_distribution(features)) {
                *acc += p;
            }
        }
        let n_trees = self.trees.len() as f64;
        probs.iter_mut().for_each(|p| *p /= n_trees);
        Ok(probs)
    }

    fn feature_importances(&self) -> Option<Vec<f64>> {
        Some(self.importances.clone())
    }
}
