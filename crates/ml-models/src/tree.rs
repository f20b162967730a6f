use ndarray::ArrayView2;
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        distribution: Vec<f64>,
    },
}

/// A fitted CART classification tree stored as a flat node arena (root at 0).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct DecisionTree {
    nodes: Vec<Node>,
}

pub(crate) struct TreeSettings {
    pub max_depth: Option<usize>,
    pub min_samples_leaf: usize,
    pub min_samples_split: usize,
    pub max_features: usize,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    /// Weighted impurity of the children: `w_left * gini_left + w_right * gini_right`.
    children_impurity: f64,
}

struct TreeBuilder<'a> {
    x: ArrayView2<'a, f64>,
    y: &'a [usize],
    class_weights: &'a [f64],
    n_classes: usize,
    settings: &'a TreeSettings,
    nodes: Vec<Node>,
    importances: Vec<f64>,
}

impl DecisionTree {
    /// Grows a tree on `samples` (row indices into `x`, duplicates allowed).
    ///
    /// Returns the tree and its un-normalized impurity-decrease per feature.
    pub(crate) fn fit<'a, R: Rng>(
        x: ArrayView2<'a, f64>,
        y: &'a [usize],
        class_weights: &'a [f64],
        n_classes: usize,
        mut samples: Vec<usize>,
        settings: &'a TreeSettings,
        rng: &mut R,
    ) -> (Self, Vec<f64>) {
        let mut builder = TreeBuilder {
            x,
            y,
            class_weights,
            n_classes,
            settings,
            nodes: Vec::new(),
            importances: vec![0.0; x.ncols()],
        };
        builder.grow(&mut samples, 0, rng);
        (
            Self {
                nodes: builder.nodes,
            },
            builder.importances,
        )
    }

    /// The class distribution of the leaf `row` falls into.
    pub(crate) fn leaf_distribution(&self, row: &[f64]) -> &[f64] {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if row[*feature] <= *threshold { *left } else { *right };
                }
                Node::Leaf { distribution } => return distribution,
            }
        }
    }

    /// Whether a deserialized tree is safe to walk.
    ///
    /// Children are always stored after their parent, so requiring
    /// `parent < child` rules out cycles and guarantees every lookup ends in
    /// a leaf.
    pub(crate) fn is_consistent(&self, n_features: usize, n_classes: usize) -> bool {
        let len = self.nodes.len();
        len > 0
            && self.nodes.iter().enumerate().all(|(index, node)| match node {
                Node::Split {
                    feature,
                    left,
                    right,
                    ..
                } => {
                    *feature < n_features
                        && (index + 1..len).contains(left)
                        && (index + 1..len).contains(right)
                }
                Node::Leaf { distribution } => distribution.len() == n_classes,
            })
    }
}

fn gini(counts: &[f64], total: f64) -> f64 {
    if total <= 0.0 {
        return 0.0;
    }
    1.0 - counts.iter().map(|c| (c / total) * (c / total)).sum::<f64>()
}

impl TreeBuilder<'_> {
    fn grow<R: Rng>(&mut self, samples: &mut [usize], depth: usize, rng: &mut R) -> usize {
        let mut counts = vec![0.0; self.n_classes];
        for &i in samples.iter() {
            counts[self.y[i]] += self.class_weights[self.y[i]];
        }
        let total: f64 = counts.iter().sum();
        let impurity = gini(&counts, total);

        let depth_allows = self.settings.max_depth.is_none_or(|max| depth < max);
        let can_split = depth_allows
            && impurity > 0.0
            && samples.len() >= self.settings.min_samples_split
            && samples.len() >= 2 * self.settings.min_samples_leaf;

        if can_split {
            if let Some(split) = self.best_split(samples, &counts, total, rng) {
                let decrease = total * impurity - split.children_impurity;
                self.importances[split.feature] += decrease.max(0.0);

                let mut mid = 0;
                for k in 0..samples.len() {
                    if self.x[[samples[k], split.feature]] <= split.threshold {
                        samples.swap(k, mid);
                        mid += 1;
                    }
                }

                let index = self.nodes.len();
                self.nodes.push(Node::Leaf {
                    distribution: Vec::new(),
                });
                let (left_samples, right_samples) = samples.split_at_mut(mid);
                let left = self.grow(left_samples, depth + 1, rng);
                let right = self.grow(right_samples, depth + 1, rng);
                self.nodes[index] = Node::Split {
                    feature: split.feature,
                    threshold: split.threshold,
                    left,
                    right,
                };
                return index;
            }
        }

        let distribution = if total > 0.0 {
            counts.iter().map(|c| c / total).collect()
        } else {
            vec![1.0 / self.n_classes as f64; self.n_classes]
        };
        self.nodes.push(Node::Leaf { distribution });
        self.nodes.len() - 1
    }

    /// Best split over a random subset of features; falls back to the
    /// remaining features when none of the sampled ones can split.
    fn best_split<R: Rng>(
        &self,
        samples: &[usize],
        counts: &[f64],
        total: f64,
        rng: &mut R,
    ) -> Option<SplitCandidate> {
        let n_features = self.x.ncols();
        let k = self.settings.max_features.clamp(1, n_features);
        let sampled = rand::seq::index::sample(rng, n_features, k).into_vec();

        let mut best = self.best_split_among(&sampled, samples, counts, total);
        if best.is_none() && k < n_features {
            let rest: Vec<usize> = (0..n_features).filter(|f| !sampled.contains(f)).collect();
            best = self.best_split_among(&rest, samples, counts, total);
        }
        best
    }

    fn best_split_among(
        &self,
        features: &[usize],
        samples: &[usize],
        counts: &[f64],
        total: f64,
    ) -> Option<SplitCandidate> {
        let min_leaf = self.settings.min_samples_leaf;
        let mut best: Option<SplitCandidate> = None;
        let mut order = samples.to_vec();
        let mut left_counts = vec![0.0; self.n_classes];
        let mut right_counts = vec![0.0; self.n_classes];

        for &feature in features {
            order.sort_by(|&a, &b| self.x[[a, feature]].total_cmp(&self.x[[b, feature]]));
            left_counts.iter_mut().for_each(|c| *c = 0.0);
            let mut left_total = 0.0;

            for pos in 0..order.len().saturating_sub(1) {
                let i = order[pos];
                let w = self.class_weights[self.y[i]];
                left_counts[self.y[i]] += w;
                left_total += w;

                let n_left = pos + 1;
                let n_right = order.len() - n_left;
                if n_left < min_leaf || n_right < min_leaf {
                    continue;
                }

                let value = self.x[[i, feature]];
                let next = self.x[[order[pos + 1], feature]];
                if next <= value {
                    continue;
                }

                for c in 0..self.n_classes {
                    right_counts[c] = counts[c] - left_counts[c];
                }
                let right_total = total - left_total;
                let children_impurity = left_total * gini(&left_counts, left_total)
                    + right_total * gini(&right_counts, right_total);

                let better = best
                    .as_ref()
                    .is_none_or(|b| children_impurity < b.children_impurity - 1e-12);
                if better {
                    let mut threshold = value / 2.0 + next / 2.0;
                    if threshold >= next || !threshold.is_finite() {
                        threshold = value;
                    }
                    best = Some(SplitCandidate {
                        feature,
                        threshold,
                        children_impurity,
                    });
                }
            }
        }
        best
    }
}
