//! CART decision tree shared by the tree ensembles.
//!
//! Classification trees (Gini) store the positive-class fraction in their
//! leaves; regression trees (MSE) store the mean target. Both criteria are
//! computed from running `(count, sum, sum of squares)` statistics, so one
//! sorted sweep per feature finds the best threshold.

use ndarray::Array2;
use rand::seq::index::sample;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf node with prediction value
    Leaf { value: f64, n_samples: usize },
    /// Internal node with split
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
    },
}

/// Impurity criterion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Criterion {
    /// Gini impurity over binary 0/1 targets
    Gini,
    /// Mean squared error (regression)
    Mse,
}

impl Criterion {
    fn impurity(self, count: f64, sum: f64, sq_sum: f64) -> f64 {
        if count <= 0.0 {
            return 0.0;
        }
        let mean = sum / count;
        match self {
            Criterion::Gini => 2.0 * mean * (1.0 - mean),
            Criterion::Mse => (sq_sum / count - mean * mean).max(0.0),
        }
    }
}

/// Running statistics of a set of targets.
#[derive(Debug, Clone, Copy, Default)]
struct Stats {
    count: f64,
    sum: f64,
    sq_sum: f64,
}

impl Stats {
    fn add(&mut self, y: f64) {
        self.count += 1.0;
        self.sum += y;
        self.sq_sum += y * y;
    }

    fn sub(&mut self, y: f64) {
        self.count -= 1.0;
        self.sum -= y;
        self.sq_sum -= y * y;
    }

    fn of(targets: &[f64], indices: &[usize]) -> Self {
        let mut stats = Stats::default();
        for &i in indices {
            stats.add(targets[i]);
        }
        stats
    }

    fn mean(&self) -> f64 {
        if self.count > 0.0 { self.sum / self.count } else { 0.0 }
    }
}

/// Best split found for a node.
#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature_idx: usize,
    threshold: f64,
    gain: f64,
}

/// Decision tree model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    root: Option<TreeNode>,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features considered per split; `None` considers all.
    pub max_features: Option<usize>,
    pub criterion: Criterion,
    n_features: usize,
    /// Unnormalized impurity decrease per feature.
    importances: Vec<f64>,
}

impl DecisionTree {
    pub fn new(criterion: Criterion, max_depth: usize) -> Self {
        Self {
            root: None,
            max_depth,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            criterion,
            n_features: 0,
            importances: Vec::new(),
        }
    }

    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples.max(2);
        self
    }

    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples.max(1);
        self
    }

    pub fn with_max_features(mut self, max_features: usize) -> Self {
        self.max_features = Some(max_features.max(1));
        self
    }

    /// Fit on the rows listed in `indices` (duplicates allowed, for bootstrap
    /// samples). `rng` drives per-split feature subsampling.
    pub fn fit(
        &mut self,
        x: &Array2<f64>,
        targets: &[f64],
        indices: &[usize],
        rng: &mut ChaCha8Rng,
    ) {
        self.n_features = x.ncols();
        self.importances = vec![0.0; self.n_features];
        let mut importances = vec![0.0; self.n_features];
        self.root = Some(self.build(x, targets, indices, 0, &mut importances, rng));
        self.importances = importances;
    }

    pub fn is_fitted(&self) -> bool {
        self.root.is_some()
    }

    /// Impurity decrease per feature, normalized to sum to 1 (all zeros if the
    /// tree never split).
    pub fn feature_importances(&self) -> Vec<f64> {
        normalize(&self.importances)
    }

    pub fn predict_row(&self, x: &Array2<f64>, row: usize) -> f64 {
        let mut node = match &self.root {
            Some(root) => root,
            None => return 0.0,
        };
        loop {
            match node {
                TreeNode::Leaf { value, .. } => return *value,
                TreeNode::Split {
                    feature_idx,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    node = if x[[row, *feature_idx]] <= *threshold {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }

    pub fn predict(&self, x: &Array2<f64>) -> Vec<f64> {
        (0..x.nrows()).map(|row| self.predict_row(x, row)).collect()
    }

    fn build(
        &self,
        x: &Array2<f64>,
        targets: &[f64],
        indices: &[usize],
        depth: usize,
        importances: &mut [f64],
        rng: &mut ChaCha8Rng,
    ) -> TreeNode {
        let n_samples = indices.len();
        let stats = Stats::of(targets, indices);
        let parent_impurity = self.criterion.impurity(stats.count, stats.sum, stats.sq_sum);

        let should_stop = n_samples < self.min_samples_split
            || depth >= self.max_depth
            || parent_impurity <= f64::EPSILON;
        if should_stop {
            return TreeNode::Leaf {
                value: stats.mean(),
                n_samples,
            };
        }

        let Some(best) = self.find_best_split(x, targets, indices, stats, parent_impurity, rng)
        else {
            return TreeNode::Leaf {
                value: stats.mean(),
                n_samples,
            };
        };

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| x[[i, best.feature_idx]] <= best.threshold);

        importances[best.feature_idx] += n_samples as f64 * best.gain;

        let left = Box::new(self.build(x, targets, &left_indices, depth + 1, importances, rng));
        let right = Box::new(self.build(x, targets, &right_indices, depth + 1, importances, rng));

        TreeNode::Split {
            feature_idx: best.feature_idx,
            threshold: best.threshold,
            left,
            right,
            n_samples,
        }
    }

    fn candidate_features(&self, rng: &mut ChaCha8Rng) -> Vec<usize> {
        match self.max_features {
            Some(k) if k < self.n_features => {
                let mut features = sample(rng, self.n_features, k).into_vec();
                features.sort_unstable();
                features
            }
            _ => (0..self.n_features).collect(),
        }
    }

    fn find_best_split(
        &self,
        x: &Array2<f64>,
        targets: &[f64],
        indices: &[usize],
        total: Stats,
        parent_impurity: f64,
        rng: &mut ChaCha8Rng,
    ) -> Option<SplitCandidate> {
        let mut best: Option<SplitCandidate> = None;
        let mut sorted: Vec<(f64, f64)> = Vec::with_capacity(indices.len());

        for feature_idx in self.candidate_features(rng) {
            sorted.clear();
            sorted.extend(indices.iter().map(|&i| (x[[i, feature_idx]], targets[i])));
            sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut left = Stats::default();
            let mut right = total;
            for pos in 0..sorted.len().saturating_sub(1) {
                let (value, y) = sorted[pos];
                left.add(y);
                right.sub(y);

                let next_value = sorted[pos + 1].0;
                if next_value <= value {
                    continue;
                }
                if (left.count as usize) < self.min_samples_leaf
                    || (right.count as usize) < self.min_samples_leaf
                {
                    continue;
                }

                let weighted = (left.count
                    * self.criterion.impurity(left.count, left.sum, left.sq_sum)
                    + right.count * self.criterion.impurity(right.count, right.sum, right.sq_sum))
                    / total.count;
                let gain = parent_impurity - weighted;

                if gain > best.map_or(f64::EPSILON, |b| b.gain) {
                    best = Some(SplitCandidate {
                        feature_idx,
                        threshold: (value + next_value) / 2.0,
                        gain,
                    });
                }
            }
        }

        best
    }
}

/// Scale values to sum to 1; all-zero input stays all zeros.
pub fn normalize(values: &[f64]) -> Vec<f64> {
    let total: f64 = values.iter().sum();
    if total > 0.0 {
        values.iter().map(|v| v / total).collect()
    } else {
        vec![0.0; values.len()]
    }
}
