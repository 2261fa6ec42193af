use super::tree::{Criterion, DecisionTree, normalize};
use super::{Classifier, check_fit_input, check_predict_input};
use crate::config::ForestParams;
use crate::error::Result;
use ndarray::Array2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde_json::json;
use tracing::debug;

/// Bagged ensemble of Gini trees.
///
/// Each tree sees a bootstrap sample and `sqrt(n_features)` candidate
/// features per split. Tree `i` is seeded with `seed + i`, so the fitted
/// forest does not depend on thread scheduling.
#[derive(Debug, Clone)]
pub struct RandomForest {
    params: ForestParams,
    seed: u64,
    trees: Vec<DecisionTree>,
    n_features: Option<usize>,
}

impl RandomForest {
    pub fn new(params: ForestParams, seed: u64) -> Self {
        Self {
            params,
            seed,
            trees: Vec::new(),
            n_features: None,
        }
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    fn max_features(n_features: usize) -> usize {
        ((n_features as f64).sqrt().round() as usize).max(1)
    }
}

impl Classifier for RandomForest {
    fn name(&self) -> &str {
        "RandomForest"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &[u8]) -> Result<()> {
        check_fit_input(x, y)?;

        let n_samples = x.nrows();
        let targets: Vec<f64> = y.iter().map(|&label| f64::from(label)).collect();
        let max_features = Self::max_features(x.ncols());
        let params = self.params;
        let base_seed = self.seed;

        self.trees = (0..params.n_trees)
            .into_par_iter()
            .map(|idx| {
                let mut rng = ChaCha8Rng::seed_from_u64(base_seed.wrapping_add(idx as u64));
                let sample: Vec<usize> = (0..n_samples)
                    .map(|_| rng.gen_range(0..n_samples))
                    .collect();

                let mut tree = DecisionTree::new(Criterion::Gini, params.max_depth)
                    .with_min_samples_split(params.min_samples_split)
                    .with_min_samples_leaf(params.min_samples_leaf)
                    .with_max_features(max_features);
                tree.fit(x, &targets, &sample, &mut rng);
                tree
            })
            .collect();
        self.n_features = Some(x.ncols());

        debug!(
            "RandomForest fit {} trees with {} candidate features per split",
            self.trees.len(),
            max_features
        );
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Vec<f64>> {
        check_predict_input(self.name(), self.n_features, x)?;
        let n_trees = self.trees.len().max(1) as f64;
        Ok((0..x.nrows())
            .into_par_iter()
            .map(|row| {
                self.trees.iter().map(|t| t.predict_row(x, row)).sum::<f64>() / n_trees
            })
            .collect())
    }

    fn feature_importance(&self) -> Option<Vec<f64>> {
        let n_features = self.n_features?;
        let mut total = vec![0.0; n_features];
        for tree in &self.trees {
            for (acc, value) in total.iter_mut().zip(tree.feature_importances()) {
                *acc += value;
            }
        }
        Some(normalize(&total))
    }

    fn hyperparameters(&self) -> serde_json::Value {
        json!({
            "n_estimators": self.params.n_trees,
            "max_depth": self.params.max_depth,
            "min_samples_split": self.params.min_samples_split,
            "min_samples_leaf": self.params.min_samples_leaf,
            "max_features": "sqrt",
            "bootstrap": true,
            "random_state": self.seed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::test_data::{accuracy, separable};

    fn small_params() -> ForestParams {
        ForestParams {
            n_trees: 20,
            max_depth: 5,
            ..ForestParams::default()
        }
    }

    #[test]
    fn test_learns_separable_data() {
        let (x, y) = separable(200, 4);
        let mut model = RandomForest::new(small_params(), 42);
        model.fit(&x, &y).unwrap();
        assert_eq!(model.n_trees(), 20);
        assert!(accuracy(&model.predict(&x).unwrap(), &y) > 0.9);

        let importance = model.feature_importance().unwrap();
        assert!((importance.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(importance[0] > importance[1]);
    }

    #[test]
    fn test_same_seed_same_forest() {
        let (x, y) = separable(100, 5);
        let mut a = RandomForest::new(small_params(), 7);
        let mut b = RandomForest::new(small_params(), 7);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a.predict_proba(&x).unwrap(), b.predict_proba(&x).unwrap());
    }

    #[test]
    fn test_feature_mismatch_is_rejected() {
        let (x, y) = separable(50, 6);
        let mut model = RandomForest::new(small_params(), 42);
        model.fit(&x, &y).unwrap();
        let narrow = Array2::zeros((3, 1));
        assert!(model.predict(&narrow).is_err());
    }
}
