use super::tree::{Criterion, DecisionTree, normalize};
use super::{Classifier, check_fit_input, check_predict_input, sigmoid};
use crate::config::BoostingParams;
use crate::error::Result;
use ndarray::Array2;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde_json::json;
use tracing::debug;

/// Probability clamp for the initial log-odds.
const PROBA_EPS: f64 = 1e-15;

/// Gradient boosted regression trees with a logistic link.
///
/// Starts from the log-odds of the training prior and adds one regression
/// tree per round, fit to the residuals `y - p`.
#[derive(Debug, Clone)]
pub struct GradientBoosting {
    params: BoostingParams,
    seed: u64,
    trees: Vec<DecisionTree>,
    initial_prediction: f64,
    n_features: Option<usize>,
}

impl GradientBoosting {
    pub fn new(params: BoostingParams, seed: u64) -> Self {
        Self {
            params,
            seed,
            trees: Vec::new(),
            initial_prediction: 0.0,
            n_features: None,
        }
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    fn raw_scores(&self, x: &Array2<f64>) -> Vec<f64> {
        let lr = self.params.learning_rate;
        (0..x.nrows())
            .map(|row| {
                self.trees
                    .iter()
                    .fold(self.initial_prediction, |acc, t| acc + lr * t.predict_row(x, row))
            })
            .collect()
    }
}

impl Classifier for GradientBoosting {
    fn name(&self) -> &str {
        "GradientBoosting"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &[u8]) -> Result<()> {
        check_fit_input(x, y)?;

        let n_samples = x.nrows();
        let targets: Vec<f64> = y.iter().map(|&label| f64::from(label)).collect();
        let prior = (targets.iter().sum::<f64>() / n_samples as f64).clamp(PROBA_EPS, 1.0 - PROBA_EPS);
        let all_rows: Vec<usize> = (0..n_samples).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);

        self.initial_prediction = (prior / (1.0 - prior)).ln();
        self.trees = Vec::with_capacity(self.params.n_trees);
        let mut scores = vec![self.initial_prediction; n_samples];

        for _ in 0..self.params.n_trees {
            let residuals: Vec<f64> = targets
                .iter()
                .zip(&scores)
                .map(|(y, f)| y - sigmoid(*f))
                .collect();

            let mut tree = DecisionTree::new(Criterion::Mse, self.params.max_depth)
                .with_min_samples_split(self.params.min_samples_split);
            tree.fit(x, &residuals, &all_rows, &mut rng);

            for (row, score) in scores.iter_mut().enumerate() {
                *score += self.params.learning_rate * tree.predict_row(x, row);
            }
            self.trees.push(tree);
        }
        self.n_features = Some(x.ncols());

        debug!("GradientBoosting fit {} rounds", self.trees.len());
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Vec<f64>> {
        check_predict_input(self.name(), self.n_features, x)?;
        Ok(self.raw_scores(x).into_iter().map(sigmoid).collect())
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
            "learning_rate": self.params.learning_rate,
            "max_depth": self.params.max_depth,
            "min_samples_split": self.params.min_samples_split,
            "random_state": self.seed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::test_data::{accuracy, separable};

    #[test]
    fn test_learns_separable_data() {
        let (x, y) = separable(200, 8);
        let params = BoostingParams {
            n_trees: 30,
            max_depth: 3,
            ..BoostingParams::default()
        };
        let mut model = GradientBoosting::new(params, 42);
        model.fit(&x, &y).unwrap();
        assert_eq!(model.n_trees(), 30);
        assert!(accuracy(&model.predict(&x).unwrap(), &y) > 0.9);

        let importance = model.feature_importance().unwrap();
        assert!(importance[0] > importance[1]);
    }

    #[test]
    fn test_single_class_predicts_prior() {
        let x = Array2::from_shape_vec((4, 1), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let y = vec![1, 1, 1, 1];
        let mut model = GradientBoosting::new(BoostingParams::default(), 42);
        model.fit(&x, &y).unwrap();
        let proba = model.predict_proba(&x).unwrap();
        assert!(proba.iter().all(|p| *p > 0.99));
        assert_eq!(model.feature_importance().unwrap(), vec![0.0]);
    }
}
