//! Binary classifiers over a dense feature matrix.
//!
//! Three variants share the [`Classifier`] capability:
//!
//! - [`LogisticRegression`]: L2-regularized gradient descent
//! - [`RandomForest`]: bagged Gini trees fit in parallel
//! - [`GradientBoosting`]: regression trees on log-loss residuals
//!
//! Labels are `0`/`1`, probabilities are for the positive class.

mod boosting;
mod forest;
mod logistic;
mod tree;

pub use boosting::GradientBoosting;
pub use forest::RandomForest;
pub use logistic::LogisticRegression;
pub use tree::{Criterion, DecisionTree, TreeNode};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use ndarray::Array2;

/// Decision threshold on the positive-class probability.
pub const DECISION_THRESHOLD: f64 = 0.5;

/// A trainable binary classifier.
pub trait Classifier: Send + Sync {
    /// Display name used in logs and reports.
    fn name(&self) -> &str;

    /// Fit in place on `x` (rows = samples) and `y` (0/1 labels).
    fn fit(&mut self, x: &Array2<f64>, y: &[u8]) -> Result<()>;

    /// Positive-class probability per row.
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Vec<f64>>;

    /// Hard 0/1 labels per row.
    fn predict(&self, x: &Array2<f64>) -> Result<Vec<u8>> {
        Ok(self
            .predict_proba(x)?
            .into_iter()
            .map(|p| u8::from(p >= DECISION_THRESHOLD))
            .collect())
    }

    /// Per-feature importance in training column order, `None` before fit.
    fn feature_importance(&self) -> Option<Vec<f64>>;

    /// Hyperparameters as a JSON object, for reports.
    fn hyperparameters(&self) -> serde_json::Value;
}

/// The three default variants, in submission order, with the seed from
/// `config` threaded through each.
pub fn default_models(config: &PipelineConfig) -> Vec<Box<dyn Classifier>> {
    vec![
        Box::new(LogisticRegression::new(config.logistic, config.seed)),
        Box::new(RandomForest::new(config.forest, config.seed)),
        Box::new(GradientBoosting::new(config.boosting, config.seed)),
    ]
}

/// Reject empty or misaligned training input.
pub(crate) fn check_fit_input(x: &Array2<f64>, y: &[u8]) -> Result<()> {
    if x.nrows() == 0 || x.ncols() == 0 {
        return Err(PipelineError::InvalidInput(format!(
            "feature matrix is empty ({} rows, {} columns)",
            x.nrows(),
            x.ncols()
        )));
    }
    if y.is_empty() {
        return Err(PipelineError::InvalidInput("label vector is empty".to_string()));
    }
    if x.nrows() != y.len() {
        return Err(PipelineError::InvalidInput(format!(
            "{} feature rows but {} labels",
            x.nrows(),
            y.len()
        )));
    }
    if let Some(bad) = y.iter().find(|&&label| label > 1) {
        return Err(PipelineError::InvalidInput(format!(
            "labels must be 0 or 1, found {}",
            bad
        )));
    }
    Ok(())
}

/// Reject prediction input whose width differs from the fitted width.
pub(crate) fn check_predict_input(name: &str, fitted: Option<usize>, x: &Array2<f64>) -> Result<()> {
    let Some(n_features) = fitted else {
        return Err(PipelineError::ModelNotTrained(name.to_string()));
    };
    if x.ncols() != n_features {
        return Err(PipelineError::InvalidInput(format!(
            "{} was fit on {} features but got {}",
            name,
            n_features,
            x.ncols()
        )));
    }
    Ok(())
}

pub(crate) fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

#[cfg(test)]
pub(crate) mod test_data {
    use ndarray::Array2;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    /// Two noisy features where only the first drives the label.
    pub fn separable(n: usize, seed: u64) -> (Array2<f64>, Vec<u8>) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut x = Array2::zeros((n, 2));
        let mut y = Vec::with_capacity(n);
        for i in 0..n {
            let label = u8::from(i % 2 == 0);
            let signal = if label == 1 { 1.5 } else { -1.5 };
            x[[i, 0]] = signal + rng.gen_range(-1.0..1.0);
            x[[i, 1]] = rng.gen_range(-1.0..1.0);
            y.push(label);
        }
        (x, y)
    }

    pub fn accuracy(predicted: &[u8], y: &[u8]) -> f64 {
        let correct = predicted.iter().zip(y).filter(|(a, b)| a == b).count();
        correct as f64 / y.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_default_models_order() {
        let models = default_models(&PipelineConfig::default());
        let names: Vec<&str> = models.iter().map(|m| m.name()).collect();
        assert_eq!(
            names,
            vec!["LogisticRegression", "RandomForest", "GradientBoosting"]
        );
    }

    #[test]
    fn test_check_fit_input() {
        let x = array![[1.0], [2.0]];
        assert!(check_fit_input(&x, &[0, 1]).is_ok());
        assert!(matches!(
            check_fit_input(&x, &[0]),
            Err(PipelineError::InvalidInput(_))
        ));
        assert!(matches!(
            check_fit_input(&Array2::zeros((0, 0)), &[]),
            Err(PipelineError::InvalidInput(_))
        ));
        assert!(check_fit_input(&x, &[0, 2]).is_err());
    }

    #[test]
    fn test_check_predict_input() {
        let x = array![[1.0, 2.0]];
        assert!(matches!(
            check_predict_input("m", None, &x),
            Err(PipelineError::ModelNotTrained(_))
        ));
        assert!(check_predict_input("m", Some(3), &x).is_err());
        assert!(check_predict_input("m", Some(2), &x).is_ok());
    }
}
