use super::{Classifier, check_fit_input, check_predict_input, sigmoid};
use crate::config::LogisticParams;
use crate::error::Result;
use ndarray::{Array1, Array2};
use serde_json::json;
use tracing::debug;

/// Logistic regression fit by full-batch gradient descent with an L2 penalty.
///
/// Importance is the absolute value of each coefficient.
#[derive(Debug, Clone)]
pub struct LogisticRegression {
    params: LogisticParams,
    seed: u64,
    coefficients: Option<Array1<f64>>,
    intercept: f64,
    n_iter: usize,
}

impl LogisticRegression {
    pub fn new(params: LogisticParams, seed: u64) -> Self {
        Self {
            params,
            seed,
            coefficients: None,
            intercept: 0.0,
            n_iter: 0,
        }
    }

    pub fn coefficients(&self) -> Option<&Array1<f64>> {
        self.coefficients.as_ref()
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    /// Iterations run by the last fit.
    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    fn decision(&self, x: &Array2<f64>, coefficients: &Array1<f64>) -> Array1<f64> {
        x.dot(coefficients) + self.intercept
    }
}

impl Classifier for LogisticRegression {
    fn name(&self) -> &str {
        "LogisticRegression"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &[u8]) -> Result<()> {
        check_fit_input(x, y)?;

        let n_samples = x.nrows() as f64;
        let targets: Array1<f64> = y.iter().map(|&label| f64::from(label)).collect();
        let mut weights = Array1::<f64>::zeros(x.ncols());
        let mut bias = 0.0;
        let lr = self.params.learning_rate;

        self.n_iter = self.params.max_iter;
        for iteration in 0..self.params.max_iter {
            let linear = x.dot(&weights) + bias;
            let errors = linear.mapv(sigmoid) - &targets;

            let grad_w = x.t().dot(&errors) / n_samples + &weights * self.params.alpha;
            let grad_b = errors.sum() / n_samples;

            weights = &weights - &(&grad_w * lr);
            bias -= lr * grad_b;

            let step = grad_w
                .iter()
                .fold((lr * grad_b).abs(), |acc, g| acc.max((lr * g).abs()));
            if step < self.params.tolerance {
                self.n_iter = iteration + 1;
                break;
            }
        }

        debug!("LogisticRegression converged after {} iterations", self.n_iter);
        self.coefficients = Some(weights);
        self.intercept = bias;
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Vec<f64>> {
        check_predict_input(self.name(), self.coefficients.as_ref().map(|c| c.len()), x)?;
        let Some(coefficients) = &self.coefficients else {
            return Ok(Vec::new());
        };
        Ok(self.decision(x, coefficients).mapv(sigmoid).to_vec())
    }

    fn feature_importance(&self) -> Option<Vec<f64>> {
        self.coefficients
            .as_ref()
            .map(|c| c.iter().map(|w| w.abs()).collect())
    }

    fn hyperparameters(&self) -> serde_json::Value {
        json!({
            "learning_rate": self.params.learning_rate,
            "max_iter": self.params.max_iter,
            "tolerance": self.params.tolerance,
            "alpha": self.params.alpha,
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
        let (x, y) = separable(200, 1);
        let mut model = LogisticRegression::new(LogisticParams::default(), 42);
        model.fit(&x, &y).unwrap();

        let predicted = model.predict(&x).unwrap();
        assert!(accuracy(&predicted, &y) > 0.9);

        let importance = model.feature_importance().unwrap();
        assert_eq!(importance.len(), 2);
        assert!(importance[0] > importance[1]);
        assert!(importance.iter().all(|v| *v >= 0.0));
    }

    #[test]
    fn test_probabilities_in_unit_interval() {
        let (x, y) = separable(50, 2);
        let mut model = LogisticRegression::new(LogisticParams::default(), 42);
        model.fit(&x, &y).unwrap();
        let proba = model.predict_proba(&x).unwrap();
        assert_eq!(proba.len(), 50);
        assert!(proba.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_predict_before_fit_fails() {
        let (x, _) = separable(10, 3);
        let model = LogisticRegression::new(LogisticParams::default(), 42);
        assert!(model.predict(&x).is_err());
        assert!(model.feature_importance().is_none());
    }
}
