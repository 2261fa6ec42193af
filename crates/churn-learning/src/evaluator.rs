//! Scoring trained models on held-out data and picking the best one.

use crate::error::{PipelineError, Result};
use crate::metrics::Metrics;
use crate::trainer::{LabeledSet, TrainedModel};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{Span, debug, info, info_span, warn};

/// Metrics of every model that evaluated successfully, in submission order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub results: Vec<(String, Metrics)>,
    /// Highest F1, first submitted wins ties. `None` when `results` is empty.
    pub best_model: Option<String>,
    pub model_count: usize,
}

impl EvaluationReport {
    pub fn get(&self, model: &str) -> Option<&Metrics> {
        self.results
            .iter()
            .find(|(name, _)| name == model)
            .map(|(_, metrics)| metrics)
    }

    /// Metrics of the selected model.
    pub fn best_metrics(&self) -> Option<&Metrics> {
        self.best_model.as_deref().and_then(|name| self.get(name))
    }

    /// One row per evaluated model.
    pub fn comparison(&self) -> Vec<ModelComparison> {
        self.results
            .iter()
            .map(|(name, m)| ModelComparison {
                model: name.clone(),
                accuracy: m.accuracy,
                precision: m.precision,
                recall: m.recall,
                f1: m.f1,
                auc: m.auc,
            })
            .collect()
    }
}

/// A row of the model comparison table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelComparison {
    pub model: String,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub auc: f64,
}

/// One (model, feature, importance) entry of the cross-model importance table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportanceRow {
    pub model: String,
    pub feature: String,
    pub importance: f64,
}

/// Feature importances of every trained model, grouped by model in input
/// order. Models that expose no importances contribute no rows.
pub fn feature_importance_comparison(models: &[TrainedModel]) -> Vec<FeatureImportanceRow> {
    models
        .iter()
        .filter(|model| model.is_trained())
        .flat_map(|model| {
            model
                .feature_importance()
                .into_iter()
                .map(move |(feature, importance)| FeatureImportanceRow {
                    model: model.name().to_string(),
                    feature,
                    importance,
                })
        })
        .collect()
}

/// Scores trained models.
pub trait Evaluator: Send + Sync {
    /// Score one trained model on `test`.
    fn evaluate_one(&self, model: &TrainedModel, test: &LabeledSet) -> Result<Metrics>;

    /// Score every model, leaving out the ones that fail, and select the best.
    fn evaluate_many(&self, models: &[TrainedModel], test: &LabeledSet) -> EvaluationReport;

    /// Name of the model with the highest F1.
    fn select_best(&self, results: &[(String, Metrics)]) -> Option<String> {
        select_best(results)
    }
}

/// Highest F1 wins; on a tie the earlier entry is kept.
pub fn select_best(results: &[(String, Metrics)]) -> Option<String> {
    let mut best: Option<&(String, Metrics)> = None;
    for entry in results {
        match best {
            Some((_, current)) if entry.1.f1 <= current.f1 => {}
            _ => best = Some(entry),
        }
    }
    best.map(|(name, _)| name.clone())
}

/// Default [`Evaluator`]; models are scored in parallel.
pub struct ModelEvaluator {
    span: Span,
}

impl ModelEvaluator {
    pub fn new() -> Self {
        Self {
            span: info_span!("evaluator"),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }
}

impl Default for ModelEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator for ModelEvaluator {
    fn evaluate_one(&self, model: &TrainedModel, test: &LabeledSet) -> Result<Metrics> {
        let _guard = self.span.enter();
        let failed = |reason: String| PipelineError::Evaluation {
            model: model.name().to_string(),
            reason,
        };

        if !model.is_trained() {
            return Err(failed("model has not been trained".to_string()));
        }
        if model.feature_names() != test.feature_names.as_slice() {
            return Err(failed(format!(
                "model was trained on {} features, test set has {}",
                model.feature_names().len(),
                test.feature_names.len()
            )));
        }

        let predicted = model.predict(&test.x).map_err(|e| failed(e.to_string()))?;
        let scores = model
            .predict_proba(&test.x)
            .map_err(|e| failed(e.to_string()))?;
        let metrics =
            Metrics::compute(&test.y, &predicted, &scores).map_err(|e| failed(e.to_string()))?;

        debug!(
            "{}: accuracy {:.4}, f1 {:.4}, auc {:.4}",
            model.name(),
            metrics.accuracy,
            metrics.f1,
            metrics.auc
        );
        Ok(metrics)
    }

    fn evaluate_many(&self, models: &[TrainedModel], test: &LabeledSet) -> EvaluationReport {
        let outcomes: Vec<Result<Metrics>> = models
            .par_iter()
            .map(|model| self.evaluate_one(model, test))
            .collect();

        let _guard = self.span.enter();
        let mut results = Vec::with_capacity(models.len());
        for (model, outcome) in models.iter().zip(outcomes) {
            match outcome {
                Ok(metrics) => {
                    info!("{} evaluated: F1 {:.4}", model.name(), metrics.f1);
                    results.push((model.name().to_string(), metrics));
                }
                Err(e) => warn!("Skipping {}: {}", model.name(), e),
            }
        }

        let best_model = self.select_best(&results);
        match &best_model {
            Some(name) => info!("Best model: {}", name),
            None => warn!("No model could be evaluated"),
        }
        EvaluationReport {
            model_count: results.len(),
            results,
            best_model,
        }
    }
}

static_assertions::assert_impl_all!(ModelEvaluator: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{Classifier, LogisticRegression};
    use crate::config::LogisticParams;
    use crate::trainer::{ModelTrainer, Trainer};
    use ndarray::Array2;
    use pretty_assertions::assert_eq;

    fn metrics_with_f1(f1: f64) -> Metrics {
        Metrics {
            accuracy: f1,
            precision: f1,
            recall: f1,
            f1,
            auc: 0.5,
            confusion_matrix: [[0, 0], [0, 0]],
            per_class: Vec::new(),
        }
    }

    fn data(n: usize, names: &[&str]) -> LabeledSet {
        let x = Array2::from_shape_fn((n, names.len()), |(i, j)| {
            if i % 2 == 0 { 1.0 + j as f64 } else { -1.0 - j as f64 }
        });
        let y = (0..n).map(|i| u8::from(i % 2 == 0)).collect();
        LabeledSet::new(x, y, names.iter().map(|s| s.to_string()).collect()).unwrap()
    }

    #[test]
    fn test_select_best_first_seen_tie_wins() {
        let results = vec![
            ("A".to_string(), metrics_with_f1(0.80)),
            ("B".to_string(), metrics_with_f1(0.85)),
            ("C".to_string(), metrics_with_f1(0.85)),
        ];
        assert_eq!(select_best(&results), Some("B".to_string()));
        assert_eq!(select_best(&[]), None);
    }

    #[test]
    fn test_evaluate_one_scores_trained_model() {
        let trainer = ModelTrainer::new(1);
        let train = data(40, &["a", "b"]);
        let model: Box<dyn Classifier> =
            Box::new(LogisticRegression::new(LogisticParams::default(), 42));
        let trained = trainer.train_one(model, &train).unwrap();

        let metrics = ModelEvaluator::new().evaluate_one(&trained, &train).unwrap();
        assert_eq!(metrics.accuracy, 1.0);
        assert_eq!(metrics.auc, 1.0);
        assert_eq!(metrics.confusion_matrix, [[20, 0], [0, 20]]);
    }

    #[test]
    fn test_evaluate_many_skips_failures() {
        let trainer = ModelTrainer::new(1);
        let train = data(40, &["a", "b"]);
        let model: Box<dyn Classifier> =
            Box::new(LogisticRegression::new(LogisticParams::default(), 42));
        let trained = trainer.train_one(model, &train).unwrap();
        let untrained = TrainedModel::new(
            Box::new(LogisticRegression::new(LogisticParams::default(), 1)),
            train.feature_names.clone(),
        );

        let evaluator = ModelEvaluator::new();
        let report = evaluator.evaluate_many(&[untrained, trained], &train);
        assert_eq!(report.model_count, 1);
        assert_eq!(report.best_model.as_deref(), Some("LogisticRegression"));
        assert_eq!(report.comparison().len(), 1);
        assert!(report.best_metrics().is_some());
    }

    #[test]
    fn test_feature_mismatch_is_evaluation_error() {
        let trainer = ModelTrainer::new(1);
        let model: Box<dyn Classifier> =
            Box::new(LogisticRegression::new(LogisticParams::default(), 42));
        let trained = trainer.train_one(model, &data(20, &["a", "b"])).unwrap();

        let err = ModelEvaluator::new()
            .evaluate_one(&trained, &data(20, &["a", "b", "c"]))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Evaluation { .. }));
    }

    #[test]
    fn test_empty_model_set_has_no_best() {
        let report = ModelEvaluator::new().evaluate_many(&[], &data(4, &["a"]));
        assert_eq!(report, EvaluationReport::default());
    }

    #[test]
    fn test_feature_importance_comparison_covers_trained_models() {
        let trainer = ModelTrainer::new(1);
        let train = data(40, &["a", "b"]);
        let model: Box<dyn Classifier> =
            Box::new(LogisticRegression::new(LogisticParams::default(), 42));
        let trained = trainer.train_one(model, &train).unwrap();
        let untrained = TrainedModel::new(
            Box::new(LogisticRegression::new(LogisticParams::default(), 1)),
            train.feature_names.clone(),
        );

        let rows = feature_importance_comparison(&[untrained, trained]);
        let features: Vec<&str> = rows.iter().map(|r| r.feature.as_str()).collect();
        assert_eq!(features, vec!["a", "b"]);
        assert!(rows.iter().all(|r| r.model == "LogisticRegression"));
        assert!(rows.iter().all(|r| r.importance >= 0.0));
    }
}
