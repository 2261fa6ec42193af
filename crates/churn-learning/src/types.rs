//! The aggregate result of a pipeline run.
//!
//! [`PipelineResult`] holds only plain data (numbers, strings, sequences), so
//! it can be serialized as-is by any [`ReportSink`](crate::reporting::ReportSink).
//!
//! # Example
//!
//! ```ignore
//! let result = pipeline.run()?;
//!
//! match &result.best_model {
//!     Some(name) => println!("Best model: {}", name),
//!     None => println!("No model survived training"),
//! }
//! for (feature, importance) in result.feature_importance.iter().take(5) {
//!     println!("{:<30} {:.4}", feature, importance);
//! }
//! ```

use crate::error::Result;
use crate::evaluator::{EvaluationReport, FeatureImportanceRow, ModelComparison};
use crate::metrics::Metrics;
use crate::trainer::TrainingRecord;
use churn_processing::{CleaningReport, FeatureInfo};
use serde::{Deserialize, Serialize};

/// Result of one pipeline run. Immutable once returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct PipelineResult {
    /// `true` when at least one model was trained and evaluated.
    pub success: bool,

    /// Before/after summary of the cleaning phase.
    pub cleaning_report: CleaningReport,

    /// Shape and names of the feature matrix.
    pub feature_info: FeatureInfo,

    /// One record per submitted model, in submission order, failures included.
    pub training_info: Vec<(String, TrainingRecord)>,

    /// Metrics of every model that evaluated successfully.
    pub evaluation_report: EvaluationReport,

    /// Name of the model with the highest F1 on the test set.
    pub best_model: Option<String>,

    /// Metrics of the best model.
    pub best_model_metrics: Option<Metrics>,

    /// One row per evaluated model.
    pub model_comparison: Vec<ModelComparison>,

    /// Importance of each feature for the best model, sorted descending.
    ///
    /// Empty when there is no best model.
    pub feature_importance: Vec<(String, f64)>,

    /// Importances of every trained model, grouped by model in training order.
    pub feature_importance_comparison: Vec<FeatureImportanceRow>,

    /// Rows in the train and test partitions.
    pub train_samples: usize,
    pub test_samples: usize,

    /// Non-fatal problems: models that failed to train or evaluate.
    pub warnings: Vec<String>,

    /// Wall-clock time of the whole run in seconds.
    pub total_execution_time_secs: f64,
}

impl PipelineResult {
    /// Pretty-printed JSON projection of the result.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// The `n` most important features of the best model.
    pub fn top_features(&self, n: usize) -> &[(String, f64)] {
        &self.feature_importance[..n.min(self.feature_importance.len())]
    }

    /// Importance rows of a single model from the cross-model table.
    pub fn importance_for<'a>(
        &'a self,
        model: &'a str,
    ) -> impl Iterator<Item = &'a FeatureImportanceRow> + 'a {
        self.feature_importance_comparison
            .iter()
            .filter(move |row| row.model == model)
    }

    /// Names of the models whose training failed.
    pub fn failed_models(&self) -> Vec<&str> {
        self.training_info
            .iter()
            .filter(|(_, record)| !record.success)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// Sort importance pairs descending, keeping feature order among equal values.
pub(crate) fn rank_importance(mut pairs: Vec<(String, f64)>) -> Vec<(String, f64)> {
    pairs.sort_by(|a, b| b.1.total_cmp(&a.1));
    pairs
}
