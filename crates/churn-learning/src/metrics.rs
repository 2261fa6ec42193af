//! Binary classification metrics.
//!
//! Precision, recall and F1 are support-weighted averages over both classes.
//! Any zero division yields 0. AUC is 0.0 whenever it cannot be computed
//! (a single class in the labels, or non-finite scores).

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};

/// Precision, recall and F1 for one class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub label: u8,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Scores of one model on a held-out set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub auc: f64,
    /// `[[tn, fp], [fn, tp]]`
    pub confusion_matrix: [[usize; 2]; 2],
    /// Class 0 then class 1.
    pub per_class: Vec<ClassMetrics>,
}

impl Metrics {
    /// Score predictions against `y_true`. `scores` are positive-class
    /// probabilities used for AUC.
    pub fn compute(y_true: &[u8], y_pred: &[u8], scores: &[f64]) -> Result<Self> {
        if y_true.is_empty() {
            return Err(PipelineError::InvalidInput("no labels to score".to_string()));
        }
        if y_true.len() != y_pred.len() || y_true.len() != scores.len() {
            return Err(PipelineError::InvalidInput(format!(
                "{} labels, {} predictions, {} scores",
                y_true.len(),
                y_pred.len(),
                scores.len()
            )));
        }

        let confusion_matrix = confusion_matrix(y_true, y_pred);
        let [[tn, fp], [fn_, tp]] = confusion_matrix;
        let total = y_true.len();

        let per_class = vec![
            class_metrics(0, tn, fn_, fp),
            class_metrics(1, tp, fp, fn_),
        ];
        let weighted = |field: fn(&ClassMetrics) -> f64| {
            per_class
                .iter()
                .map(|c| field(c) * c.support as f64)
                .sum::<f64>()
                / total as f64
        };

        Ok(Self {
            accuracy: (tn + tp) as f64 / total as f64,
            precision: weighted(|c: &ClassMetrics| c.precision),
            recall: weighted(|c: &ClassMetrics| c.recall),
            f1: weighted(|c: &ClassMetrics| c.f1),
            auc: roc_auc(y_true, scores),
            confusion_matrix,
            per_class,
        })
    }
}

/// `[[tn, fp], [fn, tp]]` counts. Any nonzero label counts as positive.
pub fn confusion_matrix(y_true: &[u8], y_pred: &[u8]) -> [[usize; 2]; 2] {
    let mut matrix = [[0usize; 2]; 2];
    for (&actual, &predicted) in y_true.iter().zip(y_pred) {
        matrix[usize::from(actual != 0)][usize::from(predicted != 0)] += 1;
    }
    matrix
}

/// Metrics for one class given its true positives, false positives and
/// false negatives (from that class's point of view).
fn class_metrics(label: u8, tp: usize, fp: usize, fn_: usize) -> ClassMetrics {
    let precision = ratio(tp, tp + fp);
    let recall = ratio(tp, tp + fn_);
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };
    ClassMetrics {
        label,
        precision,
        recall,
        f1,
        support: tp + fn_,
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Area under the ROC curve via the rank-sum statistic, averaging ranks
/// over tied scores.
pub fn roc_auc(y_true: &[u8], scores: &[f64]) -> f64 {
    if y_true.len() != scores.len() || scores.iter().any(|s| !s.is_finite()) {
        return 0.0;
    }
    let n_pos = y_true.iter().filter(|&&y| y != 0).count();
    let n_neg = y_true.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return 0.0;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut positive_rank_sum = 0.0;
    let mut start = 0;
    while start < order.len() {
        let mut end = start;
        while end + 1 < order.len() && scores[order[end + 1]] == scores[order[start]] {
            end += 1;
        }
        // Ranks are 1-based; tied scores share the mean rank.
        let rank = (start + end) as f64 / 2.0 + 1.0;
        for &i in &order[start..=end] {
            if y_true[i] != 0 {
                positive_rank_sum += rank;
            }
        }
        start = end + 1;
    }

    let n_pos = n_pos as f64;
    (positive_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg as f64)
}
