use super::{ReportSink, timestamp};
use crate::error::{PipelineError, Result};
use crate::types::PipelineResult;
use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

const TOP_FEATURES: usize = 10;
const MAX_INSIGHTS: usize = 5;
const PER_MODEL_FEATURES: usize = 5;

/// Writes a human-readable `REPORT_{timestamp}.md`.
#[derive(Debug, Clone)]
pub struct MarkdownReportSink {
    output_dir: PathBuf,
}

impl MarkdownReportSink {
    pub fn new(output_dir: impl AsRef<Path>) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
        }
    }

    /// Render the report without writing it.
    pub fn render(result: &PipelineResult) -> String {
        let mut lines: Vec<String> = vec![
            "# Customer Churn Prediction Report".to_string(),
            String::new(),
            format!("Generated: {}", Local::now().format("%Y-%m-%d %H:%M:%S")),
            String::new(),
        ];

        summary_section(&mut lines, result);
        data_quality_section(&mut lines, result);
        features_section(&mut lines, result);
        comparison_section(&mut lines, result);
        importance_section(&mut lines, result);
        per_model_importance_section(&mut lines, result);

        lines.push("## Insights".to_string());
        lines.push(String::new());
        for (i, insight) in insights(result).iter().enumerate() {
            lines.push(format!("{}. {}", i + 1, insight));
        }
        lines.push(String::new());

        lines.join("\n")
    }
}

impl ReportSink for MarkdownReportSink {
    fn write(&self, result: &PipelineResult) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir).map_err(|e| {
            PipelineError::Report(format!("creating {}: {}", self.output_dir.display(), e))
        })?;

        let report_path = self.output_dir.join(format!("REPORT_{}.md", timestamp()));
        fs::write(&report_path, Self::render(result))?;

        info!("Report saved: {}", report_path.display());
        Ok(report_path)
    }
}

fn summary_section(lines: &mut Vec<String>, result: &PipelineResult) {
    lines.push("## Summary".to_string());
    lines.push(String::new());
    match (&result.best_model, &result.best_model_metrics) {
        (Some(name), Some(metrics)) => {
            lines.push(format!("- **Best model:** {}", name));
            lines.push(format!("- **F1 score:** {:.4}", metrics.f1));
            lines.push(format!("- **AUC:** {:.4}", metrics.auc));
        }
        _ => lines.push("- **Best model:** none".to_string()),
    }
    let trained = result.training_info.iter().filter(|(_, r)| r.success).count();
    lines.push(format!(
        "- **Models trained:** {} of {}",
        trained,
        result.training_info.len()
    ));
    lines.push(format!(
        "- **Train / test rows:** {} / {}",
        result.train_samples, result.test_samples
    ));
    lines.push(format!(
        "- **Total execution time:** {:.2}s",
        result.total_execution_time_secs
    ));
    lines.push(String::new());
}

fn data_quality_section(lines: &mut Vec<String>, result: &PipelineResult) {
    let report = &result.cleaning_report;
    lines.push("## Data Quality".to_string());
    lines.push(String::new());
    lines.push("| Metric | Before | After |".to_string());
    lines.push("|--------|--------|-------|".to_string());
    lines.push(format!(
        "| Rows | {} | {} |",
        report.initial_shape.0, report.final_shape.0
    ));
    lines.push(format!(
        "| Columns | {} | {} |",
        report.initial_shape.1, report.final_shape.1
    ));
    lines.push(format!(
        "| Missing values | {} | {} |",
        report.initial_missing_count, report.final_missing_count
    ));
    lines.push(String::new());
    lines.push(format!(
        "Duplicates removed: {}. Rows removed: {}. Columns removed: {}.",
        report.duplicates_removed, report.rows_removed, report.columns_removed
    ));
    lines.push(String::new());
}

fn features_section(lines: &mut Vec<String>, result: &PipelineResult) {
    let info = &result.feature_info;
    lines.push("## Features".to_string());
    lines.push(String::new());
    lines.push(format!("- **Total:** {}", info.total_features));
    lines.push(format!("- **Numeric:** {}", info.numeric_features));
    lines.push(format!("- **Derived:** {}", info.derived_features));
    lines.push(format!("- **Encoded categorical:** {}", info.categorical_features));
    if !info.derived_names.is_empty() {
        lines.push(String::new());
        lines.push(format!("Derived features: {}", info.derived_names.join(", ")));
    }
    lines.push(String::new());
}

fn comparison_section(lines: &mut Vec<String>, result: &PipelineResult) {
    lines.push("## Model Comparison".to_string());
    lines.push(String::new());
    if result.model_comparison.is_empty() {
        lines.push("No model was evaluated.".to_string());
        lines.push(String::new());
        return;
    }
    lines.push("| Model | Accuracy | Precision | Recall | F1 | AUC |".to_string());
    lines.push("|-------|----------|-----------|--------|----|-----|".to_string());
    for row in &result.model_comparison {
        lines.push(format!(
            "| {} | {:.4} | {:.4} | {:.4} | {:.4} | {:.4} |",
            row.model, row.accuracy, row.precision, row.recall, row.f1, row.auc
        ));
    }
    lines.push(String::new());
}

fn importance_section(lines: &mut Vec<String>, result: &PipelineResult) {
    lines.push(format!("## Top {} Features", TOP_FEATURES));
    lines.push(String::new());
    let top = result.top_features(TOP_FEATURES);
    if top.is_empty() {
        lines.push("No feature importance available.".to_string());
        lines.push(String::new());
        return;
    }
    lines.push("| Rank | Feature | Importance |".to_string());
    lines.push("|------|---------|------------|".to_string());
    for (rank, (feature, importance)) in top.iter().enumerate() {
        lines.push(format!("| {} | {} | {:.4} |", rank + 1, feature, importance));
    }
    lines.push(String::new());
}

fn per_model_importance_section(lines: &mut Vec<String>, result: &PipelineResult) {
    if result.feature_importance_comparison.is_empty() {
        return;
    }
    lines.push("## Feature Importance by Model".to_string());
    lines.push(String::new());
    lines.push("| Model | Feature | Importance |".to_string());
    lines.push("|-------|---------|------------|".to_string());
    for (name, _) in &result.training_info {
        let mut rows: Vec<_> = result.importance_for(name).collect();
        rows.sort_by(|a, b| b.importance.total_cmp(&a.importance));
        for row in rows.into_iter().take(PER_MODEL_FEATURES) {
            lines.push(format!(
                "| {} | {} | {:.4} |",
                row.model, row.feature, row.importance
            ));
        }
    }
    lines.push(String::new());
}

/// Up to five plain-language observations about a run.
pub fn insights(result: &PipelineResult) -> Vec<String> {
    let mut out = Vec::new();

    match (&result.best_model, &result.best_model_metrics) {
        (Some(name), Some(metrics)) => out.push(format!(
            "{} performed best with an F1 score of {:.4} and accuracy of {:.4}.",
            name, metrics.f1, metrics.accuracy
        )),
        _ => out.push("No model could be trained and evaluated; see the warnings.".to_string()),
    }

    if result.model_comparison.len() > 1 {
        let f1s = result.model_comparison.iter().map(|row| row.f1);
        let best = f1s.clone().fold(f64::MIN, f64::max);
        let worst = f1s.fold(f64::MAX, f64::min);
        out.push(format!(
            "F1 scores span {:.4} across {} models ({:.4} to {:.4}).",
            best - worst,
            result.model_comparison.len(),
            worst,
            best
        ));
    }

    if let Some((feature, importance)) = result.feature_importance.first() {
        out.push(format!(
            "`{}` is the strongest churn signal (importance {:.4}).",
            feature, importance
        ));
    }

    let cleaning = &result.cleaning_report;
    let filled = cleaning
        .initial_missing_count
        .saturating_sub(cleaning.final_missing_count);
    if cleaning.duplicates_removed > 0 || filled > 0 {
        out.push(format!(
            "Cleaning filled {} missing values and removed {} duplicate rows.",
            filled, cleaning.duplicates_removed
        ));
    }

    let failed = result.failed_models();
    if !failed.is_empty() {
        out.push(format!(
            "{} model(s) failed to train: {}.",
            failed.len(),
            failed.join(", ")
        ));
    }

    out.truncate(MAX_INSIGHTS);
    out
}
