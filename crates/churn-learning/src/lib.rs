//! Churn learning: multi-model churn classifier training.
//!
//! This crate drives a batch pipeline over a customer table: it cleans the
//! rows and derives features with [`churn_processing`], splits them into
//! stratified train/test partitions, trains three classifiers in parallel,
//! scores them on the held-out rows and keeps the best one.
//!
//! # Features
//!
//! - **Three classifiers**: logistic regression, random forest and gradient
//!   boosting, implemented natively over `ndarray` ([`classifier`])
//! - **Parallel training**: one rayon worker per model, with per-model
//!   failures (including panics) recorded instead of aborting the run
//!   ([`trainer`])
//! - **Evaluation**: accuracy, weighted precision/recall/F1, ROC AUC and a
//!   confusion matrix per model ([`metrics`], [`evaluator`])
//! - **Progress and cancellation**: per-phase progress updates, a
//!   cancellation token and an optional time limit ([`pipeline`])
//! - **Reports**: JSON and Markdown sinks ([`reporting`])
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use churn_learning::{Pipeline, PipelineConfig};
//! use churn_processing::{FrameSource, generate_churn_dataset};
//!
//! let config = PipelineConfig::builder().seed(7).build()?;
//! let df = generate_churn_dataset(2000, 7)?;
//!
//! let mut pipeline = Pipeline::builder()
//!     .source(FrameSource::new(df, config.schema.clone()))
//!     .config(config)
//!     .on_progress(|u| println!("{:.0}% - {}", u.progress * 100.0, u.message))
//!     .build()?;
//!
//! let result = pipeline.run()?;
//! println!("Best model: {:?}", result.best_model);
//!
//! // The fitted cleaner, deriver and best model stay in the pipeline
//! let churn = pipeline.predict_proba(&new_customers)?;
//! ```
//!
//! # Failure policy
//!
//! A phase failure (unreadable source, missing required column, missing
//! target) ends the run with an error wrapped in the phase name. A single
//! model failing to train or evaluate only adds a warning; the run succeeds
//! as long as one model survives.
//!
//! # Error Handling
//!
//! All fallible operations return [`Result<T>`](error::Result) with
//! [`PipelineError`]. Each variant maps to a stable code through
//! [`PipelineError::error_code`].

pub mod classifier;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod metrics;
pub mod pipeline;
pub mod reporting;
pub mod trainer;
pub mod types;

// Re-export public API
//
// Configuration types
pub use config::{
    BoostingParams, ConfigValidationError, ForestParams, LogisticParams, PipelineConfig,
    PipelineConfigBuilder, ReportFormat,
};
// Error types
pub use error::{PipelineError, Result, ResultExt};
// Classifiers
pub use classifier::{
    Classifier, GradientBoosting, LogisticRegression, RandomForest, default_models,
};
// Training and evaluation
pub use evaluator::{
    EvaluationReport, Evaluator, FeatureImportanceRow, ModelComparison, ModelEvaluator,
    feature_importance_comparison, select_best,
};
pub use metrics::{ClassMetrics, Metrics};
pub use trainer::{
    LabeledSet, ModelTrainer, Split, TrainedModel, Trainer, TrainingRecord, stratified_split,
};
// Pipeline types
pub use pipeline::{
    CancellationToken, ClosureProgressReporter, ModelFactory, Pipeline, PipelineBuilder,
    PipelineStage, ProgressReporter, ProgressUpdate, extract_labels,
};
// Reports
pub use reporting::{JsonReportSink, MarkdownReportSink, ReportSink, sinks_for, write_reports};
// Result types
pub use types::PipelineResult;
