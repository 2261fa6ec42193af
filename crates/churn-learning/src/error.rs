//! Error types for the churn training pipeline.
//!
//! The taxonomy follows the pipeline's failure policy:
//!
//! - [`PipelineError::Data`]: missing or invalid source, schema or target column
//! - [`PipelineError::InvalidInput`]: empty or mismatched train/eval tensors
//! - [`PipelineError::Training`]: a classifier failed to fit
//! - [`PipelineError::Evaluation`]: prediction failed while scoring a model
//!
//! Phase-level errors are wrapped with the phase name through
//! [`PipelineError::with_context`], so the message alone identifies where the
//! run stopped.

use churn_processing::ProcessingError;
use serde::Serialize;
use serde::ser::SerializeStruct;
use thiserror::Error;

/// The main error type for the training pipeline.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum PipelineError {
    /// The dataset is unusable: missing source, missing required or target column.
    #[error("Data error: {0}")]
    Data(String),

    /// Empty or mismatched feature matrix / label vector.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A classifier failed to fit.
    #[error("Training of '{model}' failed: {reason}")]
    Training { model: String, reason: String },

    /// Prediction failed while scoring a model.
    #[error("Evaluation of '{model}' failed: {reason}")]
    Evaluation { model: String, reason: String },

    /// Predict was called on a model that has not been trained.
    #[error("Model '{0}' has not been trained")]
    ModelNotTrained(String),

    /// No model survived training and evaluation.
    #[error("No trained model is available")]
    NoBestModel,

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Cleaning or feature derivation failed.
    #[error(transparent)]
    Processing(#[from] ProcessingError),

    /// A report sink failed to persist the result.
    #[error("Failed to write report: {0}")]
    Report(String),

    /// Run was cancelled through its cancellation token.
    #[error("Pipeline cancelled")]
    Cancelled,

    /// Run exceeded its configured maximum duration.
    #[error("Pipeline exceeded its time limit of {limit_secs:.1}s ({elapsed_secs:.1}s elapsed)")]
    Timeout { elapsed_secs: f64, limit_secs: f64 },

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// Error with context (typically the phase name).
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        PipelineError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Stable error code for programmatic handling.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Data(_) => "DATA_ERROR",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::Training { .. } => "TRAINING_ERROR",
            Self::Evaluation { .. } => "EVALUATION_ERROR",
            Self::ModelNotTrained(_) => "MODEL_NOT_TRAINED",
            Self::NoBestModel => "NO_BEST_MODEL",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::Processing(e) if e.is_data_error() => "DATA_ERROR",
            Self::Processing(e) => e.error_code(),
            Self::Report(_) => "REPORT_ERROR",
            Self::Cancelled => "CANCELLED",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Io(_) => "IO_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// Check if this error represents a cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::WithContext { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// Check if this error is recoverable by retrying with different input
    /// or settings.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Cancelled | Self::Timeout { .. } | Self::InvalidConfig(_) => true,
            Self::WithContext { source, .. } => source.is_recoverable(),
            _ => false,
        }
    }

    /// The innermost error, skipping context wrappers.
    pub fn root(&self) -> &PipelineError {
        match self {
            Self::WithContext { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<crate::config::ConfigValidationError> for PipelineError {
    fn from(err: crate::config::ConfigValidationError) -> Self {
        PipelineError::InvalidConfig(err.to_string())
    }
}

impl Serialize for PipelineError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("PipelineError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, ProcessingError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| PipelineError::Processing(e).with_context(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_error_codes_follow_taxonomy() {
        assert_eq!(PipelineError::Data("x".into()).error_code(), "DATA_ERROR");
        assert_eq!(
            PipelineError::InvalidInput("empty".into()).error_code(),
            "INVALID_INPUT"
        );
        let training = PipelineError::Training {
            model: "RandomForest".into(),
            reason: "boom".into(),
        };
        assert_eq!(training.error_code(), "TRAINING_ERROR");
        assert!(training.to_string().contains("RandomForest"));
    }

    #[test]
    fn test_processing_data_errors_map_to_data_error() {
        let err: PipelineError =
            ProcessingError::SourceNotFound(PathBuf::from("missing.csv")).into();
        assert_eq!(err.error_code(), "DATA_ERROR");

        let err: PipelineError = ProcessingError::NotFitted("StandardScaler").into();
        assert_eq!(err.error_code(), "NOT_FITTED");
    }

    #[test]
    fn test_context_carries_phase_name() {
        let err = PipelineError::Data("target column 'Churn' not found".into())
            .with_context("Phase split");
        assert_eq!(
            err.to_string(),
            "Phase split: Data error: target column 'Churn' not found"
        );
        assert_eq!(err.error_code(), "DATA_ERROR");
        assert!(matches!(err.root(), PipelineError::Data(_)));
    }

    #[test]
    fn test_cancellation_through_context() {
        let err = PipelineError::Cancelled.with_context("Phase train");
        assert!(err.is_cancelled());
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_error_serialization() {
        let err = PipelineError::Evaluation {
            model: "LogisticRegression".into(),
            reason: "feature mismatch".into(),
        };
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("EVALUATION_ERROR"));
        assert!(json.contains("feature mismatch"));
    }
}
