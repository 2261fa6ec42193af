//! Error types for dataset loading, cleaning and feature derivation.
//!
//! Errors carry a stable code so callers (the learning pipeline, the CLI,
//! report sinks) can classify failures without matching on messages.

use serde::Serialize;
use serde::ser::SerializeStruct;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the processing crate.
#[derive(Error, Debug)]
pub enum ProcessingError {
    /// The row source could not be found on disk.
    #[error("Data source not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    /// The file extension is not a supported tabular format.
    #[error("Unsupported data source format: '{0}'")]
    UnsupportedFormat(String),

    /// Required columns are absent from the dataset.
    #[error("Missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    /// Column was not found in the dataset.
    #[error("Column '{0}' not found in dataset")]
    ColumnNotFound(String),

    /// The dataset has a structural problem (e.g. mismatched lengths).
    #[error("Invalid dataset: {0}")]
    InvalidData(String),

    /// A transform was applied before it was fitted.
    #[error("{0} has not been fitted")]
    NotFitted(&'static str),

    /// A categorical value was not seen while fitting the label map.
    #[error("Unknown category '{value}' in column '{column}'")]
    UnknownCategory { column: String, value: String },

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// Error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<ProcessingError>,
    },
}

impl ProcessingError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        ProcessingError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Stable error code for programmatic handling.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::SourceNotFound(_) => "SOURCE_NOT_FOUND",
            Self::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
            Self::MissingColumns(_) => "MISSING_COLUMNS",
            Self::ColumnNotFound(_) => "COLUMN_NOT_FOUND",
            Self::InvalidData(_) => "INVALID_DATA",
            Self::NotFitted(_) => "NOT_FITTED",
            Self::UnknownCategory { .. } => "UNKNOWN_CATEGORY",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// Whether this error describes a problem with the input data itself
    /// (as opposed to an IO or library failure).
    pub fn is_data_error(&self) -> bool {
        match self {
            Self::SourceNotFound(_)
            | Self::UnsupportedFormat(_)
            | Self::MissingColumns(_)
            | Self::ColumnNotFound(_)
            | Self::InvalidData(_)
            | Self::UnknownCategory { .. } => true,
            Self::WithContext { source, .. } => source.is_data_error(),
            _ => false,
        }
    }
}

impl Serialize for ProcessingError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("ProcessingError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for processing operations.
pub type Result<T> = std::result::Result<T, ProcessingError>;

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

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| ProcessingError::Polars(e).with_context(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        assert_eq!(
            ProcessingError::ColumnNotFound("Churn".to_string()).error_code(),
            "COLUMN_NOT_FOUND"
        );
        assert_eq!(
            ProcessingError::NotFitted("StandardScaler").error_code(),
            "NOT_FITTED"
        );
    }

    #[test]
    fn test_missing_columns_message_lists_all() {
        let error =
            ProcessingError::MissingColumns(vec!["Churn".to_string(), "tenure".to_string()]);
        assert_eq!(error.to_string(), "Missing required columns: Churn, tenure");
    }

    #[test]
    fn test_with_context_preserves_code() {
        let error = ProcessingError::ColumnNotFound("Contract".to_string())
            .with_context("While encoding");
        assert!(error.to_string().contains("While encoding"));
        assert_eq!(error.error_code(), "COLUMN_NOT_FOUND");
        assert!(error.is_data_error());
    }

    #[test]
    fn test_error_serialization() {
        let error = ProcessingError::UnknownCategory {
            column: "Contract".to_string(),
            value: "Weekly".to_string(),
        };
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("UNKNOWN_CATEGORY"));
        assert!(json.contains("Weekly"));
    }
}
