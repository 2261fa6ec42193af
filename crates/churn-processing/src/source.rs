//! Row sources: where the raw customer table comes from.
//!
//! A [`RowSource`] loads a [`DataFrame`] and checks that it carries the
//! columns the schema requires. Validation never fails loudly; it logs a
//! diagnostic per problem and returns `false`.

use crate::error::{ProcessingError, Result, ResultExt};
use crate::schema::DatasetSchema;
use crate::utils::{is_numeric_dtype, parse_numeric_string, string_values};
use polars::io::csv::read::CsvReadOptions;
use polars::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Something that yields a raw churn dataset.
pub trait RowSource: Send {
    /// Load the dataset.
    fn load(&mut self) -> Result<DataFrame>;

    /// Check schema and required-column presence. Emits diagnostics and
    /// returns `false` on failure; never errors.
    fn validate(&self, df: &DataFrame) -> bool;

    /// Human-readable description of where the rows come from.
    fn describe(&self) -> String;
}

/// Loads a CSV or Parquet file from disk.
#[derive(Debug, Clone)]
pub struct FileRowSource {
    path: PathBuf,
    schema: DatasetSchema,
}

impl FileRowSource {
    pub fn new(path: impl Into<PathBuf>, schema: DatasetSchema) -> Self {
        Self {
            path: path.into(),
            schema,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_csv(&self) -> Result<DataFrame> {
        CsvReadOptions::default()
            .with_infer_schema_length(Some(100))
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(self.path.clone()))
            .context(format!("Opening {}", self.path.display()))?
            .finish()
            .context(format!("Reading CSV {}", self.path.display()))
    }

    fn read_parquet(&self) -> Result<DataFrame> {
        let file = File::open(&self.path)?;
        ParquetReader::new(file)
            .finish()
            .context(format!("Reading Parquet {}", self.path.display()))
    }
}

impl RowSource for FileRowSource {
    fn load(&mut self) -> Result<DataFrame> {
        if !self.path.exists() {
            return Err(ProcessingError::SourceNotFound(self.path.clone()));
        }

        let extension = self
            .path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        let df = match extension.as_str() {
            "csv" | "txt" => self.read_csv()?,
            "parquet" | "pq" => self.read_parquet()?,
            other => return Err(ProcessingError::UnsupportedFormat(other.to_string())),
        };

        info!(
            "Loaded {} rows x {} columns from {}",
            df.height(),
            df.width(),
            self.path.display()
        );
        Ok(df)
    }

    fn validate(&self, df: &DataFrame) -> bool {
        validate_frame(&self.schema, df)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Serves an in-memory DataFrame. Each `load` hands out a clone.
#[derive(Debug, Clone)]
pub struct FrameSource {
    df: DataFrame,
    schema: DatasetSchema,
}

impl FrameSource {
    pub fn new(df: DataFrame, schema: DatasetSchema) -> Self {
        Self { df, schema }
    }
}

impl RowSource for FrameSource {
    fn load(&mut self) -> Result<DataFrame> {
        Ok(self.df.clone())
    }

    fn validate(&self, df: &DataFrame) -> bool {
        validate_frame(&self.schema, df)
    }

    fn describe(&self) -> String {
        format!("in-memory frame ({} rows)", self.df.height())
    }
}

/// Shared validation: required columns are fatal, value problems are warnings.
pub fn validate_frame(schema: &DatasetSchema, df: &DataFrame) -> bool {
    let names: Vec<&str> = df.get_column_names().iter().map(|n| n.as_str()).collect();
    let missing = schema.missing_required(names.iter().copied());

    if !missing.is_empty() {
        for column in &missing {
            warn!("Required column '{}' is missing", column);
        }
        return false;
    }

    if let Ok(target) = df.column(&schema.target_column)
        && let Ok(values) = string_values(target.as_materialized_series())
    {
        let unexpected = values
            .iter()
            .flatten()
            .filter(|v| !matches!(v.trim(), "Yes" | "No"))
            .count();
        if unexpected > 0 {
            warn!(
                "Target column '{}' has {} values other than Yes/No",
                schema.target_column, unexpected
            );
        }
    }

    for name in &schema.numeric_columns {
        let Ok(column) = df.column(name) else {
            continue;
        };
        if is_numeric_dtype(column.dtype()) {
            continue;
        }
        let Ok(values) = string_values(column.as_materialized_series()) else {
            continue;
        };
        let unparseable = values
            .iter()
            .flatten()
            .filter(|v| parse_numeric_string(v).is_none())
            .count();
        if unparseable > 0 {
            warn!(
                "Numeric column '{}' has {} values that do not parse as numbers",
                name, unparseable
            );
        }
    }

    debug!("Dataset passed validation");
    true
}
