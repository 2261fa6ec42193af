//! Data cleaning for raw churn tables.
//!
//! The cleaning policy runs in a fixed order because each step relies on the
//! previous one:
//! 1. Missing-value imputation (median for numeric, mode for categorical)
//! 2. Whitespace trimming and "No X service" collapsing
//! 3. Type coercion of text-typed numeric and flag columns
//! 4. Exact duplicate removal
//!
//! None of these steps fail on absent columns; a column named by the schema
//! but missing from the dataset is skipped.

mod imputation;
mod normalize;

pub use imputation::{FillValues, UNKNOWN_CATEGORY};

use crate::error::{ProcessingError, Result};
use crate::schema::DatasetSchema;
use crate::utils::total_null_count;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{Span, debug, info, info_span};

/// Before/after summary of one cleaning run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleaningReport {
    /// (rows, columns) before cleaning.
    pub initial_shape: (usize, usize),
    /// (rows, columns) after cleaning.
    pub final_shape: (usize, usize),
    pub initial_missing_count: usize,
    pub final_missing_count: usize,
    pub rows_removed: usize,
    pub columns_removed: usize,
    pub duplicates_removed: usize,
}

/// Normalizes raw values into a dataset the feature deriver can consume.
pub trait Cleaner: Send {
    /// Clean a dataset, learning fill values from it.
    fn clean(&mut self, df: DataFrame) -> Result<DataFrame>;

    /// Summary of the last [`clean`](Self::clean) call, if any.
    fn report(&self) -> Option<&CleaningReport>;

    /// Clean new rows with the fill values learned by the last `clean`.
    /// Rows are never removed so the output stays aligned with the input.
    fn apply(&self, df: DataFrame) -> Result<DataFrame>;
}

/// Cleaner for the telco churn layout, driven by a [`DatasetSchema`].
pub struct TelcoCleaner {
    schema: DatasetSchema,
    span: Span,
    fill_values: Option<FillValues>,
    report: Option<CleaningReport>,
}

impl TelcoCleaner {
    pub fn new(schema: DatasetSchema) -> Self {
        Self {
            schema,
            span: info_span!("cleaner"),
            fill_values: None,
            report: None,
        }
    }

    /// Log under the given span instead of the default `cleaner` span.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn fill_values(&self) -> Option<&FillValues> {
        self.fill_values.as_ref()
    }

    /// Steps 2 and 3, shared by `clean` and `apply`.
    fn normalize_and_coerce(&self, df: DataFrame) -> Result<DataFrame> {
        let df = normalize::trim_columns(df, &self.schema.trimmed_columns())?;
        let mut df =
            normalize::collapse_not_applicable(df, &self.schema.service_dependent_columns)?;

        for name in &self.schema.coerce_columns {
            df = normalize::coerce_to_float(df, name)?;
        }
        for name in &self.schema.flag_columns {
            df = normalize::coerce_to_flag(df, name)?;
        }
        Ok(df)
    }
}

impl Cleaner for TelcoCleaner {
    fn clean(&mut self, df: DataFrame) -> Result<DataFrame> {
        let _guard = self.span.clone().entered();

        let initial_shape = df.shape();
        let initial_missing_count = total_null_count(&df);
        info!(
            "Cleaning {} rows x {} columns ({} missing values)",
            initial_shape.0, initial_shape.1, initial_missing_count
        );

        let fill_values = FillValues::fit(&df, &self.schema);
        let df = fill_values.apply(df)?;
        let df = self.normalize_and_coerce(df)?;
        let (df, duplicates_removed) = normalize::drop_duplicates(df)?;
        if duplicates_removed > 0 {
            debug!("Removed {} duplicate rows", duplicates_removed);
        }

        let final_shape = df.shape();
        let report = CleaningReport {
            initial_shape,
            final_shape,
            initial_missing_count,
            final_missing_count: total_null_count(&df),
            rows_removed: initial_shape.0.saturating_sub(final_shape.0),
            columns_removed: initial_shape.1.saturating_sub(final_shape.1),
            duplicates_removed,
        };
        info!(
            "Cleaning complete: {:?} -> {:?}, missing {} -> {}",
            report.initial_shape,
            report.final_shape,
            report.initial_missing_count,
            report.final_missing_count
        );

        self.fill_values = Some(fill_values);
        self.report = Some(report);
        Ok(df)
    }

    fn report(&self) -> Option<&CleaningReport> {
        self.report.as_ref()
    }

    fn apply(&self, df: DataFrame) -> Result<DataFrame> {
        let _guard = self.span.clone().entered();
        let fill_values = self
            .fill_values
            .as_ref()
            .ok_or(ProcessingError::NotFitted("TelcoCleaner"))?;
        let df = fill_values.apply(df)?;
        self.normalize_and_coerce(df)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{numeric_values, string_values};
    use pretty_assertions::assert_eq;

    fn raw() -> DataFrame {
        df![
            "customerID" => ["1", "2", "3", "3", "4"],
            "SeniorCitizen" => [0, 1, 0, 0, 1],
            "tenure" => [Some(1.0), None, Some(10.0), Some(10.0), Some(5.0)],
            "MonthlyCharges" => [20.0, 70.0, 50.0, 50.0, 90.0],
            "TotalCharges" => [Some("20"), Some(" "), Some("500"), Some("500"), None],
            "Contract" => [Some(" Month-to-month"), Some("Two year"), None, None, Some("Two year")],
            "OnlineSecurity" => ["No internet service", "Yes", "No", "No", "Yes"],
            "Churn" => ["Yes ", "No", "No", "No", "Yes"],
        ]
        .unwrap()
    }

    #[test]
    fn test_clean_applies_full_policy() {
        let mut cleaner = TelcoCleaner::new(DatasetSchema::default());
        let df = cleaner.clean(raw()).unwrap();

        assert_eq!(df.height(), 4);
        let report = cleaner.report().unwrap();
        assert_eq!(report.duplicates_removed, 1);
        assert_eq!(report.rows_removed, 1);
        assert_eq!(report.columns_removed, 0);
        assert_eq!(report.initial_missing_count, 4);
        assert_eq!(report.final_missing_count, 0);

        let total = numeric_values(df.column("TotalCharges").unwrap().as_materialized_series())
            .unwrap();
        assert_eq!(total, vec![Some(20.0), Some(0.0), Some(500.0), Some(0.0)]);

        let contract =
            string_values(df.column("Contract").unwrap().as_materialized_series()).unwrap();
        assert_eq!(contract[0].as_deref(), Some("Month-to-month"));
        assert_eq!(contract[2].as_deref(), Some("Two year"));

        let security =
            string_values(df.column("OnlineSecurity").unwrap().as_materialized_series())
                .unwrap();
        assert_eq!(security[0].as_deref(), Some("No"));

        let churn = string_values(df.column("Churn").unwrap().as_materialized_series()).unwrap();
        assert_eq!(churn[0].as_deref(), Some("Yes"));
    }

    #[test]
    fn test_clean_is_idempotent() {
        let mut cleaner = TelcoCleaner::new(DatasetSchema::default());
        let once = cleaner.clean(raw()).unwrap();
        let twice = cleaner.clean(once.clone()).unwrap();
        assert!(once.equals_missing(&twice));
        assert_eq!(cleaner.report().unwrap().duplicates_removed, 0);
    }

    #[test]
    fn test_clean_skips_absent_columns() {
        let df = df!["customerID" => ["1", "2"], "Churn" => ["No", "Yes"]].unwrap();
        let mut cleaner = TelcoCleaner::new(DatasetSchema::default());
        let cleaned = cleaner.clean(df).unwrap();
        assert_eq!(cleaned.shape(), (2, 2));
    }

    #[test]
    fn test_apply_requires_clean() {
        let cleaner = TelcoCleaner::new(DatasetSchema::default());
        let err = cleaner.apply(raw()).unwrap_err();
        assert_eq!(err.error_code(), "NOT_FITTED");
    }

    #[test]
    fn test_apply_reuses_training_fill_values() {
        let mut cleaner = TelcoCleaner::new(DatasetSchema::default());
        cleaner.clean(raw()).unwrap();

        let new_rows = df![
            "tenure" => [None::<f64>],
            "Contract" => [None::<&str>],
        ]
        .unwrap();
        let applied = cleaner.apply(new_rows).unwrap();
        let tenure =
            numeric_values(applied.column("tenure").unwrap().as_materialized_series()).unwrap();
        // Median of the training tenure values [1, 10, 10, 5]
        assert_eq!(tenure, vec![Some(7.5)]);
        let contract =
            string_values(applied.column("Contract").unwrap().as_materialized_series()).unwrap();
        assert_eq!(contract[0].as_deref(), Some("Two year"));
    }
}
