//! Missing-value imputation: median for numeric columns, mode for categoricals.

use crate::error::{Result, ResultExt};
use crate::schema::DatasetSchema;
use crate::utils::{
    fill_numeric_nulls, fill_string_nulls, is_numeric_dtype, numeric_median, string_mode,
};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Fill value used when a categorical column has no observed values at all.
pub const UNKNOWN_CATEGORY: &str = "Unknown";

/// Fill values learned from a training dataset, reapplied to new rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FillValues {
    pub numeric: Vec<(String, f64)>,
    pub categorical: Vec<(String, String)>,
}

impl FillValues {
    /// Learn medians and modes for every schema column present in `df`.
    ///
    /// Numeric columns read as text are parsed before taking the median; a
    /// column with no parseable value falls back to 0. Columns listed in
    /// `coerce_columns` are left to type coercion, which zero-fills them.
    pub fn fit(df: &DataFrame, schema: &DatasetSchema) -> Self {
        let mut fill = FillValues::default();

        for name in &schema.numeric_columns {
            if schema.coerce_columns.contains(name) {
                continue;
            }
            let Ok(column) = df.column(name) else {
                continue;
            };
            let median = numeric_median(column.as_materialized_series()).unwrap_or_else(|| {
                debug!("No numeric values in '{}', imputing 0", name);
                0.0
            });
            fill.numeric.push((name.clone(), median));
        }

        for name in &schema.categorical_columns {
            let Ok(column) = df.column(name) else {
                continue;
            };
            let mode = string_mode(column.as_materialized_series())
                .unwrap_or_else(|| UNKNOWN_CATEGORY.to_string());
            fill.categorical.push((name.clone(), mode));
        }

        fill
    }

    /// Fill nulls using the learned values. Numeric-typed columns without
    /// nulls are left untouched so their dtype is preserved; text-typed
    /// numeric columns always become Float64.
    pub fn apply(&self, mut df: DataFrame) -> Result<DataFrame> {
        for (name, median) in &self.numeric {
            let Ok(column) = df.column(name) else {
                continue;
            };
            if is_numeric_dtype(column.dtype()) && column.null_count() == 0 {
                continue;
            }
            let series = column.as_materialized_series().clone();
            debug!(
                "Imputing {} nulls in '{}' with median {:.4}",
                series.null_count(),
                name,
                median
            );
            let filled = fill_numeric_nulls(&series, *median)
                .context(format!("Imputing column '{}'", name))?;
            df.replace(name, filled)
                .context(format!("Replacing column '{}'", name))?;
        }

        for (name, mode) in &self.categorical {
            let Ok(column) = df.column(name) else {
                continue;
            };
            if column.null_count() == 0 {
                continue;
            }
            let series = column.as_materialized_series().clone();
            debug!(
                "Imputing {} nulls in '{}' with mode '{}'",
                series.null_count(),
                name,
                mode
            );
            let filled = fill_string_nulls(&series, mode)
                .context(format!("Imputing column '{}'", name))?;
            df.replace(name, filled)
                .context(format!("Replacing column '{}'", name))?;
        }

        Ok(df)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_learns_median_and_mode() {
        let df = df![
            "tenure" => [Some(1.0), None, Some(5.0), Some(3.0)],
            "Contract" => [Some("Two year"), Some("Month-to-month"), None, Some("Two year")],
        ]
        .unwrap();
        let fill = FillValues::fit(&df, &DatasetSchema::default());
        assert_eq!(fill.numeric, vec![("tenure".to_string(), 3.0)]);
        assert_eq!(
            fill.categorical,
            vec![("Contract".to_string(), "Two year".to_string())]
        );
    }

    #[test]
    fn test_apply_fills_all_nulls() {
        let df = df![
            "tenure" => [Some(1.0), None, Some(5.0)],
            "Contract" => [None, Some("One year"), Some("One year")],
        ]
        .unwrap();
        let fill = FillValues::fit(&df, &DatasetSchema::default());
        let filled = fill.apply(df).unwrap();
        assert_eq!(filled.column("tenure").unwrap().null_count(), 0);
        assert_eq!(filled.column("Contract").unwrap().null_count(), 0);
    }

    #[test]
    fn test_coerced_column_is_left_to_coercion() {
        let df = df!["TotalCharges" => [Some("10.5"), None]].unwrap();
        let fill = FillValues::fit(&df, &DatasetSchema::default());
        assert!(fill.numeric.is_empty());
    }

    #[test]
    fn test_text_numeric_column_is_parsed_and_filled() {
        let df = df!["tenure" => [Some("4"), Some("abc"), None, Some("8")]].unwrap();
        let fill = FillValues::fit(&df, &DatasetSchema::default());
        assert_eq!(fill.numeric, vec![("tenure".to_string(), 6.0)]);

        let filled = fill.apply(df).unwrap();
        let column = filled.column("tenure").unwrap();
        assert_eq!(column.dtype(), &DataType::Float64);
        assert_eq!(column.null_count(), 0);
        assert_eq!(
            crate::utils::numeric_values(column.as_materialized_series()).unwrap(),
            vec![Some(4.0), Some(6.0), Some(6.0), Some(8.0)]
        );
    }

    #[test]
    fn test_all_blank_numeric_column_gets_zero() {
        let df = df!["MonthlyCharges" => [None::<&str>, Some(" ")]].unwrap();
        let fill = FillValues::fit(&df, &DatasetSchema::default());
        assert_eq!(fill.numeric, vec![("MonthlyCharges".to_string(), 0.0)]);
        let filled = fill.apply(df).unwrap();
        assert_eq!(filled.column("MonthlyCharges").unwrap().null_count(), 0);
    }

    #[test]
    fn test_all_null_categorical_gets_unknown() {
        let df = df!["gender" => [None::<&str>, None]].unwrap();
        let fill = FillValues::fit(&df, &DatasetSchema::default());
        assert_eq!(fill.categorical[0].1, UNKNOWN_CATEGORY);
    }
}
