//! Shared helpers for working with Polars columns.

use polars::prelude::*;
use std::collections::HashMap;

// =============================================================================
// Data Type Utilities
// =============================================================================

/// Check if a DataType is numeric (integer or float).
#[inline]
pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

/// Check if a DataType can be handed to a model as-is.
#[inline]
pub fn is_model_ready_dtype(dtype: &DataType) -> bool {
    is_numeric_dtype(dtype) || matches!(dtype, DataType::Boolean)
}

// =============================================================================
// String Parsing Utilities
// =============================================================================

/// Characters commonly used in numeric formatting that should be stripped.
pub const NUMERIC_FORMAT_CHARS: [char; 6] = [',', '$', '%', '€', '£', ' '];

/// Clean a string for numeric parsing by removing formatting characters.
pub fn clean_numeric_string(s: &str) -> String {
    let mut result = s.trim().to_string();
    for c in NUMERIC_FORMAT_CHARS {
        result = result.replace(c, "");
    }
    result
}

/// Try to parse a string as a numeric value (f64).
///
/// Handles currency symbols, percentages and thousands separators. Blank
/// strings do not parse.
pub fn parse_numeric_string(s: &str) -> Option<f64> {
    let cleaned = clean_numeric_string(s);
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

// =============================================================================
// Series Accessors
// =============================================================================

/// Values of a Series as optional floats (nulls and unparseable casts are `None`).
pub fn numeric_values(series: &Series) -> PolarsResult<Vec<Option<f64>>> {
    let cast = series.cast(&DataType::Float64)?;
    Ok(cast.f64()?.into_iter().collect())
}

/// Values of a Series as optional floats, parsing text with
/// [`parse_numeric_string`] when the column is not numeric-typed.
pub fn parsed_numeric_values(series: &Series) -> PolarsResult<Vec<Option<f64>>> {
    if is_numeric_dtype(series.dtype()) || series.dtype() == &DataType::Boolean {
        return numeric_values(series);
    }
    let cast = series.cast(&DataType::String)?;
    Ok(cast
        .str()?
        .into_iter()
        .map(|v| v.and_then(parse_numeric_string))
        .collect())
}

/// Values of a Series as optional strings.
pub fn string_values(series: &Series) -> PolarsResult<Vec<Option<String>>> {
    let cast = series.cast(&DataType::String)?;
    Ok(cast
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect())
}

/// Look up a column by name and return it as a materialized Series.
pub fn column_series(df: &DataFrame, name: &str) -> Option<Series> {
    df.column(name)
        .ok()
        .map(|c| c.as_materialized_series().clone())
}

/// Total number of nulls across all columns.
pub fn total_null_count(df: &DataFrame) -> usize {
    df.get_columns().iter().map(|c| c.null_count()).sum()
}

// =============================================================================
// Series Statistics Utilities
// =============================================================================

/// Calculate the mode (most frequent value) of a Series rendered as strings.
///
/// Ties are broken by the value that appears first in the column.
pub fn string_mode(series: &Series) -> Option<String> {
    let values = string_values(series).ok()?;

    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (position, value) in values.iter().flatten().enumerate() {
        let entry = counts.entry(value.as_str()).or_insert((0, position));
        entry.0 += 1;
    }

    counts
        .into_iter()
        .max_by(|(_, (count_a, first_a)), (_, (count_b, first_b))| {
            count_a.cmp(count_b).then(first_b.cmp(first_a))
        })
        .map(|(value, _)| value.to_string())
}

/// Median of the values that parse as numbers. `None` when nothing parses.
pub fn numeric_median(series: &Series) -> Option<f64> {
    let values = parsed_numeric_values(series).ok()?;
    Series::new(series.name().clone(), values).median()
}

// =============================================================================
// Null Filling
// =============================================================================

/// Fill null or unparseable values, producing a Float64 Series.
pub fn fill_numeric_nulls(series: &Series, fill_value: f64) -> PolarsResult<Series> {
    let filled: Vec<f64> = parsed_numeric_values(series)?
        .into_iter()
        .map(|v| v.unwrap_or(fill_value))
        .collect();
    Ok(Series::new(series.name().clone(), filled))
}

/// Fill null values in a string Series with a specific value.
pub fn fill_string_nulls(series: &Series, fill_value: &str) -> PolarsResult<Series> {
    let filled: Vec<String> = string_values(series)?
        .into_iter()
        .map(|v| v.unwrap_or_else(|| fill_value.to_string()))
        .collect();
    Ok(Series::new(series.name().clone(), filled))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_numeric_dtype() {
        assert!(is_numeric_dtype(&DataType::Int64));
        assert!(is_numeric_dtype(&DataType::Float64));
        assert!(!is_numeric_dtype(&DataType::String));
        assert!(!is_numeric_dtype(&DataType::Boolean));
        assert!(is_model_ready_dtype(&DataType::Boolean));
    }

    #[test]
    fn test_parse_numeric_string() {
        assert_eq!(parse_numeric_string("29.85"), Some(29.85));
        assert_eq!(parse_numeric_string("$1,234.56"), Some(1234.56));
        assert_eq!(parse_numeric_string(" "), None);
        assert_eq!(parse_numeric_string(""), None);
        assert_eq!(parse_numeric_string("n/a"), None);
    }

    #[test]
    fn test_string_mode_breaks_ties_by_first_value() {
        let series = Series::new("test".into(), &["b", "a", "a", "b", "c"]);
        assert_eq!(string_mode(&series), Some("b".to_string()));

        let series = Series::new("test".into(), &[None, Some("x"), Some("y"), Some("y")]);
        assert_eq!(string_mode(&series), Some("y".to_string()));
    }

    #[test]
    fn test_string_mode_all_null() {
        let series = Series::new("test".into(), &[None::<&str>, None]);
        assert_eq!(string_mode(&series), None);
    }

    #[test]
    fn test_fill_numeric_nulls() {
        let series = Series::new("test".into(), &[Some(1.0), None, Some(3.0)]);
        let filled = fill_numeric_nulls(&series, 2.0).unwrap();
        assert_eq!(filled.null_count(), 0);
        assert_eq!(filled.get(1).unwrap().try_extract::<f64>().unwrap(), 2.0);
    }

    #[test]
    fn test_numeric_median_parses_text() {
        let series = Series::new("tenure".into(), &[Some("12"), Some(" "), None, Some("$30")]);
        assert_eq!(numeric_median(&series), Some(21.0));

        let blank = Series::new("tenure".into(), &[None::<&str>, Some("")]);
        assert_eq!(numeric_median(&blank), None);
    }

    #[test]
    fn test_fill_string_nulls() {
        let series = Series::new("test".into(), &[Some("Yes"), None]);
        let filled = fill_string_nulls(&series, "No").unwrap();
        let values = string_values(&filled).unwrap();
        assert_eq!(values, vec![Some("Yes".to_string()), Some("No".to_string())]);
    }
}
