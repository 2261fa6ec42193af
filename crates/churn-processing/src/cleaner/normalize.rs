//! Value normalization, type coercion and de-duplication.

use crate::error::{Result, ResultExt};
use crate::utils::{is_numeric_dtype, numeric_values, parse_numeric_string};
use once_cell::sync::Lazy;
use polars::prelude::*;
use regex::Regex;
use tracing::debug;

/// Matches the "service not applicable" encodings, e.g. `No internet service`.
static NOT_APPLICABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^No .+ service$").expect("Invalid regex: not-applicable service"));

/// Trim surrounding whitespace in the named string columns.
pub(crate) fn trim_columns(mut df: DataFrame, columns: &[&str]) -> Result<DataFrame> {
    for &name in columns {
        let Ok(column) = df.column(name) else {
            continue;
        };
        if column.dtype() != &DataType::String {
            continue;
        }
        let trimmed: Vec<Option<String>> = column
            .as_materialized_series()
            .str()?
            .into_iter()
            .map(|v| v.map(|s| s.trim().to_string()))
            .collect();
        df.replace(name, Series::new(name.into(), trimmed))
            .context(format!("Trimming column '{}'", name))?;
    }
    Ok(df)
}

/// Collapse `No <X> service` to `No` in the named columns.
pub(crate) fn collapse_not_applicable(mut df: DataFrame, columns: &[String]) -> Result<DataFrame> {
    for name in columns {
        let Ok(column) = df.column(name) else {
            continue;
        };
        if column.dtype() != &DataType::String {
            continue;
        }
        let mut collapsed = 0usize;
        let values: Vec<Option<String>> = column
            .as_materialized_series()
            .str()?
            .into_iter()
            .map(|v| {
                v.map(|s| {
                    if NOT_APPLICABLE.is_match(s) {
                        collapsed += 1;
                        "No".to_string()
                    } else {
                        s.to_string()
                    }
                })
            })
            .collect();
        if collapsed > 0 {
            debug!("Collapsed {} not-applicable values in '{}'", collapsed, name);
            df.replace(name, Series::new(name.as_str().into(), values))
                .context(format!("Normalizing column '{}'", name))?;
        }
    }
    Ok(df)
}

/// Coerce a column to Float64; nulls and unparseable text become 0.
pub(crate) fn coerce_to_float(mut df: DataFrame, name: &str) -> Result<DataFrame> {
    let Ok(column) = df.column(name) else {
        return Ok(df);
    };
    let series = column.as_materialized_series();

    let values: Vec<f64> = if is_numeric_dtype(series.dtype()) {
        numeric_values(series)?
            .into_iter()
            .map(|v| v.unwrap_or(0.0))
            .collect()
    } else {
        let cast = series.cast(&DataType::String)?;
        cast.str()?
            .into_iter()
            .map(|v| v.and_then(parse_numeric_string).unwrap_or(0.0))
            .collect()
    };

    df.replace(name, Series::new(name.into(), values))
        .context(format!("Coercing column '{}'", name))?;
    Ok(df)
}

/// Coerce a 0/1 indicator column to Int64; anything unparseable becomes 0.
pub(crate) fn coerce_to_flag(mut df: DataFrame, name: &str) -> Result<DataFrame> {
    let Ok(column) = df.column(name) else {
        return Ok(df);
    };
    let series = column.as_materialized_series();
    if series.dtype() == &DataType::Int64 && series.null_count() == 0 {
        return Ok(df);
    }

    let values: Vec<i64> = match series.dtype() {
        DataType::Boolean => series
            .bool()?
            .into_iter()
            .map(|v| i64::from(v.unwrap_or(false)))
            .collect(),
        dtype if is_numeric_dtype(dtype) => numeric_values(series)?
            .into_iter()
            .map(|v| v.map(|f| f as i64).unwrap_or(0))
            .collect(),
        _ => series
            .cast(&DataType::String)?
            .str()?
            .into_iter()
            .map(|v| v.and_then(parse_numeric_string).map(|f| f as i64).unwrap_or(0))
            .collect(),
    };

    df.replace(name, Series::new(name.into(), values))
        .context(format!("Coercing column '{}'", name))?;
    Ok(df)
}

/// Remove exact duplicate rows, keeping the first occurrence in row order.
///
/// Returns the deduplicated frame and the number of rows removed.
pub(crate) fn drop_duplicates(df: DataFrame) -> Result<(DataFrame, usize)> {
    let before = df.height();
    let deduped = df
        .unique_stable(None, UniqueKeepStrategy::First, None)
        .context("Removing duplicate rows")?;
    let removed = before - deduped.height();
    Ok((deduped, removed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::string_values;

    #[test]
    fn test_trim_columns() {
        let df = df!["Contract" => [" Two year ", "One year"]].unwrap();
        let df = trim_columns(df, &["Contract", "absent"]).unwrap();
        let values = string_values(df.column("Contract").unwrap().as_materialized_series())
            .unwrap();
        assert_eq!(values[0].as_deref(), Some("Two year"));
    }

    #[test]
    fn test_collapse_not_applicable() {
        let df = df![
            "OnlineBackup" => ["No internet service", "Yes", "No"],
            "MultipleLines" => ["No phone service", "No", "Yes"],
        ]
        .unwrap();
        let columns = vec!["OnlineBackup".to_string(), "MultipleLines".to_string()];
        let df = collapse_not_applicable(df, &columns).unwrap();
        for name in ["OnlineBackup", "MultipleLines"] {
            let values =
                string_values(df.column(name).unwrap().as_materialized_series()).unwrap();
            assert_eq!(values[0].as_deref(), Some("No"));
        }
    }

    #[test]
    fn test_coerce_to_float_maps_garbage_to_zero() {
        let df = df!["TotalCharges" => [Some("29.85"), Some(" "), None, Some("abc")]].unwrap();
        let df = coerce_to_float(df, "TotalCharges").unwrap();
        let values = numeric_values(df.column("TotalCharges").unwrap().as_materialized_series())
            .unwrap();
        assert_eq!(values, vec![Some(29.85), Some(0.0), Some(0.0), Some(0.0)]);
    }

    #[test]
    fn test_coerce_to_flag() {
        let df = df!["SeniorCitizen" => [Some("1"), Some("0"), None]].unwrap();
        let df = coerce_to_flag(df, "SeniorCitizen").unwrap();
        let column = df.column("SeniorCitizen").unwrap();
        assert_eq!(column.dtype(), &DataType::Int64);
        assert_eq!(column.null_count(), 0);
    }

    #[test]
    fn test_drop_duplicates_keeps_first() {
        let df = df![
            "id" => ["a", "b", "a"],
            "v" => [1, 2, 1],
        ]
        .unwrap();
        let (df, removed) = drop_duplicates(df).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(df.height(), 2);
    }

    #[test]
    fn test_drop_duplicates_compares_whole_values() {
        let df = df![
            "customerID" => ["a\u{1f}b", "a"],
            "gender" => ["c", "b\u{1f}c"],
            "Churn" => ["No", "No"],
        ]
        .unwrap();
        let (df, removed) = drop_duplicates(df).unwrap();
        assert_eq!(removed, 0);
        assert_eq!(df.height(), 2);
    }

    #[test]
    fn test_drop_duplicates_keeps_row_order() {
        let df = df![
            "id" => ["c", "a", "c", "b", "a"],
            "v" => [Some(3), None, Some(3), Some(2), None],
        ]
        .unwrap();
        let (df, removed) = drop_duplicates(df).unwrap();
        assert_eq!(removed, 2);
        let ids = string_values(df.column("id").unwrap().as_materialized_series()).unwrap();
        assert_eq!(
            ids,
            vec![Some("c".to_string()), Some("a".to_string()), Some("b".to_string())]
        );
    }
}
