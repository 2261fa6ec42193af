//! Per-column label maps for categorical encoding.

use crate::error::{ProcessingError, Result};
use crate::utils::string_values;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Maps the distinct values of one categorical column to integer codes.
///
/// Codes are the rank of the value in sorted order, so refitting on a
/// different value set yields different codes. Fit once, then reuse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelMap {
    column: String,
    classes: Vec<String>,
}

impl LabelMap {
    /// Learn the sorted set of distinct values in `series`. Nulls are ignored.
    pub fn fit(series: &Series) -> Result<Self> {
        let classes: BTreeSet<String> = string_values(series)?.into_iter().flatten().collect();
        Ok(Self {
            column: series.name().to_string(),
            classes: classes.into_iter().collect(),
        })
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Name of the encoded output column.
    pub fn encoded_name(&self) -> String {
        format!("{}_encoded", self.column)
    }

    pub fn encode(&self, value: &str) -> Result<i64> {
        self.classes
            .binary_search_by(|c| c.as_str().cmp(value))
            .map(|idx| idx as i64)
            .map_err(|_| ProcessingError::UnknownCategory {
                column: self.column.clone(),
                value: value.to_string(),
            })
    }

    pub fn decode(&self, code: i64) -> Option<&str> {
        usize::try_from(code)
            .ok()
            .and_then(|idx| self.classes.get(idx))
            .map(String::as_str)
    }

    /// Encode a whole column into an Int64 series named `{column}_encoded`.
    pub fn encode_series(&self, series: &Series) -> Result<Series> {
        let codes = string_values(series)?
            .into_iter()
            .map(|v| match v {
                Some(value) => self.encode(&value).map(Some),
                None => Ok(None),
            })
            .collect::<Result<Vec<Option<i64>>>>()?;
        Ok(Series::new(self.encoded_name().into(), codes))
    }

    /// Map codes back to their original string values.
    pub fn decode_all(&self, codes: &[i64]) -> Result<Vec<String>> {
        codes
            .iter()
            .map(|&code| {
                self.decode(code)
                    .map(str::to_string)
                    .ok_or_else(|| ProcessingError::UnknownCategory {
                        column: self.column.clone(),
                        value: code.to_string(),
                    })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_codes_follow_sorted_order() {
        let series = Series::new(
            "Contract".into(),
            &["Two year", "Month-to-month", "One year", "Month-to-month"],
        );
        let map = LabelMap::fit(&series).unwrap();
        assert_eq!(map.classes(), &["Month-to-month", "One year", "Two year"]);
        assert_eq!(map.encode("One year").unwrap(), 1);
        assert_eq!(map.encoded_name(), "Contract_encoded");
    }

    #[test]
    fn test_round_trip_recovers_original_values() {
        let original = vec!["DSL", "Fiber optic", "No", "DSL", "Fiber optic"];
        let series = Series::new("InternetService".into(), &original);
        let map = LabelMap::fit(&series).unwrap();

        let encoded = map.encode_series(&series).unwrap();
        let codes: Vec<i64> = encoded.i64().unwrap().into_iter().flatten().collect();
        let decoded = map.decode_all(&codes).unwrap();

        assert_eq!(decoded, original);
    }

    #[test]
    fn test_unknown_category_is_rejected() {
        let series = Series::new("gender".into(), &["Male", "Female"]);
        let map = LabelMap::fit(&series).unwrap();
        let err = map.encode("Other").unwrap_err();
        assert_eq!(err.error_code(), "UNKNOWN_CATEGORY");
        assert_eq!(map.decode(7), None);
    }
}
