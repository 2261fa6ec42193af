//! Derived churn signals computed from cleaned columns.

use crate::error::Result;
use crate::schema::DatasetSchema;
use crate::utils::{column_series, numeric_values, string_values};
use polars::prelude::*;

/// Prefix shared by every derived column.
pub const DERIVED_PREFIX: &str = "feature_";

fn strings_of(df: &DataFrame, name: &str) -> Result<Option<Vec<String>>> {
    match column_series(df, name) {
        Some(series) => Ok(Some(
            string_values(&series)?
                .into_iter()
                .map(|v| v.unwrap_or_default())
                .collect(),
        )),
        None => Ok(None),
    }
}

fn floats_of(df: &DataFrame, name: &str) -> Result<Option<Vec<f64>>> {
    match column_series(df, name) {
        Some(series) => Ok(Some(
            numeric_values(&series)?
                .into_iter()
                .map(|v| v.unwrap_or(0.0))
                .collect(),
        )),
        None => Ok(None),
    }
}

fn indicator(values: impl Iterator<Item = bool>) -> Vec<f64> {
    values.map(|b| if b { 1.0 } else { 0.0 }).collect()
}

/// Compute the derived columns that the dataset supports, in a fixed order.
///
/// A derived column is only produced when all of its source columns exist.
pub fn derive_signals(df: &DataFrame, schema: &DatasetSchema) -> Result<Vec<Series>> {
    let height = df.height();
    let mut derived = Vec::new();

    let services: Vec<Vec<String>> = schema
        .service_columns
        .iter()
        .map(|name| strings_of(df, name))
        .collect::<Result<Vec<_>>>()?
        .into_iter()
        .flatten()
        .collect();
    if !services.is_empty() {
        let counts: Vec<f64> = (0..height)
            .map(|row| services.iter().filter(|col| col[row] != "No").count() as f64)
            .collect();
        derived.push(Series::new("feature_total_services".into(), counts));
    }

    if let (Some(partner), Some(dependents)) = (
        strings_of(df, &schema.partner_column)?,
        strings_of(df, &schema.dependents_column)?,
    ) {
        let values = indicator(
            partner
                .iter()
                .zip(&dependents)
                .map(|(p, d)| p == "Yes" || d == "Yes"),
        );
        derived.push(Series::new("feature_has_family".into(), values));
    }

    if let Some(senior) = floats_of(df, &schema.senior_column)? {
        derived.push(Series::new("feature_is_senior".into(), senior));
    }

    if let Some(contract) = strings_of(df, &schema.contract_column)? {
        let values = indicator(contract.iter().map(|c| *c != schema.short_contract_value));
        derived.push(Series::new("feature_long_contract".into(), values));
    }

    if let Some(lines) = strings_of(df, &schema.multiple_lines_column)? {
        let values = indicator(lines.iter().map(|l| l == "Yes"));
        derived.push(Series::new("feature_multiple_lines".into(), values));
    }

    let tenure = floats_of(df, &schema.tenure_column)?;
    let monthly = floats_of(df, &schema.monthly_charges_column)?;
    let total = floats_of(df, &schema.total_charges_column)?;

    if let (Some(monthly), Some(tenure)) = (&monthly, &tenure) {
        let values: Vec<f64> = monthly
            .iter()
            .zip(tenure)
            .map(|(m, t)| m / (t + 1.0))
            .collect();
        derived.push(Series::new("feature_monthly_per_tenure".into(), values));
    }

    if let (Some(total), Some(tenure)) = (&total, &tenure) {
        let values: Vec<f64> = total
            .iter()
            .zip(tenure)
            .map(|(c, t)| c / (t + 1.0))
            .collect();
        derived.push(Series::new("feature_total_per_tenure".into(), values));
    }

    if let (Some(total), Some(monthly)) = (&total, &monthly) {
        let values: Vec<f64> = total.iter().zip(monthly).map(|(c, m)| c - m).collect();
        derived.push(Series::new("feature_charges_difference".into(), values));
    }

    Ok(derived)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(series: &Series) -> Vec<f64> {
        numeric_values(series).unwrap().into_iter().flatten().collect()
    }

    #[test]
    fn test_all_signals_for_full_layout() {
        let df = df![
            "PhoneService" => ["Yes", "No"],
            "InternetService" => ["Fiber optic", "No"],
            "OnlineSecurity" => ["Yes", "No"],
            "Partner" => ["No", "No"],
            "Dependents" => ["Yes", "No"],
            "SeniorCitizen" => [1i64, 0],
            "Contract" => ["Two year", "Month-to-month"],
            "MultipleLines" => ["Yes", "No"],
            "tenure" => [9.0, 0.0],
            "MonthlyCharges" => [50.0, 20.0],
            "TotalCharges" => [450.0, 20.0],
        ]
        .unwrap();

        let derived = derive_signals(&df, &DatasetSchema::default()).unwrap();
        let names: Vec<&str> = derived.iter().map(|s| s.name().as_str()).collect();
        assert_eq!(
            names,
            vec![
                "feature_total_services",
                "feature_has_family",
                "feature_is_senior",
                "feature_long_contract",
                "feature_multiple_lines",
                "feature_monthly_per_tenure",
                "feature_total_per_tenure",
                "feature_charges_difference",
            ]
        );
        assert_eq!(values(&derived[0]), vec![3.0, 0.0]);
        assert_eq!(values(&derived[1]), vec![1.0, 0.0]);
        assert_eq!(values(&derived[3]), vec![1.0, 0.0]);
        assert_eq!(values(&derived[5]), vec![5.0, 20.0]);
        assert_eq!(values(&derived[6]), vec![45.0, 20.0]);
        assert_eq!(values(&derived[7]), vec![400.0, 0.0]);
    }

    #[test]
    fn test_missing_sources_skip_signals() {
        let df = df!["tenure" => [1.0, 2.0]].unwrap();
        let derived = derive_signals(&df, &DatasetSchema::default()).unwrap();
        assert!(derived.is_empty());
    }
}
