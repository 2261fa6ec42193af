//! Semantic column roles for churn datasets.
//!
//! Cleaning and feature derivation never hard-code column names; they read
//! them from a [`DatasetSchema`]. The default schema describes the telco
//! customer churn layout.

use serde::{Deserialize, Serialize};

/// Declares which columns play which role in a churn dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetSchema {
    /// Row identifier, dropped before modelling.
    pub id_column: String,

    /// Churn indicator column.
    pub target_column: String,

    /// Value of the target column that maps to label 1.
    pub positive_label: String,

    /// Continuous numeric columns (median-imputed, scaled).
    pub numeric_columns: Vec<String>,

    /// 0/1 indicator columns coerced to integers.
    pub flag_columns: Vec<String>,

    /// Categorical columns (mode-imputed, trimmed, label-encoded).
    pub categorical_columns: Vec<String>,

    /// Columns counted by the active-services feature.
    pub service_columns: Vec<String>,

    /// Columns that may encode "not applicable" as `No <X> service`.
    pub service_dependent_columns: Vec<String>,

    /// Numeric columns that may arrive as strings and must be coerced.
    pub coerce_columns: Vec<String>,

    /// Columns that must be present for the dataset to be usable.
    pub required_columns: Vec<String>,

    /// Contract column and the value meaning "no long-term commitment".
    pub contract_column: String,
    pub short_contract_value: String,

    pub tenure_column: String,
    pub monthly_charges_column: String,
    pub total_charges_column: String,
    pub partner_column: String,
    pub dependents_column: String,
    pub senior_column: String,
    pub multiple_lines_column: String,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

impl Default for DatasetSchema {
    fn default() -> Self {
        Self {
            id_column: "customerID".to_string(),
            target_column: "Churn".to_string(),
            positive_label: "Yes".to_string(),
            numeric_columns: strings(&["tenure", "MonthlyCharges", "TotalCharges"]),
            flag_columns: strings(&["SeniorCitizen"]),
            categorical_columns: strings(&[
                "gender",
                "Partner",
                "Dependents",
                "PhoneService",
                "MultipleLines",
                "InternetService",
                "OnlineSecurity",
                "OnlineBackup",
                "DeviceProtection",
                "TechSupport",
                "StreamingTV",
                "StreamingMovies",
                "Contract",
                "PaperlessBilling",
                "PaymentMethod",
            ]),
            service_columns: strings(&[
                "PhoneService",
                "InternetService",
                "OnlineSecurity",
                "OnlineBackup",
                "DeviceProtection",
                "TechSupport",
                "StreamingTV",
                "StreamingMovies",
            ]),
            service_dependent_columns: strings(&[
                "MultipleLines",
                "OnlineSecurity",
                "OnlineBackup",
                "DeviceProtection",
                "TechSupport",
                "StreamingTV",
                "StreamingMovies",
            ]),
            coerce_columns: strings(&["TotalCharges"]),
            required_columns: strings(&["customerID", "Churn", "tenure", "MonthlyCharges"]),
            contract_column: "Contract".to_string(),
            short_contract_value: "Month-to-month".to_string(),
            tenure_column: "tenure".to_string(),
            monthly_charges_column: "MonthlyCharges".to_string(),
            total_charges_column: "TotalCharges".to_string(),
            partner_column: "Partner".to_string(),
            dependents_column: "Dependents".to_string(),
            senior_column: "SeniorCitizen".to_string(),
            multiple_lines_column: "MultipleLines".to_string(),
        }
    }
}

impl DatasetSchema {
    /// Returns the required columns absent from `columns`.
    pub fn missing_required<'a, I>(&self, columns: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let present: Vec<&str> = columns.into_iter().collect();
        self.required_columns
            .iter()
            .filter(|c| !present.contains(&c.as_str()))
            .cloned()
            .collect()
    }

    /// Columns that are trimmed during normalization: categoricals plus the target.
    pub fn trimmed_columns(&self) -> Vec<&str> {
        self.categorical_columns
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.target_column.as_str()))
            .collect()
    }
}
