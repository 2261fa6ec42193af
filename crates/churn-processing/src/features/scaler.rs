//! Standard (z-score) scaling of numeric columns.

use crate::error::{ProcessingError, Result, ResultExt};
use crate::utils::numeric_values;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// Fitted centre and scale for one column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalerParams {
    pub mean: f64,
    pub std: f64,
}

/// Standardizes columns to zero mean and unit variance.
///
/// Uses the population standard deviation; a constant column is only
/// centred (scale 1).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StandardScaler {
    params: Vec<(String, ScalerParams)>,
    is_fitted: bool,
}

impl StandardScaler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fit on the named columns. Absent columns are skipped.
    pub fn fit(&mut self, df: &DataFrame, columns: &[String]) -> Result<&mut Self> {
        self.params.clear();
        for name in columns {
            let Ok(column) = df.column(name) else {
                continue;
            };
            let values: Vec<f64> = numeric_values(column.as_materialized_series())
                .context(format!("Reading column '{}' for scaling", name))?
                .into_iter()
                .flatten()
                .collect();
            self.params.push((name.clone(), compute_params(&values)));
        }
        self.is_fitted = true;
        Ok(self)
    }

    /// Scale every fitted column present in `df` to Float64.
    pub fn transform(&self, mut df: DataFrame) -> Result<DataFrame> {
        if !self.is_fitted {
            return Err(ProcessingError::NotFitted("StandardScaler"));
        }

        for (name, params) in &self.params {
            let Ok(column) = df.column(name) else {
                continue;
            };
            let scaled: Vec<Option<f64>> = numeric_values(column.as_materialized_series())?
                .into_iter()
                .map(|v| v.map(|x| (x - params.mean) / params.std))
                .collect();
            df.replace(name, Series::new(name.as_str().into(), scaled))
                .context(format!("Scaling column '{}'", name))?;
        }
        Ok(df)
    }

    pub fn fit_transform(&mut self, df: DataFrame, columns: &[String]) -> Result<DataFrame> {
        self.fit(&df, columns)?;
        self.transform(df)
    }

    pub fn params(&self, column: &str) -> Option<ScalerParams> {
        self.params
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, p)| *p)
    }

    pub fn is_fitted(&self) -> bool {
        self.is_fitted
    }
}

fn compute_params(values: &[f64]) -> ScalerParams {
    if values.is_empty() {
        return ScalerParams { mean: 0.0, std: 1.0 };
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std = variance.sqrt();
    ScalerParams {
        mean,
        std: if std > f64::EPSILON { std } else { 1.0 },
    }
}
