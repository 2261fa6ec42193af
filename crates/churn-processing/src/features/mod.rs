//! Feature derivation: from a cleaned churn table to a numeric matrix.
//!
//! Steps, strictly ordered:
//! 1. Derived signals (`feature_*` columns)
//! 2. Label encoding of categoricals (`*_encoded` columns)
//! 3. Standard scaling of numeric and derived columns
//! 4. Projection to model-ready columns only
//!
//! [`FeatureDeriver::derive`] fits the label maps and scaler;
//! [`FeatureDeriver::transform`] reuses them for inference on new rows.

mod derived;
mod encoder;
mod scaler;

pub use derived::{DERIVED_PREFIX, derive_signals};
pub use encoder::LabelMap;
pub use scaler::{ScalerParams, StandardScaler};

use crate::error::{ProcessingError, Result, ResultExt};
use crate::schema::DatasetSchema;
use crate::utils::{is_model_ready_dtype, numeric_values};
use ndarray::Array2;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{Span, debug, info, info_span, warn};

/// A numeric-only matrix ready for a classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    /// Row-major values, one row per input row.
    pub values: Array2<f64>,
    /// Column names, in matrix column order.
    pub feature_names: Vec<String>,
}

impl FeatureMatrix {
    pub fn empty() -> Self {
        Self {
            values: Array2::zeros((0, 0)),
            feature_names: Vec::new(),
        }
    }

    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.values.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows() == 0 || self.n_features() == 0
    }
}

/// Description of the matrix produced by the last `derive` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureInfo {
    pub total_features: usize,
    pub derived_features: usize,
    pub numeric_features: usize,
    pub categorical_features: usize,
    /// Authoritative feature order, used for importance reporting.
    pub feature_names: Vec<String>,
    pub derived_names: Vec<String>,
    pub numeric_names: Vec<String>,
    pub encoded_names: Vec<String>,
}

impl FeatureInfo {
    fn from_names(feature_names: Vec<String>) -> Self {
        let derived_names: Vec<String> = feature_names
            .iter()
            .filter(|n| n.starts_with(DERIVED_PREFIX))
            .cloned()
            .collect();
        let encoded_names: Vec<String> = feature_names
            .iter()
            .filter(|n| n.ends_with("_encoded"))
            .cloned()
            .collect();
        let numeric_names: Vec<String> = feature_names
            .iter()
            .filter(|n| !n.starts_with(DERIVED_PREFIX) && !n.ends_with("_encoded"))
            .cloned()
            .collect();

        Self {
            total_features: feature_names.len(),
            derived_features: derived_names.len(),
            numeric_features: numeric_names.len(),
            categorical_features: encoded_names.len(),
            feature_names,
            derived_names,
            numeric_names,
            encoded_names,
        }
    }
}

/// Turns a cleaned dataset into a model-ready matrix.
pub trait FeatureDeriver: Send {
    /// Fit encoders and scaler on `df` and return its feature matrix.
    fn derive(&mut self, df: DataFrame) -> Result<FeatureMatrix>;

    /// Apply the fitted encoders and scaler to new rows. Never refits.
    fn transform(&self, df: DataFrame) -> Result<FeatureMatrix>;

    /// Description of the last derived matrix.
    fn info(&self) -> Option<&FeatureInfo>;
}

/// Fitted state from a `derive` call.
#[derive(Debug, Clone)]
struct FittedFeatures {
    label_maps: Vec<LabelMap>,
    scaler: StandardScaler,
    feature_names: Vec<String>,
}

/// Feature deriver for the telco churn layout.
pub struct TelcoFeatureDeriver {
    schema: DatasetSchema,
    span: Span,
    fitted: Option<FittedFeatures>,
    info: Option<FeatureInfo>,
}

impl TelcoFeatureDeriver {
    pub fn new(schema: DatasetSchema) -> Self {
        Self {
            schema,
            span: info_span!("feature_deriver"),
            fitted: None,
            info: None,
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Fitted label map for a categorical column.
    pub fn label_map(&self, column: &str) -> Option<&LabelMap> {
        self.fitted
            .as_ref()
            .and_then(|f| f.label_maps.iter().find(|m| m.column() == column))
    }

    fn add_derived(&self, mut df: DataFrame) -> Result<(DataFrame, Vec<String>)> {
        let signals = derive_signals(&df, &self.schema)?;
        let names: Vec<String> = signals.iter().map(|s| s.name().to_string()).collect();
        for series in signals {
            df.with_column(series).context("Adding derived feature")?;
        }
        debug!("Derived {} signals", names.len());
        Ok((df, names))
    }

    fn add_encoded(df: &mut DataFrame, maps: &[LabelMap]) -> Result<()> {
        for map in maps {
            let Ok(column) = df.column(map.column()) else {
                continue;
            };
            let encoded = map
                .encode_series(column.as_materialized_series())
                .map_err(|e| e.with_context(format!("Encoding column '{}'", map.column())))?;
            df.with_column(encoded)
                .context(format!("Adding encoded column for '{}'", map.column()))?;
        }
        Ok(())
    }

    /// Drop raw categoricals, identifier and target; drop anything else that
    /// is not numeric with a warning.
    fn project(&self, df: DataFrame) -> DataFrame {
        let mut to_drop: Vec<PlSmallStr> = Vec::new();
        for column in df.get_columns() {
            let name = column.name().as_str();
            let is_structural = name == self.schema.id_column
                || name == self.schema.target_column
                || self.schema.categorical_columns.iter().any(|c| c == name);
            if is_structural {
                to_drop.push(column.name().clone());
            } else if !is_model_ready_dtype(column.dtype()) {
                warn!(
                    "Dropping non-numeric column '{}' ({:?}) from feature matrix",
                    name,
                    column.dtype()
                );
                to_drop.push(column.name().clone());
            }
        }
        df.drop_many(to_drop)
    }
}

impl FeatureDeriver for TelcoFeatureDeriver {
    fn derive(&mut self, df: DataFrame) -> Result<FeatureMatrix> {
        let _guard = self.span.clone().entered();

        if df.height() == 0 {
            warn!("Empty dataset, producing an empty feature matrix");
            self.fitted = None;
            self.info = Some(FeatureInfo::default());
            return Ok(FeatureMatrix::empty());
        }

        let (mut df, derived_names) = self.add_derived(df)?;

        let label_maps = self
            .schema
            .categorical_columns
            .iter()
            .filter_map(|name| df.column(name).ok())
            .map(|c| LabelMap::fit(c.as_materialized_series()))
            .collect::<Result<Vec<_>>>()?;
        Self::add_encoded(&mut df, &label_maps)?;
        debug!("Encoded {} categorical columns", label_maps.len());

        let scaled_columns: Vec<String> = self
            .schema
            .numeric_columns
            .iter()
            .cloned()
            .chain(derived_names)
            .collect();
        let mut scaler = StandardScaler::new();
        let df = scaler.fit_transform(df, &scaled_columns)?;

        let df = self.project(df);
        let matrix = to_matrix(&df)?;

        let info = FeatureInfo::from_names(matrix.feature_names.clone());
        info!(
            "Feature matrix: {} rows x {} features ({} derived, {} numeric, {} encoded)",
            matrix.n_rows(),
            info.total_features,
            info.derived_features,
            info.numeric_features,
            info.categorical_features
        );

        self.fitted = Some(FittedFeatures {
            label_maps,
            scaler,
            feature_names: matrix.feature_names.clone(),
        });
        self.info = Some(info);
        Ok(matrix)
    }

    fn transform(&self, df: DataFrame) -> Result<FeatureMatrix> {
        let _guard = self.span.clone().entered();
        let fitted = self
            .fitted
            .as_ref()
            .ok_or(ProcessingError::NotFitted("TelcoFeatureDeriver"))?;

        let (mut df, _) = self.add_derived(df)?;
        Self::add_encoded(&mut df, &fitted.label_maps)?;
        let df = fitted.scaler.transform(df)?;

        for name in &fitted.feature_names {
            if df.column(name).is_err() {
                return Err(ProcessingError::ColumnNotFound(name.clone()));
            }
        }
        let df = df
            .select(fitted.feature_names.iter().map(String::as_str))
            .context("Selecting fitted feature columns")?;
        to_matrix(&df)
    }

    fn info(&self) -> Option<&FeatureInfo> {
        self.info.as_ref()
    }
}

/// Convert a numeric-only frame into a dense matrix. Nulls become 0.
fn to_matrix(df: &DataFrame) -> Result<FeatureMatrix> {
    let mut values = Array2::<f64>::zeros((df.height(), df.width()));
    let mut feature_names = Vec::with_capacity(df.width());

    for (j, column) in df.get_columns().iter().enumerate() {
        let name = column.name().to_string();
        if column.null_count() > 0 {
            debug!(
                "Column '{}' has {} nulls, filling with 0 in matrix",
                name,
                column.null_count()
            );
        }
        let column_values = numeric_values(column.as_materialized_series())
            .context(format!("Converting column '{}' to f64", name))?;
        for (i, v) in column_values.into_iter().enumerate() {
            values[[i, j]] = v.unwrap_or(0.0);
        }
        feature_names.push(name);
    }

    Ok(FeatureMatrix {
        values,
        feature_names,
    })
}
