//! Configuration for the churn training pipeline.
//!
//! [`PipelineConfig`] can be built fluently with [`PipelineConfig::builder()`]
//! or loaded from a JSON file with [`PipelineConfig::from_file`]. Every field
//! has a default, so a JSON file only needs the values it overrides.

use crate::error::{PipelineError, Result};
use churn_processing::DatasetSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Hyperparameters for the linear classifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogisticParams {
    pub learning_rate: f64,
    pub max_iter: usize,
    pub tolerance: f64,
    /// L2 penalty strength.
    pub alpha: f64,
}

impl Default for LogisticParams {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            max_iter: 1000,
            tolerance: 1e-6,
            alpha: 1e-4,
        }
    }
}

/// Hyperparameters for the bagged tree ensemble.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 10,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }
}

/// Hyperparameters for the boosted tree ensemble.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostingParams {
    pub n_trees: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_split: usize,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            learning_rate: 0.1,
            max_depth: 6,
            min_samples_split: 2,
        }
    }
}

/// Persisted report formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    Json,
    Markdown,
}

/// Configuration for the training pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Column roles of the input dataset.
    pub schema: DatasetSchema,

    /// Fraction of rows held out for evaluation (0.0 - 1.0, exclusive).
    /// Default: 0.2
    pub test_fraction: f64,

    /// Seed threaded through the split and every classifier.
    /// Default: 42
    pub seed: u64,

    /// Worker threads for per-model training. 0 uses all cores.
    /// Default: 0
    pub n_jobs: usize,

    pub logistic: LogisticParams,
    pub forest: ForestParams,
    pub boosting: BoostingParams,

    /// Directory report sinks write into.
    /// Default: "results"
    pub output_dir: PathBuf,

    /// Report formats written after a run.
    /// Default: JSON and Markdown
    pub report_formats: Vec<ReportFormat>,

    /// Coarse watchdog on the whole run, checked between phases.
    /// Default: None
    pub max_duration_secs: Option<f64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            schema: DatasetSchema::default(),
            test_fraction: 0.2,
            seed: 42,
            n_jobs: 0,
            logistic: LogisticParams::default(),
            forest: ForestParams::default(),
            boosting: BoostingParams::default(),
            output_dir: PathBuf::from("results"),
            report_formats: vec![ReportFormat::Json, ReportFormat::Markdown],
            max_duration_secs: None,
        }
    }
}

impl PipelineConfig {
    /// Create a new configuration builder.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Load a configuration from a JSON file and validate it.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: PipelineConfig = serde_json::from_str(&content)?;
        config.validate().map_err(PipelineError::from)?;
        Ok(config)
    }

    pub fn max_duration(&self) -> Option<Duration> {
        self.max_duration_secs.map(Duration::from_secs_f64)
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> std::result::Result<(), ConfigValidationError> {
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(ConfigValidationError::InvalidFraction {
                field: "test_fraction".to_string(),
                value: self.test_fraction,
            });
        }

        if self.logistic.learning_rate <= 0.0 || self.logistic.max_iter == 0 {
            return Err(ConfigValidationError::InvalidParameter {
                field: "logistic".to_string(),
                reason: "learning_rate must be positive and max_iter at least 1".to_string(),
            });
        }

        if self.forest.n_trees == 0 || self.forest.max_depth == 0 {
            return Err(ConfigValidationError::InvalidParameter {
                field: "forest".to_string(),
                reason: "n_trees and max_depth must be at least 1".to_string(),
            });
        }

        if self.boosting.n_trees == 0
            || self.boosting.max_depth == 0
            || self.boosting.learning_rate <= 0.0
        {
            return Err(ConfigValidationError::InvalidParameter {
                field: "boosting".to_string(),
                reason: "n_trees, max_depth and learning_rate must be positive".to_string(),
            });
        }

        if let Some(secs) = self.max_duration_secs
            && !(secs > 0.0 && secs.is_finite())
        {
            return Err(ConfigValidationError::InvalidParameter {
                field: "max_duration_secs".to_string(),
                reason: format!("must be a positive number of seconds, got {}", secs),
            });
        }

        Ok(())
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid fraction for '{field}': {value} (must be between 0.0 and 1.0, exclusive)")]
    InvalidFraction { field: String, value: f64 },

    #[error("Invalid parameter '{field}': {reason}")]
    InvalidParameter { field: String, reason: String },
}

/// Builder for [`PipelineConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    schema: Option<DatasetSchema>,
    test_fraction: Option<f64>,
    seed: Option<u64>,
    n_jobs: Option<usize>,
    logistic: Option<LogisticParams>,
    forest: Option<ForestParams>,
    boosting: Option<BoostingParams>,
    output_dir: Option<PathBuf>,
    report_formats: Option<Vec<ReportFormat>>,
    max_duration_secs: Option<f64>,
}

impl PipelineConfigBuilder {
    pub fn schema(mut self, schema: DatasetSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Set the held-out fraction, e.g. 0.2 for an 80/20 split.
    pub fn test_fraction(mut self, fraction: f64) -> Self {
        self.test_fraction = Some(fraction);
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the number of training workers (0 = all cores).
    pub fn n_jobs(mut self, jobs: usize) -> Self {
        self.n_jobs = Some(jobs);
        self
    }

    pub fn logistic(mut self, params: LogisticParams) -> Self {
        self.logistic = Some(params);
        self
    }

    pub fn forest(mut self, params: ForestParams) -> Self {
        self.forest = Some(params);
        self
    }

    pub fn boosting(mut self, params: BoostingParams) -> Self {
        self.boosting = Some(params);
        self
    }

    pub fn output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(path.into());
        self
    }

    pub fn report_formats(mut self, formats: Vec<ReportFormat>) -> Self {
        self.report_formats = Some(formats);
        self
    }

    /// Abort the run at the next phase boundary once this much time has passed.
    pub fn max_duration(mut self, duration: Duration) -> Self {
        self.max_duration_secs = Some(duration.as_secs_f64());
        self
    }

    /// Build the configuration.
    ///
    /// Returns an error if any value is out of range.
    pub fn build(self) -> std::result::Result<PipelineConfig, ConfigValidationError> {
        let defaults = PipelineConfig::default();
        let config = PipelineConfig {
            schema: self.schema.unwrap_or(defaults.schema),
            test_fraction: self.test_fraction.unwrap_or(defaults.test_fraction),
            seed: self.seed.unwrap_or(defaults.seed),
            n_jobs: self.n_jobs.unwrap_or(defaults.n_jobs),
            logistic: self.logistic.unwrap_or(defaults.logistic),
            forest: self.forest.unwrap_or(defaults.forest),
            boosting: self.boosting.unwrap_or(defaults.boosting),
            output_dir: self.output_dir.unwrap_or(defaults.output_dir),
            report_formats: self.report_formats.unwrap_or(defaults.report_formats),
            max_duration_secs: self.max_duration_secs.or(defaults.max_duration_secs),
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.test_fraction, 0.2);
        assert_eq!(config.seed, 42);
        assert_eq!(config.forest.n_trees, 100);
        assert_eq!(config.forest.max_depth, 10);
        assert_eq!(config.boosting.max_depth, 6);
        assert_eq!(config.logistic.max_iter, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = PipelineConfig::builder()
            .test_fraction(0.3)
            .seed(7)
            .n_jobs(2)
            .max_duration(Duration::from_secs(60))
            .build()
            .unwrap();
        assert_eq!(config.test_fraction, 0.3);
        assert_eq!(config.seed, 7);
        assert_eq!(config.n_jobs, 2);
        assert_eq!(config.max_duration(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_builder_rejects_invalid_fraction() {
        assert!(PipelineConfig::builder().test_fraction(0.0).build().is_err());
        assert!(PipelineConfig::builder().test_fraction(1.5).build().is_err());
    }

    #[test]
    fn test_builder_rejects_empty_forest() {
        let result = PipelineConfig::builder()
            .forest(ForestParams {
                n_trees: 0,
                ..ForestParams::default()
            })
            .build();
        assert!(matches!(
            result,
            Err(ConfigValidationError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{"seed": 123, "forest": {"n_trees": 10}, "report_formats": ["json"]}"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.seed, 123);
        assert_eq!(config.forest.n_trees, 10);
        assert_eq!(config.forest.max_depth, 10);
        assert_eq!(config.report_formats, vec![ReportFormat::Json]);
        assert_eq!(config.test_fraction, 0.2);
    }
}
