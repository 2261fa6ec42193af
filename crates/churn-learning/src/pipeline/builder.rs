//! The churn training pipeline and its builder.

use crate::classifier::{Classifier, default_models};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result, ResultExt};
use crate::evaluator::{Evaluator, ModelEvaluator, feature_importance_comparison};
use crate::pipeline::progress::{
    CancellationToken, ClosureProgressReporter, PipelineStage, ProgressReporter, ProgressUpdate,
};
use crate::trainer::{LabeledSet, ModelTrainer, TrainedModel, Trainer};
use crate::types::{PipelineResult, rank_importance};
use churn_processing::utils::{column_series, is_numeric_dtype, numeric_values, string_values};
use churn_processing::{
    Cleaner, FeatureDeriver, FeatureMatrix, RowSource, TelcoCleaner, TelcoFeatureDeriver,
};
use ndarray::Array2;
use polars::prelude::*;
use std::sync::Arc;
use std::time::Instant;
use tracing::{Span, debug, error, info, info_span, warn};

/// Builds the classifiers for a run from the configuration.
pub type ModelFactory = Arc<dyn Fn(&PipelineConfig) -> Vec<Box<dyn Classifier>> + Send + Sync>;

/// The churn training pipeline.
///
/// Phases run strictly in order and any phase error ends the run:
/// load, validate, clean, derive features, split, create models, train,
/// evaluate, summarize. Inside train and evaluate, a failing model is
/// recorded and skipped.
///
/// After a successful [`run`](Self::run) the pipeline keeps its fitted
/// cleaner, feature deriver and best model, so [`predict`](Self::predict)
/// scores new raw rows without refitting anything.
///
/// # Example
///
/// ```rust,ignore
/// use churn_learning::{Pipeline, PipelineConfig};
/// use churn_processing::{DatasetSchema, FileRowSource};
///
/// let config = PipelineConfig::default();
/// let mut pipeline = Pipeline::builder()
///     .source(FileRowSource::new("data/telco.csv", config.schema.clone()))
///     .config(config)
///     .on_progress(|update| {
///         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
///     })
///     .build()?;
///
/// let result = pipeline.run()?;
/// println!("Best model: {:?}", result.best_model);
/// ```
pub struct Pipeline {
    config: PipelineConfig,
    source: Box<dyn RowSource>,
    cleaner: Box<dyn Cleaner>,
    deriver: Box<dyn FeatureDeriver>,
    trainer: Box<dyn Trainer>,
    evaluator: Box<dyn Evaluator>,
    model_factory: ModelFactory,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
    cancellation_token: CancellationToken,
    span: Span,
    best_model: Option<TrainedModel>,
}

static_assertions::assert_impl_all!(Pipeline: Send);

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("source", &self.source.describe())
            .field("config", &self.config)
            .field("best_model", &self.best_model.as_ref().map(|m| m.name()))
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Create a new pipeline builder.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The best model of the last run, if any.
    pub fn best_model(&self) -> Option<&TrainedModel> {
        self.best_model.as_ref()
    }

    /// Run every phase and return the aggregated result.
    ///
    /// # Errors
    ///
    /// Any phase failure ends the run and is returned wrapped with the phase
    /// name. A cancelled token yields [`PipelineError::Cancelled`]; exceeding
    /// `max_duration` yields [`PipelineError::Timeout`].
    pub fn run(&mut self) -> Result<PipelineResult> {
        let span = self.span.clone();
        let _guard = span.enter();
        match self.run_internal() {
            Ok(result) => {
                self.report_progress(ProgressUpdate::complete("Pipeline completed successfully"));
                Ok(result)
            }
            Err(e) => {
                if e.is_cancelled() {
                    self.report_progress(ProgressUpdate::cancelled());
                } else {
                    self.report_progress(ProgressUpdate::failed(e.to_string()));
                }
                error!("Pipeline error: {}", e);
                Err(e)
            }
        }
    }

    /// Predict churn (0/1) for new raw rows with the best model.
    pub fn predict(&self, df: &DataFrame) -> Result<Vec<u8>> {
        let (model, x) = self.prepare(df)?;
        model.predict(&x)
    }

    /// Churn probability for new raw rows with the best model.
    pub fn predict_proba(&self, df: &DataFrame) -> Result<Vec<f64>> {
        let (model, x) = self.prepare(df)?;
        model.predict_proba(&x)
    }

    /// Clean and derive new rows with the fitted state of the last run.
    fn prepare(&self, df: &DataFrame) -> Result<(&TrainedModel, Array2<f64>)> {
        let model = self.best_model.as_ref().ok_or(PipelineError::NoBestModel)?;
        let cleaned = self
            .cleaner
            .apply(df.clone())
            .context("Cleaning rows for prediction")?;
        let matrix = self
            .deriver
            .transform(cleaned)
            .context("Deriving features for prediction")?;

        if matrix.feature_names != model.feature_names() {
            return Err(PipelineError::InvalidInput(format!(
                "derived features {:?} do not match the features {} was trained on",
                matrix.feature_names,
                model.name()
            )));
        }
        Ok((model, matrix.values))
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancellation_token.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        Ok(())
    }

    fn check_deadline(&self, start: Instant) -> Result<()> {
        if let Some(limit) = self.config.max_duration() {
            let elapsed = start.elapsed();
            if elapsed > limit {
                return Err(PipelineError::Timeout {
                    elapsed_secs: elapsed.as_secs_f64(),
                    limit_secs: limit.as_secs_f64(),
                });
            }
        }
        Ok(())
    }

    /// Report progress if a reporter is configured.
    fn report_progress(&self, update: ProgressUpdate) {
        if let Some(reporter) = &self.progress_reporter {
            reporter.report(update);
        }
    }

    /// Phase boundary: honour cancellation and the deadline, then announce
    /// the phase.
    fn begin(&self, stage: PipelineStage, step: usize, start: Instant) -> Result<()> {
        self.check_cancelled()
            .and_then(|()| self.check_deadline(start))
            .context(phase(stage))?;
        info!("Step {}: {}...", step, stage.display_name());
        self.report_progress(ProgressUpdate::new(
            stage,
            0.0,
            format!("{}...", stage.display_name()),
        ));
        Ok(())
    }

    fn finish(&self, stage: PipelineStage, message: impl Into<String>) {
        self.report_progress(ProgressUpdate::new(stage, 1.0, message));
    }

    fn run_internal(&mut self) -> Result<PipelineResult> {
        let start = Instant::now();
        self.best_model = None;
        info!("Starting churn pipeline on {}", self.source.describe());

        // Step 1: load
        self.begin(PipelineStage::Load, 1, start)?;
        let raw = self.source.load().context(phase(PipelineStage::Load))?;
        self.finish(
            PipelineStage::Load,
            format!("Loaded {} rows x {} columns", raw.height(), raw.width()),
        );

        // Step 2: validate
        self.begin(PipelineStage::Validate, 2, start)?;
        if !self.source.validate(&raw) {
            let missing = self
                .config
                .schema
                .missing_required(raw.get_column_names().into_iter().map(|c| c.as_str()));
            let detail = if missing.is_empty() {
                "dataset failed schema validation".to_string()
            } else {
                format!("required columns missing: {}", missing.join(", "))
            };
            return Err(PipelineError::Data(detail).with_context(phase(PipelineStage::Validate)));
        }
        self.finish(PipelineStage::Validate, "Schema validated");

        // Step 3: clean
        self.begin(PipelineStage::Clean, 3, start)?;
        let cleaned = self.cleaner.clean(raw).context(phase(PipelineStage::Clean))?;
        let cleaning_report = self.cleaner.report().cloned().ok_or_else(|| {
            PipelineError::Data("cleaner produced no report".to_string())
                .with_context(phase(PipelineStage::Clean))
        })?;
        self.finish(
            PipelineStage::Clean,
            format!(
                "Removed {} rows, {} missing values left",
                cleaning_report.rows_removed, cleaning_report.final_missing_count
            ),
        );

        // Step 4: derive features
        self.begin(PipelineStage::DeriveFeatures, 4, start)?;
        let target = column_series(&cleaned, &self.config.schema.target_column);
        let matrix = self
            .deriver
            .derive(cleaned)
            .context(phase(PipelineStage::DeriveFeatures))?;
        let feature_info = self.deriver.info().cloned().unwrap_or_default();
        self.finish(
            PipelineStage::DeriveFeatures,
            format!("{} features for {} rows", matrix.n_features(), matrix.n_rows()),
        );

        // Step 5: split
        self.begin(PipelineStage::Split, 5, start)?;
        let split = self
            .split(target.as_ref(), matrix)
            .context(phase(PipelineStage::Split))?;
        self.finish(
            PipelineStage::Split,
            format!("{} train / {} test", split.train.len(), split.test.len()),
        );

        // Step 6: create models
        self.begin(PipelineStage::CreateModels, 6, start)?;
        let models = (self.model_factory)(&self.config);
        let submitted = models.len();
        debug!(
            "Models: {:?}",
            models.iter().map(|m| m.name()).collect::<Vec<_>>()
        );
        self.finish(
            PipelineStage::CreateModels,
            format!("Created {} models", submitted),
        );

        // Step 7: train
        self.begin(PipelineStage::Train, 7, start)?;
        let trained = self
            .trainer
            .train_many(models, &split.train)
            .context(phase(PipelineStage::Train))?;
        let training_info = self.trainer.training_info();
        let mut warnings: Vec<String> = training_info
            .iter()
            .filter_map(|(name, record)| {
                record
                    .error
                    .as_ref()
                    .map(|e| format!("{} failed to train: {}", name, e))
            })
            .collect();
        if trained.is_empty() {
            warn!("Every model failed to train");
        }
        self.report_progress(ProgressUpdate::with_items(
            PipelineStage::Train,
            "models",
            trained.len(),
            submitted,
            format!("Trained {} of {} models", trained.len(), submitted),
        ));

        // Step 8: evaluate
        self.begin(PipelineStage::Evaluate, 8, start)?;
        let evaluation_report = self.evaluator.evaluate_many(&trained, &split.test);
        for model in &trained {
            if evaluation_report.get(model.name()).is_none() {
                warnings.push(format!("{} failed evaluation", model.name()));
            }
        }
        self.report_progress(ProgressUpdate::with_items(
            PipelineStage::Evaluate,
            "models",
            evaluation_report.model_count,
            trained.len(),
            format!("Evaluated {} models", evaluation_report.model_count),
        ));

        // Step 9: summarize
        self.begin(PipelineStage::Summarize, 9, start)?;
        let best_model_name = evaluation_report.best_model.clone();
        let feature_importance_comparison = feature_importance_comparison(&trained);
        let best_model = best_model_name
            .as_deref()
            .and_then(|name| trained.into_iter().find(|m| m.name() == name));
        let feature_importance = best_model
            .as_ref()
            .map(|m| rank_importance(m.feature_importance()))
            .unwrap_or_default();
        let best_model_metrics = evaluation_report.best_metrics().cloned();
        let model_comparison = evaluation_report.comparison();
        self.best_model = best_model;

        let total_execution_time_secs = start.elapsed().as_secs_f64();
        match &best_model_name {
            Some(name) => info!(
                "Pipeline finished in {:.2}s, best model: {}",
                total_execution_time_secs, name
            ),
            None => warn!(
                "Pipeline finished in {:.2}s without a usable model",
                total_execution_time_secs
            ),
        }

        Ok(PipelineResult {
            success: best_model_name.is_some(),
            cleaning_report,
            feature_info,
            training_info,
            best_model: best_model_name,
            best_model_metrics,
            model_comparison,
            feature_importance,
            feature_importance_comparison,
            train_samples: split.train.len(),
            test_samples: split.test.len(),
            evaluation_report,
            warnings,
            total_execution_time_secs,
        })
    }

    fn split(&self, target: Option<&Series>, matrix: FeatureMatrix) -> Result<crate::trainer::Split> {
        let schema = &self.config.schema;
        let target = target.ok_or_else(|| {
            PipelineError::Data(format!(
                "target column '{}' not found",
                schema.target_column
            ))
        })?;
        let labels = extract_labels(target, &schema.positive_label)?;
        let positives = labels.iter().filter(|&&y| y == 1).count();
        debug!("{} of {} rows are positive", positives, labels.len());

        let data = LabeledSet::new(matrix.values, labels, matrix.feature_names)?;
        self.trainer
            .split(&data, self.config.test_fraction, self.config.seed)
    }
}

fn phase(stage: PipelineStage) -> String {
    format!("Phase {}", stage.as_str())
}

/// Map the target column to 0/1: text equal to `positive_label` (after
/// trimming) is 1; numeric targets are 1 when equal to 1. Nulls are 0.
pub fn extract_labels(target: &Series, positive_label: &str) -> Result<Vec<u8>> {
    if is_numeric_dtype(target.dtype()) {
        let values = numeric_values(target)?;
        return Ok(values
            .into_iter()
            .map(|v| u8::from(v == Some(1.0)))
            .collect());
    }
    if matches!(target.dtype(), DataType::Boolean) {
        return Ok(target
            .bool()?
            .into_iter()
            .map(|v| u8::from(v.unwrap_or(false)))
            .collect());
    }
    let values = string_values(target)?;
    Ok(values
        .into_iter()
        .map(|v| u8::from(v.as_deref().map(str::trim) == Some(positive_label)))
        .collect())
}

/// Builder for creating a [`Pipeline`] instance.
///
/// Only the row source is required; every other component falls back to the
/// default implementation for the configured schema.
#[derive(Default)]
pub struct PipelineBuilder {
    config: Option<PipelineConfig>,
    source: Option<Box<dyn RowSource>>,
    cleaner: Option<Box<dyn Cleaner>>,
    deriver: Option<Box<dyn FeatureDeriver>>,
    trainer: Option<Box<dyn Trainer>>,
    evaluator: Option<Box<dyn Evaluator>>,
    model_factory: Option<ModelFactory>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
    cancellation_token: Option<CancellationToken>,
    span: Option<Span>,
}

static_assertions::assert_impl_all!(PipelineBuilder: Send);

impl PipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set where the rows come from. Required.
    pub fn source(mut self, source: impl RowSource + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn cleaner(mut self, cleaner: impl Cleaner + 'static) -> Self {
        self.cleaner = Some(Box::new(cleaner));
        self
    }

    pub fn deriver(mut self, deriver: impl FeatureDeriver + 'static) -> Self {
        self.deriver = Some(Box::new(deriver));
        self
    }

    pub fn trainer(mut self, trainer: impl Trainer + 'static) -> Self {
        self.trainer = Some(Box::new(trainer));
        self
    }

    pub fn evaluator(mut self, evaluator: impl Evaluator + 'static) -> Self {
        self.evaluator = Some(Box::new(evaluator));
        self
    }

    /// Replace the default three classifiers.
    pub fn model_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&PipelineConfig) -> Vec<Box<dyn Classifier>> + Send + Sync + 'static,
    {
        self.model_factory = Some(Arc::new(factory));
        self
    }

    /// Set a progress reporter for receiving updates during the run.
    pub fn progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress_reporter = Some(reporter);
        self
    }

    /// Set a closure to receive progress updates.
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        self.progress_reporter = Some(Arc::new(ClosureProgressReporter::new(callback)));
        self
    }

    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = Some(token);
        self
    }

    /// Parent span for every log line of the run. Default components log
    /// under child spans of it.
    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Build the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if no source was set or the
    /// configuration is invalid.
    pub fn build(self) -> Result<Pipeline> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let source = self.source.ok_or_else(|| {
            PipelineError::InvalidConfig("a row source is required".to_string())
        })?;
        let span = self.span.unwrap_or_else(|| info_span!("pipeline"));

        let cleaner = self.cleaner.unwrap_or_else(|| {
            Box::new(
                TelcoCleaner::new(config.schema.clone())
                    .with_span(info_span!(parent: &span, "cleaner")),
            )
        });
        let deriver = self.deriver.unwrap_or_else(|| {
            Box::new(
                TelcoFeatureDeriver::new(config.schema.clone())
                    .with_span(info_span!(parent: &span, "feature_deriver")),
            )
        });
        let trainer = self.trainer.unwrap_or_else(|| {
            Box::new(
                ModelTrainer::new(config.n_jobs).with_span(info_span!(parent: &span, "trainer")),
            )
        });
        let evaluator = self.evaluator.unwrap_or_else(|| {
            Box::new(ModelEvaluator::new().with_span(info_span!(parent: &span, "evaluator")))
        });
        let model_factory = self
            .model_factory
            .unwrap_or_else(|| Arc::new(default_models));

        Ok(Pipeline {
            config,
            source,
            cleaner,
            deriver,
            trainer,
            evaluator,
            model_factory,
            progress_reporter: self.progress_reporter,
            cancellation_token: self.cancellation_token.unwrap_or_default(),
            span,
            best_model: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use churn_processing::{DatasetSchema, FrameSource};
    use pretty_assertions::assert_eq;

    fn tiny_source() -> FrameSource {
        let df = df![
            "customerID" => ["1", "2"],
            "tenure" => [1i64, 2],
            "MonthlyCharges" => [10.0, 20.0],
            "Churn" => ["Yes", "No"],
        ]
        .unwrap();
        FrameSource::new(df, DatasetSchema::default())
    }

    #[test]
    fn test_builder_requires_source() {
        let err = Pipeline::builder().build().unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let mut config = PipelineConfig::default();
        config.test_fraction = 1.0;
        let err = Pipeline::builder()
            .config(config)
            .source(tiny_source())
            .build()
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIG");
    }

    #[test]
    fn test_predict_before_run_has_no_model() {
        let pipeline = Pipeline::builder().source(tiny_source()).build().unwrap();
        let df = DataFrame::empty();
        assert!(matches!(
            pipeline.predict(&df),
            Err(PipelineError::NoBestModel)
        ));
    }

    #[test]
    fn test_cancelled_before_start() {
        let token = CancellationToken::new();
        token.cancel();
        let mut pipeline = Pipeline::builder()
            .source(tiny_source())
            .cancellation_token(token)
            .build()
            .unwrap();
        let err = pipeline.run().unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(err.to_string(), "Phase load: Pipeline cancelled");
    }

    #[test]
    fn test_extract_labels() {
        let text = Series::new("Churn".into(), &[Some("Yes"), Some("No"), None, Some(" Yes ")]);
        assert_eq!(extract_labels(&text, "Yes").unwrap(), vec![1, 0, 0, 1]);

        let numeric = Series::new("Churn".into(), &[1i64, 0, 1]);
        assert_eq!(extract_labels(&numeric, "Yes").unwrap(), vec![1, 0, 1]);
    }
}
