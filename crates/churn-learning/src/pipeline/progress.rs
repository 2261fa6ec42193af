//! Progress reporting and cancellation support for the training pipeline.
//!
//! # Example
//!
//! ```rust,ignore
//! use churn_learning::{CancellationToken, Pipeline};
//!
//! let token = CancellationToken::new();
//! let token_clone = token.clone();
//!
//! std::thread::spawn(move || {
//!     std::thread::sleep(std::time::Duration::from_secs(30));
//!     token_clone.cancel();
//! });
//!
//! let result = Pipeline::builder()
//!     .source(source)
//!     .cancellation_token(token)
//!     .on_progress(|update| {
//!         println!("[{:?}] {}", update.stage, update.message);
//!     })
//!     .build()?
//!     .run();
//! ```

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Phases of a pipeline run, in execution order, plus the terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Loading rows from the source
    Load,
    /// Checking required columns
    Validate,
    /// Imputation, normalization, coercion, de-duplication
    Clean,
    /// Derived signals, encoding, scaling, projection
    DeriveFeatures,
    /// Label extraction and stratified split
    Split,
    /// Instantiating the classifiers
    CreateModels,
    /// Fitting every classifier
    Train,
    /// Scoring on the held-out set
    Evaluate,
    /// Assembling the result
    Summarize,
    /// Run finished
    Done,
    /// Run was cancelled
    Cancelled,
    /// Run failed
    Failed,
}

impl PipelineStage {
    /// Returns a human-readable name for the stage.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Load => "Loading Data",
            Self::Validate => "Validating Schema",
            Self::Clean => "Cleaning Data",
            Self::DeriveFeatures => "Deriving Features",
            Self::Split => "Splitting Data",
            Self::CreateModels => "Creating Models",
            Self::Train => "Training Models",
            Self::Evaluate => "Evaluating Models",
            Self::Summarize => "Summarizing",
            Self::Done => "Done",
            Self::Cancelled => "Cancelled",
            Self::Failed => "Failed",
        }
    }

    /// Short phase name used in error context.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::Validate => "validate",
            Self::Clean => "clean",
            Self::DeriveFeatures => "derive_features",
            Self::Split => "split",
            Self::CreateModels => "create_models",
            Self::Train => "train",
            Self::Evaluate => "evaluate",
            Self::Summarize => "summarize",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }

    /// Share of the overall run spent in this stage. Sums to 1.0 over the
    /// working stages.
    pub fn weight(&self) -> f32 {
        match self {
            Self::Load => 0.05,
            Self::Validate => 0.02,
            Self::Clean => 0.08,
            Self::DeriveFeatures => 0.10,
            Self::Split => 0.03,
            Self::CreateModels => 0.02,
            Self::Train => 0.50,
            Self::Evaluate => 0.15,
            Self::Summarize => 0.05,
            Self::Done | Self::Cancelled | Self::Failed => 0.0,
        }
    }

    /// Returns the cumulative progress at the start of this stage.
    pub fn base_progress(&self) -> f32 {
        match self {
            Self::Load => 0.0,
            Self::Validate => 0.05,
            Self::Clean => 0.07,
            Self::DeriveFeatures => 0.15,
            Self::Split => 0.25,
            Self::CreateModels => 0.28,
            Self::Train => 0.30,
            Self::Evaluate => 0.80,
            Self::Summarize => 0.95,
            Self::Done => 1.0,
            Self::Cancelled | Self::Failed => 0.0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Cancelled | Self::Failed)
    }
}

/// A progress update sent to the [`ProgressReporter`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub stage: PipelineStage,

    /// Optional detail, e.g. the model being trained.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_stage: Option<String>,

    /// Overall progress (0.0 - 1.0)
    pub progress: f32,

    /// Progress within current stage (0.0 - 1.0)
    pub stage_progress: f32,

    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_processed: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_total: Option<usize>,
}

impl ProgressUpdate {
    pub fn new(stage: PipelineStage, stage_progress: f32, message: impl Into<String>) -> Self {
        let progress = stage.base_progress() + (stage.weight() * stage_progress);
        Self {
            stage,
            sub_stage: None,
            progress: progress.clamp(0.0, 1.0),
            stage_progress: stage_progress.clamp(0.0, 1.0),
            message: message.into(),
            items_processed: None,
            items_total: None,
        }
    }

    /// Creates a progress update with item counts, e.g. models evaluated so far.
    pub fn with_items(
        stage: PipelineStage,
        sub_stage: impl Into<String>,
        current: usize,
        total: usize,
        message: impl Into<String>,
    ) -> Self {
        let stage_progress = if total > 0 {
            current as f32 / total as f32
        } else {
            0.0
        };
        Self {
            sub_stage: Some(sub_stage.into()),
            items_processed: Some(current),
            items_total: Some(total),
            ..Self::new(stage, stage_progress, message)
        }
    }

    pub fn complete(message: impl Into<String>) -> Self {
        Self::new(PipelineStage::Done, 1.0, message)
    }

    pub fn cancelled() -> Self {
        Self::new(PipelineStage::Cancelled, 0.0, "Pipeline cancelled by user")
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(PipelineStage::Failed, 0.0, message)
    }
}

/// Receives progress updates from a running pipeline.
pub trait ProgressReporter: Send + Sync {
    /// Called at every phase transition. Keep it cheap.
    fn report(&self, update: ProgressUpdate);
}

/// [`ProgressReporter`] backed by a closure.
pub struct ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    callback: F,
}

impl<F> ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ProgressReporter for ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn report(&self, update: ProgressUpdate) {
        (self.callback)(update);
    }
}

/// Token for cancelling a running pipeline from another thread.
///
/// The pipeline checks the token between phases and fails with
/// [`PipelineError::Cancelled`](crate::error::PipelineError::Cancelled) once
/// it is set.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

static_assertions::assert_impl_all!(CancellationToken: Send, Sync);
static_assertions::assert_impl_all!(ProgressUpdate: Send, Sync);

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation. Visible to every clone of this token.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Clear the flag so the token can be reused for another run.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    const WORKING: [PipelineStage; 9] = [
        PipelineStage::Load,
        PipelineStage::Validate,
        PipelineStage::Clean,
        PipelineStage::DeriveFeatures,
        PipelineStage::Split,
        PipelineStage::CreateModels,
        PipelineStage::Train,
        PipelineStage::Evaluate,
        PipelineStage::Summarize,
    ];

    #[test]
    fn test_weights_sum_to_one() {
        let total: f32 = WORKING.iter().map(|s| s.weight()).sum();
        assert!((total - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_base_progress_is_cumulative() {
        let mut expected = 0.0;
        for stage in WORKING {
            assert!((stage.base_progress() - expected).abs() < 1e-4, "{:?}", stage);
            expected += stage.weight();
        }
        assert!((PipelineStage::Done.base_progress() - expected).abs() < 1e-4);
    }

    #[test]
    fn test_progress_update_with_items() {
        let update =
            ProgressUpdate::with_items(PipelineStage::Evaluate, "RandomForest", 1, 2, "Scoring");
        assert_eq!(update.stage_progress, 0.5);
        assert!((update.progress - 0.875).abs() < 1e-4);
        assert_eq!(update.items_total, Some(2));
    }

    #[test]
    fn test_terminal_updates() {
        assert_eq!(ProgressUpdate::complete("ok").progress, 1.0);
        assert_eq!(ProgressUpdate::cancelled().stage, PipelineStage::Cancelled);
        assert!(ProgressUpdate::failed("boom").stage.is_terminal());
        assert!(!PipelineStage::Train.is_terminal());
    }

    #[test]
    fn test_stage_serializes_snake_case() {
        let json = serde_json::to_string(&PipelineStage::DeriveFeatures).unwrap();
        assert_eq!(json, "\"derive_features\"");
    }

    #[test]
    fn test_closure_reporter() {
        let seen = Mutex::new(Vec::new());
        let reporter = ClosureProgressReporter::new(|u: ProgressUpdate| {
            seen.lock().unwrap().push(u.stage);
        });
        reporter.report(ProgressUpdate::new(PipelineStage::Load, 0.0, "start"));
        assert_eq!(*seen.lock().unwrap(), vec![PipelineStage::Load]);
    }

    #[test]
    fn test_cancellation_token() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
        token.reset();
        assert!(!clone.is_cancelled());
    }
}
