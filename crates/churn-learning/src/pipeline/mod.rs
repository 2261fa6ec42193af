//! Pipeline orchestration: phase sequencing, progress and cancellation.

mod builder;
pub mod progress;

pub use builder::{ModelFactory, Pipeline, PipelineBuilder, extract_labels};
pub use progress::{
    CancellationToken, ClosureProgressReporter, PipelineStage, ProgressReporter, ProgressUpdate,
};
