//! Report sinks: persisting a [`PipelineResult`](crate::types::PipelineResult).

mod json;
mod markdown;

pub use json::JsonReportSink;
pub use markdown::{MarkdownReportSink, insights};

use crate::config::ReportFormat;
use crate::error::Result;
use crate::types::PipelineResult;
use chrono::Local;
use std::path::{Path, PathBuf};

/// Persists a pipeline result somewhere and returns where.
pub trait ReportSink: Send + Sync {
    fn write(&self, result: &PipelineResult) -> Result<PathBuf>;
}

/// One sink per requested format, all writing into `output_dir`.
pub fn sinks_for(formats: &[ReportFormat], output_dir: &Path) -> Vec<Box<dyn ReportSink>> {
    let mut sinks: Vec<Box<dyn ReportSink>> = Vec::new();
    for format in formats {
        match format {
            ReportFormat::Json => sinks.push(Box::new(JsonReportSink::new(output_dir))),
            ReportFormat::Markdown => sinks.push(Box::new(MarkdownReportSink::new(output_dir))),
        }
    }
    sinks
}

/// Write `result` through every sink, stopping at the first failure.
pub fn write_reports(result: &PipelineResult, sinks: &[Box<dyn ReportSink>]) -> Result<Vec<PathBuf>> {
    sinks.iter().map(|sink| sink.write(result)).collect()
}

/// File-name timestamp, e.g. `20260114_093000`.
fn timestamp() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}
