use super::{ReportSink, timestamp};
use crate::error::{PipelineError, Result};
use crate::types::PipelineResult;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// Writes `results_{timestamp}.json` with the full result.
#[derive(Debug, Clone)]
pub struct JsonReportSink {
    output_dir: PathBuf,
}

impl JsonReportSink {
    pub fn new(output_dir: impl AsRef<Path>) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
        }
    }
}

impl ReportSink for JsonReportSink {
    fn write(&self, result: &PipelineResult) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir).map_err(|e| {
            PipelineError::Report(format!("creating {}: {}", self.output_dir.display(), e))
        })?;

        let report_path = self.output_dir.join(format!("results_{}.json", timestamp()));
        let mut file = File::create(&report_path)?;
        file.write_all(result.to_json()?.as_bytes())?;

        info!("Results saved: {}", report_path.display());
        Ok(report_path)
    }
}
