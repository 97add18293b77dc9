// FILE: src/engine/mod.rs
pub mod uploader;
pub mod text_detection;
pub mod upload_sweep;
pub mod deletion_sweep;
pub mod forget;

#[cfg(test)]
pub(crate) mod testing;

use std::fmt;
use std::time::Duration;
use serde::Serialize;
use crate::core::TimeBudget;

pub use uploader::Uploader;
pub use text_detection::{DetectOptions, DetectedText, TextDetector};
pub use upload_sweep::run_upload_sweep;
pub use deletion_sweep::run_deletion_sweep;
pub use forget::forget_file;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Job {
    UploadSweep,
    DeletionSweep,
}

impl Job {
    /// Also the lock file name
    pub fn name(&self) -> &'static str {
        match self {
            Job::UploadSweep => "upload_sweep",
            Job::DeletionSweep => "deletion_sweep",
        }
    }

    pub(crate) fn log_tag(&self) -> &'static str {
        match self {
            Job::UploadSweep => "UploadSweep",
            Job::DeletionSweep => "DeletionSweep",
        }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum SweepStatus {
    Completed,
    BudgetExpired,
    Aborted(String),
}

/// Outcome of one sweep. Sweeps never return errors; everything ends up here.
#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub job: Job,
    pub status: SweepStatus,
    /// Records or entries looked at
    pub examined: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Queue entries removed (deletion sweep only)
    pub removed: usize,
    /// Queue entries kept for the next run (deletion sweep only)
    pub retained: usize,
    pub elapsed: Duration,
}

impl SweepReport {
    pub(crate) fn new(job: Job) -> Self {
        Self {
            job,
            status: SweepStatus::Completed,
            examined: 0,
            succeeded: 0,
            failed: 0,
            removed: 0,
            retained: 0,
            elapsed: Duration::ZERO,
        }
    }

    pub(crate) fn finish(mut self, status: SweepStatus, budget: &TimeBudget) -> Self {
        self.status = status;
        self.elapsed = budget.elapsed();
        tracing::info!("[{}] {}", self.job.log_tag(), self);
        self
    }
}

impl fmt::Display for SweepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match &self.status {
            SweepStatus::Completed => "completed".to_string(),
            SweepStatus::BudgetExpired => "budget expired".to_string(),
            SweepStatus::Aborted(reason) => format!("aborted ({})", reason),
        };
        write!(
            f,
            "{} in {:.1}s: examined {}, ok {}, failed {}",
            status,
            self.elapsed.as_secs_f64(),
            self.examined,
            self.succeeded,
            self.failed
        )?;
        if self.job == Job::DeletionSweep {
            write!(f, ", removed {}, retained {}", self.removed, self.retained)?;
        }
        Ok(())
    }
}
