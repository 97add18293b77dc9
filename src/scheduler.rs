// FILE: src/scheduler.rs
//! Scheduler: fires both sweeps on a fixed interval.
//!
//! Each run holds its job's lock file for its whole duration, so a cron-driven
//! CLI invocation and the daemon never sweep the same job at once.

use std::future::Future;
use tokio::time::MissedTickBehavior;
use crate::core::JobLock;
use crate::engine::{run_deletion_sweep, run_upload_sweep, Job, SweepReport};
use crate::error::Result;
use crate::state::SharedContext;

pub struct Scheduler {
    ctx: SharedContext,
}

impl Scheduler {
    pub fn new(ctx: SharedContext) -> Self {
        Self { ctx }
    }

    /// Loop until `shutdown` resolves. A tick that would overlap a slow run is
    /// skipped rather than queued.
    pub async fn run<F>(&self, shutdown: F)
    where F: Future<Output = ()>
    {
        let period = self.ctx.config.schedule.interval();
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        tracing::info!("[Scheduler] Running every {:?}", period);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("[Scheduler] Shutdown requested");
                    break;
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    /// One round: upload sweep, then deletion sweep.
    pub async fn tick(&self) -> Vec<SweepReport> {
        let mut reports = Vec::new();
        for job in [Job::UploadSweep, Job::DeletionSweep] {
            match run_locked(&self.ctx, job).await {
                Ok(Some(report)) => reports.push(report),
                Ok(None) => {}
                Err(e) => tracing::error!("[Scheduler] Could not start {}: {}", job, e),
            }
        }
        reports
    }
}

/// Run `job` once under its lock. `Ok(None)` if another run holds the lock.
pub async fn run_locked(ctx: &SharedContext, job: Job) -> Result<Option<SweepReport>> {
    let Some(_lock) = JobLock::acquire(&ctx.config.paths.lock_dir, job.name())? else {
        tracing::info!("[Scheduler] {} is already running, skipping", job);
        return Ok(None);
    };

    let schedule = &ctx.config.schedule;
    let report = match job {
        Job::UploadSweep => run_upload_sweep(ctx, schedule.upload_budget()).await,
        Job::DeletionSweep => run_deletion_sweep(ctx, schedule.deletion_budget()).await,
    };
    Ok(Some(report))
}
