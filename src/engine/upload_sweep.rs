// FILE: src/engine/upload_sweep.rs
use std::sync::Arc;
use std::time::Duration;
use crate::core::TimeBudget;
use crate::engine::{Job, SweepReport, SweepStatus, Uploader};
use crate::error::Result;
use crate::state::SyncContext;
use crate::storage::{FileCatalog, PendingCursor};

/// Records fetched per catalog query
pub const BATCH_SIZE: usize = 100;

/// Upload every pending file of every file-like subtype, oldest first, until
/// the budget runs out. Per-file failures are counted and left pending for the
/// next run; nothing escapes as an error.
pub async fn run_upload_sweep(ctx: &SyncContext, limit: Duration) -> SweepReport {
    let budget = TimeBudget::start(limit);
    let report = SweepReport::new(Job::UploadSweep);

    let subtypes = match eligible_subtypes(ctx.catalog.as_ref()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("[UploadSweep] Could not read subtype registry: {}", e);
            return report.finish(SweepStatus::Aborted(e.to_string()), &budget);
        }
    };
    if subtypes.is_empty() {
        tracing::debug!("[UploadSweep] No file-like subtypes registered");
        return report.finish(SweepStatus::Completed, &budget);
    }

    let store = match ctx.clients.storage() {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("[UploadSweep] Storage unavailable: {}", e);
            return report.finish(SweepStatus::Aborted(e.to_string()), &budget);
        }
    };
    let uploader = Uploader::new(
        Arc::clone(&ctx.config),
        Arc::clone(&ctx.catalog),
        store,
        Arc::clone(&ctx.queue),
    );

    sweep_pending(ctx.catalog.as_ref(), &uploader, &subtypes, budget, report).await
}

async fn sweep_pending(
    catalog: &dyn FileCatalog,
    uploader: &Uploader,
    subtypes: &[String],
    budget: TimeBudget,
    mut report: SweepReport,
) -> SweepReport {
    let mut cursor: Option<PendingCursor> = None;

    loop {
        let batch = match catalog.pending_batch(subtypes, cursor, BATCH_SIZE) {
            Ok(b) => b,
            Err(e) => {
                tracing::error!("[UploadSweep] Could not list pending files: {}", e);
                return report.finish(SweepStatus::Aborted(e.to_string()), &budget);
            }
        };
        let exhausted = batch.len() < BATCH_SIZE;

        for record in &batch {
            if budget.is_expired() {
                tracing::info!("[UploadSweep] Budget of {:?} spent, stopping", budget.limit());
                return report.finish(SweepStatus::BudgetExpired, &budget);
            }

            // Failed records stay pending; the cursor keeps this run from retrying them
            cursor = Some(record.cursor());
            report.examined += 1;

            match uploader.upload(record).await {
                Ok(_) => report.succeeded += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!("[UploadSweep] Failed to upload {}: {}", record, e);
                }
            }
        }

        if exhausted {
            return report.finish(SweepStatus::Completed, &budget);
        }
    }
}

fn eligible_subtypes(catalog: &dyn FileCatalog) -> Result<Vec<String>> {
    let registered = catalog.registered_subtypes()?;
    Ok(registered
        .into_iter()
        .filter(|s| {
            let ok = catalog.is_file_like(s);
            if !ok {
                tracing::debug!("[UploadSweep] Skipping subtype '{}': not file-like", s);
            }
            ok
        })
        .collect())
}
