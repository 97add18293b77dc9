// FILE: src/engine/deletion_sweep.rs
use std::time::Duration;
use crate::core::{parse_locator, TimeBudget};
use crate::engine::{Job, SweepReport, SweepStatus};
use crate::remote::ObjectStore;
use crate::state::SyncContext;
use crate::storage::{DeletionQueue, QueueEntry};

/// What happened to one queue entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    /// Object confirmed gone, entry removed
    Deleted,
    /// Entry was unusable and has been dropped
    Discarded,
    /// Kept for the next run
    Retained,
}

/// Work through the deletion queue until it is empty or the budget is spent.
/// An entry only leaves the queue once the store says the object is absent,
/// or when the entry itself is unusable.
pub async fn run_deletion_sweep(ctx: &SyncContext, limit: Duration) -> SweepReport {
    let budget = TimeBudget::start(limit);
    let mut report = SweepReport::new(Job::DeletionSweep);

    let ids = match ctx.queue.list() {
        Ok(ids) => ids,
        Err(e) => {
            tracing::error!("[DeletionSweep] Queue unreadable: {}", e);
            return report.finish(SweepStatus::Aborted(e.to_string()), &budget);
        }
    };
    if ids.is_empty() {
        return report.finish(SweepStatus::Completed, &budget);
    }

    let store = match ctx.clients.storage() {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("[DeletionSweep] Storage unavailable: {}", e);
            return report.finish(SweepStatus::Aborted(e.to_string()), &budget);
        }
    };

    for id in &ids {
        if budget.is_expired() {
            tracing::info!("[DeletionSweep] Budget of {:?} spent, stopping", budget.limit());
            return report.finish(SweepStatus::BudgetExpired, &budget);
        }
        report.examined += 1;

        match reconcile(ctx.queue.as_ref(), store.as_ref(), id).await {
            Outcome::Deleted => {
                report.succeeded += 1;
                report.removed += 1;
            }
            Outcome::Discarded => {
                report.failed += 1;
                report.removed += 1;
            }
            Outcome::Retained => report.retained += 1,
        }
    }

    report.finish(SweepStatus::Completed, &budget)
}

async fn reconcile(queue: &dyn DeletionQueue, store: &dyn ObjectStore, id: &str) -> Outcome {
    let bytes = match queue.read(id) {
        Ok(b) if !b.iter().all(u8::is_ascii_whitespace) => b,
        Ok(_) => {
            tracing::warn!("[DeletionSweep] Entry {} is empty, discarding", id);
            return discard(queue, id);
        }
        Err(e) => {
            tracing::warn!("[DeletionSweep] Entry {} unreadable, discarding: {}", id, e);
            return discard(queue, id);
        }
    };

    let uri = match QueueEntry::decode(&bytes) {
        Ok(entry) if !entry.uri.trim().is_empty() => entry.uri,
        Ok(_) => {
            tracing::warn!("[DeletionSweep] Entry {} has no uri, discarding", id);
            return discard(queue, id);
        }
        Err(e) => {
            tracing::warn!("[DeletionSweep] Entry {} is not valid JSON, discarding: {}", id, e);
            return discard(queue, id);
        }
    };

    let location = match parse_locator(uri.trim()) {
        Ok(l) => l,
        Err(e) => {
            tracing::warn!("[DeletionSweep] Entry {} has unusable uri '{}', discarding: {}", id, uri, e);
            return discard(queue, id);
        }
    };

    // The outcome of DELETE is not trusted either way; HEAD decides
    if let Err(e) = store.delete(&location).await {
        tracing::warn!("[DeletionSweep] Delete of {} failed: {}", location, e);
    }

    match store.exists(&location).await {
        Ok(false) => match queue.remove(id) {
            Ok(()) => {
                tracing::info!("[DeletionSweep] Deleted {}", location);
                Outcome::Deleted
            }
            Err(e) => {
                tracing::warn!("[DeletionSweep] {} is gone but entry {} could not be removed: {}", location, id, e);
                Outcome::Retained
            }
        },
        Ok(true) => {
            tracing::info!("[DeletionSweep] {} still present, will retry", location);
            Outcome::Retained
        }
        Err(e) => {
            tracing::warn!("[DeletionSweep] Could not verify {}, will retry: {}", location, e);
            Outcome::Retained
        }
    }
}

fn discard(queue: &dyn DeletionQueue, id: &str) -> Outcome {
    match queue.remove(id) {
        Ok(()) => Outcome::Discarded,
        Err(e) => {
            tracing::warn!("[DeletionSweep] Could not discard entry {}: {}", id, e);
            Outcome::Retained
        }
    }
}
