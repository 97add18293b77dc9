// FILE: src/engine/forget.rs
use crate::error::Result;
use crate::storage::{DeletionQueue, FileCatalog, FileRecord};

/// Delete a local record and hand its remote object to the deletion queue.
///
/// The queue entry is written before the record goes away, so a failed
/// enqueue leaves the record (and its locator) in place. If the record
/// delete fails the entry is withdrawn again.
pub fn forget_file(catalog: &dyn FileCatalog, queue: &dyn DeletionQueue, file_id: i64) -> Result<Option<FileRecord>> {
    let Some(record) = catalog.get_file(file_id)? else {
        return Ok(None);
    };

    let entry = match record.remote_locator.as_deref().map(str::trim).filter(|l| !l.is_empty()) {
        Some(locator) => Some(queue.enqueue(locator)?),
        None => None,
    };

    if let Err(e) = catalog.forget_file(file_id) {
        if let Some(entry) = &entry {
            if let Err(undo) = queue.remove(entry) {
                tracing::error!("[Forget] Could not withdraw queue entry {} for {}: {}", entry, record, undo);
            }
        }
        return Err(e);
    }

    match &entry {
        Some(entry) => tracing::info!("[Forget] Removed {}, queued its object for deletion ({})", record, entry),
        None => tracing::info!("[Forget] Removed {} (never synced)", record),
    }
    Ok(Some(record))
}
