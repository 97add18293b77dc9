// FILE: src/core/keys.rs
//! Storage key derivation.
//!
//! Keys look like `<shard>/<owner_id>/<file_id>[.<ext>]`. The shard groups owners
//! into blocks of `SHARD_SIZE` so no single prefix grows without bound.

use std::path::Path;
use crate::error::{Result, SyncError};
use crate::storage::FileRecord;

/// Owners per shard directory
pub const SHARD_SIZE: i64 = 5000;

/// Lower bound of the owner's shard block. Never below 1.
pub fn owner_shard(owner_id: i64) -> i64 {
    let lower = (owner_id.max(0) / SHARD_SIZE) * SHARD_SIZE;
    lower.max(1)
}

/// Derive the storage key for a record. Same record, same key, every time.
pub fn derive_key(record: &FileRecord) -> Result<String> {
    if record.file_id < 1 {
        return Err(SyncError::MalformedInput(format!("invalid file id {}", record.file_id)));
    }

    let mut key = format!(
        "{}/{}/{}",
        owner_shard(record.owner_id),
        record.owner_id,
        record.file_id
    );

    let ext = Path::new(&record.filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    if !ext.is_empty() {
        key.push('.');
        key.push_str(ext);
    }

    Ok(key)
}
