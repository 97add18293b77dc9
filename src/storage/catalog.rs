//! File Catalog
//!
//! The application's side of the contract: which subtypes are eligible,
//! which files are still pending, and where to record the locator.

use crate::error::Result;
use crate::storage::connection::{self, Database};
use crate::storage::{FileRecord, NewFile, Repository};

/// Position after the last record a sweep has seen. Pending is a derived
/// property, so this only lives for the duration of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingCursor {
    pub created_at: i64,
    pub file_id: i64,
}

pub trait FileCatalog: Send + Sync {
    /// Every subtype the application registered, valid or not
    fn registered_subtypes(&self) -> Result<Vec<String>>;

    /// Whether a registered subtype is backed by an actual file
    fn is_file_like(&self, subtype: &str) -> bool;

    /// Pending records (no locator) of `subtypes`, oldest first, after `after`
    fn pending_batch(&self, subtypes: &[String], after: Option<PendingCursor>, limit: usize) -> Result<Vec<FileRecord>>;

    fn get_file(&self, file_id: i64) -> Result<Option<FileRecord>>;

    /// Write-once. Returns false if the record already had a locator, or is gone.
    fn set_remote_locator(&self, file_id: i64, locator: &str) -> Result<bool>;

    /// Remove the local record, returning it if it existed
    fn forget_file(&self, file_id: i64) -> Result<Option<FileRecord>>;
}

pub struct SqliteCatalog {
    db: Database,
}

impl SqliteCatalog {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn register_file(&self, file: &NewFile<'_>) -> Result<i64> {
        let conn = connection::lock(&self.db)?;
        Repository::new(&conn).register_file(file)
    }

    pub fn register_subtype(&self, name: &str, is_file: bool) -> Result<()> {
        let conn = connection::lock(&self.db)?;
        Repository::new(&conn).register_subtype(name, is_file)
    }

    /// (pending, synced)
    pub fn counts(&self) -> Result<(u64, u64)> {
        let conn = connection::lock(&self.db)?;
        Repository::new(&conn).file_counts()
    }
}

impl FileCatalog for SqliteCatalog {
    fn registered_subtypes(&self) -> Result<Vec<String>> {
        let conn = connection::lock(&self.db)?;
        Repository::new(&conn).registered_subtypes()
    }

    fn is_file_like(&self, subtype: &str) -> bool {
        let result = connection::lock(&self.db)
            .and_then(|conn| Repository::new(&conn).is_file_subtype(subtype));
        match result {
            Ok(is_file) => is_file,
            Err(e) => {
                tracing::warn!("[Catalog] Could not check subtype '{}': {}", subtype, e);
                false
            }
        }
    }

    fn pending_batch(&self, subtypes: &[String], after: Option<PendingCursor>, limit: usize) -> Result<Vec<FileRecord>> {
        let conn = connection::lock(&self.db)?;
        Repository::new(&conn).pending_batch(subtypes, after.map(|c| (c.created_at, c.file_id)), limit)
    }

    fn get_file(&self, file_id: i64) -> Result<Option<FileRecord>> {
        let conn = connection::lock(&self.db)?;
        Repository::new(&conn).get_file(file_id)
    }

    fn set_remote_locator(&self, file_id: i64, locator: &str) -> Result<bool> {
        let conn = connection::lock(&self.db)?;
        Repository::new(&conn).set_remote_locator(file_id, locator)
    }

    fn forget_file(&self, file_id: i64) -> Result<Option<FileRecord>> {
        let conn = connection::lock(&self.db)?;
        Repository::new(&conn).delete_file(file_id)
    }
}
