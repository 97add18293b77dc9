// FILE: src/storage/mod.rs
pub mod connection;
pub mod repository;
pub mod catalog;
pub mod queue;

// Common exports
pub use repository::{Repository, NewFile};
pub use connection::{open_database, open_in_memory, Database};
pub use catalog::{FileCatalog, SqliteCatalog, PendingCursor};
pub use queue::{DeletionQueue, DirectoryQueue, SqliteQueue, QueueEntry, EntryId};

/// A file the application knows about locally.
#[derive(Debug, Clone, PartialEq)]
pub struct FileRecord {
    pub file_id: i64,
    pub owner_id: i64,
    pub subtype: String,
    pub filename: String,
    /// Relative to `paths.data_root`
    pub rel_path: String,
    pub mime_type: String,
    /// Set once the object is in the store; never cleared or overwritten
    pub remote_locator: Option<String>,
    /// Unix seconds
    pub created_at: i64,
}

impl FileRecord {
    pub fn is_synced(&self) -> bool {
        self.remote_locator.as_deref().is_some_and(|l| !l.is_empty())
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.to_ascii_lowercase().starts_with("image/")
    }

    pub fn cursor(&self) -> PendingCursor {
        PendingCursor { created_at: self.created_at, file_id: self.file_id }
    }
}

impl std::fmt::Display for FileRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (file_id: {}, owner: {}, subtype: {})",
            self.rel_path, self.file_id, self.owner_id, self.subtype)
    }
}
