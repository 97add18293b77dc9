//! Deletion Queue
//!
//! When the application deletes a synced file locally it drops a small JSON
//! record (`{"uri": ...}`) here. The deletion sweep consumes them. Two
//! backends: a directory of `*.json` files and a table in the shared database.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use crate::error::{Result, SyncError};
use crate::storage::connection::{self, Database};
use crate::storage::Repository;

/// Opaque handle: a file name for the directory queue, a row id for sqlite.
pub type EntryId = String;

const ENTRY_EXTENSION: &str = "json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    #[serde(default)]
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enqueued_at: Option<DateTime<Utc>>,
}

impl QueueEntry {
    pub fn new(uri: &str) -> Self {
        Self { uri: uri.to_string(), enqueued_at: Some(Utc::now()) }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

pub trait DeletionQueue: Send + Sync {
    /// All entry ids. Fails if the queue storage itself is unreadable.
    fn list(&self) -> Result<Vec<EntryId>>;

    /// Raw entry content
    fn read(&self, id: &str) -> Result<Vec<u8>>;

    /// Removing an entry that is already gone is not an error
    fn remove(&self, id: &str) -> Result<()>;

    fn enqueue(&self, uri: &str) -> Result<EntryId>;
}

// ========== DIRECTORY BACKEND ==========

pub struct DirectoryQueue {
    dir: PathBuf,
}

impl DirectoryQueue {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, id: &str) -> Result<PathBuf> {
        // Ids are bare file names; anything with a separator did not come from list()
        if id.is_empty() || id.contains(['/', '\\']) || id == "." || id == ".." {
            return Err(SyncError::MalformedInput(format!("invalid queue entry id '{}'", id)));
        }
        Ok(self.dir.join(id))
    }

    /// Same URI, same file name: re-queueing a URI does not create duplicates
    fn entry_name(uri: &str) -> String {
        let digest = Sha256::digest(uri.as_bytes());
        format!("{}.{}", hex::encode(digest), ENTRY_EXTENSION)
    }
}

impl DeletionQueue for DirectoryQueue {
    fn list(&self) -> Result<Vec<EntryId>> {
        if !self.dir.is_dir() {
            return Err(SyncError::NotFound(format!("queue directory {}", self.dir.display())));
        }

        let mut ids = Vec::new();
        for entry in walkdir::WalkDir::new(&self.dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("[DeletionQueue] Skipping unreadable entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                ids.push(name.to_string());
            }
        }
        Ok(ids)
    }

    fn read(&self, id: &str) -> Result<Vec<u8>> {
        Ok(fs::read(self.entry_path(id)?)?)
    }

    fn remove(&self, id: &str) -> Result<()> {
        match fs::remove_file(self.entry_path(id)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn enqueue(&self, uri: &str) -> Result<EntryId> {
        fs::create_dir_all(&self.dir)?;
        let name = Self::entry_name(uri);
        let tmp = self.dir.join(format!(".{}.tmp", name));
        fs::write(&tmp, QueueEntry::new(uri).encode()?)?;
        fs::rename(&tmp, self.dir.join(&name))?;
        tracing::debug!("[DeletionQueue] Queued {} as {}", uri, name);
        Ok(name)
    }
}

// ========== SQLITE BACKEND ==========

pub struct SqliteQueue {
    db: Database,
}

impl SqliteQueue {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn parse_id(id: &str) -> Result<i64> {
        id.parse::<i64>()
            .map_err(|_| SyncError::MalformedInput(format!("invalid queue entry id '{}'", id)))
    }
}

impl DeletionQueue for SqliteQueue {
    fn list(&self) -> Result<Vec<EntryId>> {
        let conn = connection::lock(&self.db)?;
        let ids = Repository::new(&conn).queue_ids()?;
        Ok(ids.into_iter().map(|id| id.to_string()).collect())
    }

    fn read(&self, id: &str) -> Result<Vec<u8>> {
        let entry_id = Self::parse_id(id)?;
        let conn = connection::lock(&self.db)?;
        Repository::new(&conn)
            .queue_read(entry_id)?
            .ok_or_else(|| SyncError::NotFound(format!("queue entry {}", id)))
    }

    fn remove(&self, id: &str) -> Result<()> {
        let entry_id = Self::parse_id(id)?;
        let conn = connection::lock(&self.db)?;
        Repository::new(&conn).queue_remove(entry_id)?;
        Ok(())
    }

    fn enqueue(&self, uri: &str) -> Result<EntryId> {
        let payload = QueueEntry::new(uri).encode()?;
        let conn = connection::lock(&self.db)?;
        let id = Repository::new(&conn).queue_push(&payload)?;
        Ok(id.to_string())
    }
}
