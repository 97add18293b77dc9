// FILE: src/engine/uploader.rs
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use crate::config::Config;
use crate::core::{derive_key, ObjectLocation};
use crate::error::{Result, SyncError};
use crate::remote::ObjectStore;
use crate::storage::{DeletionQueue, FileCatalog, FileRecord};

pub struct Uploader {
    config: Arc<Config>,
    catalog: Arc<dyn FileCatalog>,
    store: Arc<dyn ObjectStore>,
    /// Takes objects whose record vanished mid-upload
    queue: Arc<dyn DeletionQueue>,
}

impl Uploader {
    pub fn new(
        config: Arc<Config>,
        catalog: Arc<dyn FileCatalog>,
        store: Arc<dyn ObjectStore>,
        queue: Arc<dyn DeletionQueue>,
    ) -> Self {
        Self { config, catalog, store, queue }
    }

    /// Push one pending file to the store and record where it went:
    /// 1. Check the record (valid id, no locator, safe relative path, file on disk)
    /// 2. Derive the storage key
    /// 3. Stream the file with a private ACL
    /// 4. Write the locator back (write-once)
    ///
    /// Nothing is written to the record unless the put succeeded.
    pub async fn upload(&self, record: &FileRecord) -> Result<String> {
        let key = derive_key(record)?;
        if record.is_synced() {
            return Err(SyncError::AlreadySynced(record.file_id));
        }

        let source = self.resolve_source(record)?;
        let bucket = self.config.bucket()?;
        let location = ObjectLocation::new(bucket, key);

        tracing::debug!("[Uploader] Uploading {} to {}", record, location);
        let locator = self.store.put_file(&location, &source, &record.mime_type).await?;

        if !self.catalog.set_remote_locator(record.file_id, &locator)? {
            return Err(self.lost_write_back(record, &locator)?);
        }

        tracing::info!("[Uploader] Synced {} -> {}", record, locator);
        Ok(locator)
    }

    /// The locator could not be recorded. Either another run synced the record
    /// first (its locator stands) or the record was deleted during the put, in
    /// which case the new object goes straight to the deletion queue.
    fn lost_write_back(&self, record: &FileRecord, locator: &str) -> Result<SyncError> {
        if self.catalog.get_file(record.file_id)?.is_some() {
            tracing::warn!("[Uploader] {} was synced concurrently, keeping existing locator", record);
            return Ok(SyncError::AlreadySynced(record.file_id));
        }

        match self.queue.enqueue(locator) {
            Ok(entry) => {
                tracing::warn!("[Uploader] {} was removed during upload, queued {} for deletion ({})", record, locator, entry);
                Ok(SyncError::NotFound(format!("file {} was removed during upload", record.file_id)))
            }
            Err(e) => {
                tracing::error!("[Uploader] {} was removed during upload and {} could not be queued: {}", record, locator, e);
                Err(e)
            }
        }
    }

    fn resolve_source(&self, record: &FileRecord) -> Result<PathBuf> {
        let rel = Path::new(record.rel_path.trim());
        let escapes = rel.components().any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if record.rel_path.trim().is_empty() || escapes {
            return Err(SyncError::MalformedInput(format!(
                "file {} has unusable path '{}'", record.file_id, record.rel_path
            )));
        }

        let path = self.config.paths.data_root.join(rel);
        if !path.is_file() {
            return Err(SyncError::NotFound(format!("{} (file {})", path.display(), record.file_id)));
        }
        Ok(path)
    }
}
