//! In-memory stand-ins for the remote services, plus a fixture that wires them
//! to a real SQLite catalog and directory queue in a temp dir.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use async_trait::async_trait;
use tempfile::TempDir;
use crate::config::Config;
use crate::core::{object_url, ObjectLocation};
use crate::engine::Uploader;
use crate::error::{Result, SyncError};
use crate::remote::{ClientProvider, ObjectStore, TextDetection, VisionService};
use crate::state::SyncContext;
use crate::storage::{
    self, DeletionQueue, DirectoryQueue, FileCatalog, FileRecord, NewFile, PendingCursor, SqliteCatalog,
};

pub const FAKE_ENDPOINT: &str = "http://store.test";
pub const SUBTYPE: &str = "attachment";

type ObjectKey = (String, String);

#[derive(Default)]
pub struct FakeStore {
    objects: Mutex<HashMap<ObjectKey, (Vec<u8>, String)>>,
    puts: AtomicUsize,
    deletes: AtomicUsize,
    fail_puts: AtomicBool,
    fail_deletes: AtomicBool,
    /// Keys whose HEAD fails
    unverifiable: Mutex<HashSet<String>>,
    /// Keys that survive DELETE
    sticky: Mutex<HashSet<String>>,
    delay: Mutex<Duration>,
}

impl FakeStore {
    pub fn insert(&self, bucket: &str, key: &str, bytes: &[u8]) {
        self.objects.lock().unwrap()
            .insert((bucket.into(), key.into()), (bytes.to_vec(), String::new()));
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(&(bucket.into(), key.into())).map(|(b, _)| b.clone())
    }

    pub fn content_type(&self, bucket: &str, key: &str) -> Option<String> {
        self.objects.lock().unwrap().get(&(bucket.into(), key.into())).map(|(_, c)| c.clone())
    }

    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn fail_puts(&self) {
        self.fail_puts.store(true, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self) {
        self.fail_deletes.store(true, Ordering::SeqCst);
    }

    pub fn make_unverifiable(&self, key: &str) {
        self.unverifiable.lock().unwrap().insert(key.into());
    }

    pub fn make_sticky(&self, key: &str) {
        self.sticky.lock().unwrap().insert(key.into());
    }

    /// Every put and delete takes this long (virtual time under a paused clock)
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    async fn pause(&self) {
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl ObjectStore for FakeStore {
    async fn put_file(&self, location: &ObjectLocation, source: &Path, content_type: &str) -> Result<String> {
        self.pause().await;
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(SyncError::Service { operation: "PutObject", status: 503, message: "SlowDown".into() });
        }
        let bytes = std::fs::read(source)?;
        self.objects.lock().unwrap().insert(
            (location.bucket.clone(), location.key.clone()),
            (bytes, content_type.to_string()),
        );
        Ok(object_url(FAKE_ENDPOINT, &location.bucket, &location.key))
    }

    async fn exists(&self, location: &ObjectLocation) -> Result<bool> {
        if self.unverifiable.lock().unwrap().contains(&location.key) {
            return Err(SyncError::Transport("connection reset".into()));
        }
        Ok(self.objects.lock().unwrap().contains_key(&(location.bucket.clone(), location.key.clone())))
    }

    async fn delete(&self, location: &ObjectLocation) -> Result<()> {
        self.pause().await;
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(SyncError::Transport("connection reset".into()));
        }
        if !self.sticky.lock().unwrap().contains(&location.key) {
            self.objects.lock().unwrap().remove(&(location.bucket.clone(), location.key.clone()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeVision {
    detections: Mutex<Vec<TextDetection>>,
    calls: AtomicUsize,
    last: Mutex<Option<ObjectLocation>>,
    fail: AtomicBool,
}

impl FakeVision {
    pub fn respond_with(&self, detections: Vec<TextDetection>) {
        *self.detections.lock().unwrap() = detections;
    }

    pub fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_location(&self) -> Option<ObjectLocation> {
        self.last.lock().unwrap().clone()
    }
}

#[async_trait]
impl VisionService for FakeVision {
    async fn detect_text(&self, location: &ObjectLocation) -> Result<Vec<TextDetection>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some(location.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(SyncError::Transport("timed out".into()));
        }
        Ok(self.detections.lock().unwrap().clone())
    }
}

/// Hands out the fakes; `store: None` behaves like a misconfigured factory.
pub struct FakeProvider {
    pub store: Option<Arc<FakeStore>>,
    pub vision: Arc<FakeVision>,
}

impl ClientProvider for FakeProvider {
    fn storage(&self) -> Result<Arc<dyn ObjectStore>> {
        match &self.store {
            Some(store) => Ok(Arc::clone(store) as Arc<dyn ObjectStore>),
            None => Err(SyncError::ConfigurationInvalid("missing access key id or secret".into())),
        }
    }

    fn vision(&self) -> Result<Arc<dyn VisionService>> {
        Ok(Arc::clone(&self.vision) as Arc<dyn VisionService>)
    }
}

/// Real catalog whose record deletes always fail
pub struct FailingCatalog {
    inner: Arc<SqliteCatalog>,
}

impl FailingCatalog {
    pub fn new(inner: Arc<SqliteCatalog>) -> Self {
        Self { inner }
    }
}

impl FileCatalog for FailingCatalog {
    fn registered_subtypes(&self) -> Result<Vec<String>> {
        self.inner.registered_subtypes()
    }

    fn is_file_like(&self, subtype: &str) -> bool {
        self.inner.is_file_like(subtype)
    }

    fn pending_batch(&self, subtypes: &[String], after: Option<PendingCursor>, limit: usize) -> Result<Vec<FileRecord>> {
        self.inner.pending_batch(subtypes, after, limit)
    }

    fn get_file(&self, file_id: i64) -> Result<Option<FileRecord>> {
        self.inner.get_file(file_id)
    }

    fn set_remote_locator(&self, file_id: i64, locator: &str) -> Result<bool> {
        self.inner.set_remote_locator(file_id, locator)
    }

    fn forget_file(&self, _file_id: i64) -> Result<Option<FileRecord>> {
        Err(SyncError::State("database is locked".into()))
    }
}

pub struct Fixture {
    pub dir: TempDir,
    pub config: Arc<Config>,
    pub catalog: Arc<SqliteCatalog>,
    pub queue: Arc<DirectoryQueue>,
    pub store: Arc<FakeStore>,
    pub vision: Arc<FakeVision>,
    pub ctx: SyncContext,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(adjust: impl FnOnce(&mut Config)) -> Self {
        let dir = tempfile::tempdir().unwrap();

        let mut config = Config::default();
        config.storage.access_key_id = "AKID".into();
        config.storage.secret_access_key = "secret".into();
        config.storage.bucket = "media".into();
        config.paths.database = dir.path().join("bucketeer.db");
        config.paths.data_root = dir.path().join("files");
        config.paths.queue_dir = dir.path().join("queue");
        config.paths.lock_dir = dir.path().join("locks");
        adjust(&mut config);

        std::fs::create_dir_all(&config.paths.data_root).unwrap();
        std::fs::create_dir_all(&config.paths.queue_dir).unwrap();
        let config = Arc::new(config);

        let catalog = Arc::new(SqliteCatalog::new(storage::open_in_memory().unwrap()));
        catalog.register_subtype(SUBTYPE, true).unwrap();
        let queue = Arc::new(DirectoryQueue::new(&config.paths.queue_dir));
        let store = Arc::new(FakeStore::default());
        let vision = Arc::new(FakeVision::default());

        let provider = FakeProvider { store: Some(Arc::clone(&store)), vision: Arc::clone(&vision) };
        let ctx = SyncContext::new(
            Arc::clone(&config),
            Arc::clone(&catalog) as Arc<dyn FileCatalog>,
            Arc::clone(&queue) as Arc<dyn DeletionQueue>,
            Arc::new(provider),
        );

        Self { dir, config, catalog, queue, store, vision, ctx }
    }

    /// Same fixture, but the storage client cannot be built
    pub fn without_storage(mut self) -> Self {
        self.ctx.clients = Arc::new(FakeProvider { store: None, vision: Arc::clone(&self.vision) });
        self
    }

    /// Register a record without putting anything on disk
    pub fn add_record(&self, owner_id: i64, filename: &str, mime_type: &str, created_at: i64) -> FileRecord {
        let rel_path = format!("{}/{}", owner_id, filename);
        let file_id = self.catalog
            .register_file(&NewFile {
                owner_id,
                subtype: SUBTYPE,
                filename,
                rel_path: &rel_path,
                mime_type,
                created_at: Some(created_at),
            })
            .unwrap();
        self.catalog.get_file(file_id).unwrap().unwrap()
    }

    pub fn add_file(&self, owner_id: i64, filename: &str, mime_type: &str, contents: &[u8], created_at: i64) -> FileRecord {
        let record = self.add_record(owner_id, filename, mime_type, created_at);
        let path = self.config.paths.data_root.join(&record.rel_path);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
        record
    }

    pub fn uploader(&self) -> Uploader {
        Uploader::new(
            Arc::clone(&self.config),
            Arc::clone(&self.catalog) as Arc<dyn FileCatalog>,
            Arc::clone(&self.store) as Arc<dyn ObjectStore>,
            Arc::clone(&self.queue) as Arc<dyn DeletionQueue>,
        )
    }

    pub fn pending(&self) -> Vec<FileRecord> {
        self.catalog.pending_batch(&[SUBTYPE.to_string()], None, 1000).unwrap()
    }

    pub fn queued(&self) -> Vec<String> {
        self.queue.list().unwrap()
    }
}
