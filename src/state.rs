// FILE: src/state.rs

use std::sync::Arc;
use crate::config::{Config, QueueBackend};
use crate::error::Result;
use crate::remote::{ClientProvider, HttpClientFactory};
use crate::storage::{self, DeletionQueue, DirectoryQueue, FileCatalog, SqliteCatalog, SqliteQueue};

/// Everything a sweep needs, passed explicitly. Cloning is cheap.
#[derive(Clone)]
pub struct SyncContext {
    pub config: Arc<Config>,
    pub catalog: Arc<dyn FileCatalog>,
    pub queue: Arc<dyn DeletionQueue>,
    pub clients: Arc<dyn ClientProvider>,
}

/// Context shared between the scheduler's jobs
pub type SharedContext = Arc<SyncContext>;

impl SyncContext {
    pub fn new(
        config: Arc<Config>,
        catalog: Arc<dyn FileCatalog>,
        queue: Arc<dyn DeletionQueue>,
        clients: Arc<dyn ClientProvider>,
    ) -> Self {
        Self { config, catalog, queue, clients }
    }
}

/// The local side: the SQLite catalog plus whichever queue backend is configured.
pub struct LocalStores {
    pub catalog: Arc<SqliteCatalog>,
    pub queue: Arc<dyn DeletionQueue>,
}

impl LocalStores {
    pub fn open(config: &Config) -> Result<Self> {
        let db = storage::open_database(&config.paths.database)?;

        let queue: Arc<dyn DeletionQueue> = match config.queue.backend {
            QueueBackend::Directory => {
                std::fs::create_dir_all(&config.paths.queue_dir)?;
                Arc::new(DirectoryQueue::new(&config.paths.queue_dir))
            }
            QueueBackend::Sqlite => Arc::new(SqliteQueue::new(Arc::clone(&db))),
        };
        tracing::debug!("Deletion queue backend: {:?}", config.queue.backend);

        Ok(Self { catalog: Arc::new(SqliteCatalog::new(db)), queue })
    }

    /// Wire the local stores to the HTTP clients
    pub fn into_context(self, config: Arc<Config>) -> SyncContext {
        let clients = Arc::new(HttpClientFactory::new(Arc::clone(&config)));
        SyncContext::new(config, self.catalog, self.queue, clients)
    }
}
