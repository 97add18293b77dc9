//! Database connection management
//!
//! Opens the SQLite database that holds the file registry, the subtype
//! registry and (optionally) the deletion queue. One connection is shared
//! behind a mutex; callers never hold the guard across an `.await`.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use rusqlite::Connection;
use crate::error::{Result, SyncError};
use crate::storage::Repository;

/// Shared handle to the single SQLite connection
pub type Database = Arc<Mutex<Connection>>;

/// Open (or create) the database at `db_path` and make sure the schema exists.
pub fn open_database(db_path: &Path) -> Result<Database> {
    if let Some(db_dir) = db_path.parent() {
        std::fs::create_dir_all(db_dir)?;
    }

    let conn = Connection::open(db_path)?;

    // WAL lets the CLI read while the daemon writes
    let mode: String = conn.pragma_update_and_check(None, "journal_mode", WAL, |row| row.get(0))?;
    tracing::debug!("journal_mode={}", mode);
    conn.pragma_update(None, "foreign_keys", ON)?;
    conn.pragma_update(None, "synchronous", NORMAL)?;

    Repository::new(&conn).initialize()?;
    tracing::info!("Database ready: {}", db_path.display());

    Ok(Arc::new(Mutex::new(conn)))
}

/// In-memory database with the full schema. Used by tests and dry runs.
pub fn open_in_memory() -> Result<Database> {
    let conn = Connection::open_in_memory()?;
    Repository::new(&conn).initialize()?;
    Ok(Arc::new(Mutex::new(conn)))
}

pub fn lock(db: &Database) -> Result<MutexGuard<'_, Connection>> {
    db.lock().map_err(|_| SyncError::State("Poisoned lock".into()))
}

// SQL pragma constants
const WAL: &str = "WAL";
const ON: &str = "ON";
const NORMAL: &str = "NORMAL";
