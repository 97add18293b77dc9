// FILE: src/storage/repository.rs
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use rusqlite::types::Value;
use crate::error::{Result, SyncError};
use crate::storage::FileRecord;

const RECORD_COLUMNS: &str =
    "file_id, owner_id, subtype, filename, rel_path, mime_type, remote_locator, created_at";

/// Fields the application supplies when it registers a file
#[derive(Debug, Clone)]
pub struct NewFile<'a> {
    pub owner_id: i64,
    pub subtype: &'a str,
    pub filename: &'a str,
    pub rel_path: &'a str,
    pub mime_type: &'a str,
    /// Unix seconds; `None` means now
    pub created_at: Option<i64>,
}

pub struct Repository<'a> {
    conn: &'a Connection,
}

impl<'a> Repository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn initialize(&self) -> Result<()> {
        // 1. File Registry (owned by the application, we only write remote_locator)
        self.conn.execute_batch(r#"
            CREATE TABLE IF NOT EXISTS file_registry (
                file_id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id INTEGER NOT NULL,
                subtype TEXT NOT NULL,
                filename TEXT NOT NULL,
                rel_path TEXT NOT NULL,
                mime_type TEXT NOT NULL DEFAULT '',
                remote_locator TEXT,
                created_at INTEGER NOT NULL DEFAULT (unixepoch())
            );

            CREATE INDEX IF NOT EXISTS idx_file_registry_pending
                ON file_registry(created_at, file_id)
                WHERE remote_locator IS NULL OR remote_locator = '';
        "#).map_err(SyncError::Database)?;

        // 2. Subtype Registry (is_file = 0 marks registrations that are not file-like)
        self.conn.execute_batch(r#"
            CREATE TABLE IF NOT EXISTS subtypes (
                name TEXT PRIMARY KEY,
                is_file INTEGER NOT NULL DEFAULT 1,
                registered_at INTEGER DEFAULT (unixepoch())
            );
        "#).map_err(SyncError::Database)?;

        // 3. Deletion Queue (only used by the sqlite queue backend)
        self.conn.execute_batch(r#"
            CREATE TABLE IF NOT EXISTS deletion_queue (
                entry_id INTEGER PRIMARY KEY AUTOINCREMENT,
                payload BLOB NOT NULL,
                enqueued_at INTEGER DEFAULT (unixepoch())
            );
        "#).map_err(SyncError::Database)?;

        Ok(())
    }

    // ========== FILE REGISTRY ==========

    pub fn register_file(&self, file: &NewFile<'_>) -> Result<i64> {
        let mut stmt = self.conn.prepare(
            "INSERT INTO file_registry (owner_id, subtype, filename, rel_path, mime_type, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, COALESCE(?6, unixepoch()))
             RETURNING file_id"
        )?;
        let file_id = stmt.query_row(
            params![file.owner_id, file.subtype, file.filename, file.rel_path, file.mime_type, file.created_at],
            |row| row.get::<_, i64>(0),
        )?;
        tracing::debug!("Registered file: {} (file_id: {})", file.rel_path, file_id);
        Ok(file_id)
    }

    pub fn get_file(&self, file_id: i64) -> Result<Option<FileRecord>> {
        let sql = format!("SELECT {} FROM file_registry WHERE file_id = ?1", RECORD_COLUMNS);
        let record = self.conn
            .query_row(&sql, params![file_id], row_to_record)
            .optional()?;
        Ok(record)
    }

    /// Next page of pending files of the given subtypes, oldest first.
    /// `after` is the `(created_at, file_id)` of the last record already seen.
    pub fn pending_batch(&self, subtypes: &[String], after: Option<(i64, i64)>, limit: usize) -> Result<Vec<FileRecord>> {
        if subtypes.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let placeholders = (0..subtypes.len())
            .map(|i| format!("?{}", i + 4))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {} FROM file_registry
             WHERE (remote_locator IS NULL OR remote_locator = '')
               AND (?1 IS NULL OR created_at > ?1 OR (created_at = ?1 AND file_id > ?2))
               AND subtype IN ({})
             ORDER BY created_at ASC, file_id ASC
             LIMIT ?3",
            RECORD_COLUMNS, placeholders
        );

        let mut values: Vec<Value> = vec![
            after.map(|(ts, _)| Value::Integer(ts)).unwrap_or(Value::Null),
            Value::Integer(after.map(|(_, id)| id).unwrap_or(0)),
            Value::Integer(limit as i64),
        ];
        values.extend(subtypes.iter().map(|s| Value::Text(s.clone())));

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), row_to_record)?;

        let mut records = Vec::new();
        for r in rows { records.push(r?); }
        Ok(records)
    }

    /// Write the locator only if the record does not have one yet.
    /// Returns false when nothing was written (already synced or gone).
    pub fn set_remote_locator(&self, file_id: i64, locator: &str) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE file_registry SET remote_locator = ?2
             WHERE file_id = ?1 AND (remote_locator IS NULL OR remote_locator = '')",
            params![file_id, locator],
        )?;
        Ok(rows > 0)
    }

    /// Delete the local record, returning it as it was.
    pub fn delete_file(&self, file_id: i64) -> Result<Option<FileRecord>> {
        let Some(record) = self.get_file(file_id)? else {
            return Ok(None);
        };
        self.conn.execute("DELETE FROM file_registry WHERE file_id = ?1", params![file_id])?;
        Ok(Some(record))
    }

    /// (pending, synced)
    pub fn file_counts(&self) -> Result<(u64, u64)> {
        let counts = self.conn.query_row(
            "SELECT
                COALESCE(SUM(CASE WHEN remote_locator IS NULL OR remote_locator = '' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN remote_locator IS NULL OR remote_locator = '' THEN 0 ELSE 1 END), 0)
             FROM file_registry",
            [],
            |row| Ok((row.get::<_, u64>(0)?, row.get::<_, u64>(1)?)),
        )?;
        Ok(counts)
    }

    // ========== SUBTYPES ==========

    pub fn register_subtype(&self, name: &str, is_file: bool) -> Result<()> {
        self.conn.execute(
            "INSERT INTO subtypes (name, is_file) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET is_file = excluded.is_file",
            params![name, if is_file { 1 } else { 0 }],
        )?;
        Ok(())
    }

    pub fn registered_subtypes(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT name FROM subtypes ORDER BY name")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut names = Vec::new();
        for r in rows { names.push(r?); }
        Ok(names)
    }

    pub fn is_file_subtype(&self, name: &str) -> Result<bool> {
        let is_file = self.conn
            .query_row("SELECT is_file FROM subtypes WHERE name = ?1", params![name], |row| row.get::<_, i64>(0))
            .optional()?;
        Ok(is_file == Some(1))
    }

    // ========== DELETION QUEUE ==========

    pub fn queue_push(&self, payload: &[u8]) -> Result<i64> {
        self.conn.execute("INSERT INTO deletion_queue (payload) VALUES (?1)", params![payload])?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn queue_ids(&self) -> Result<Vec<i64>> {
        let mut stmt = self.conn.prepare("SELECT entry_id FROM deletion_queue ORDER BY entry_id")?;
        let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;
        let mut ids = Vec::new();
        for r in rows { ids.push(r?); }
        Ok(ids)
    }

    pub fn queue_read(&self, entry_id: i64) -> Result<Option<Vec<u8>>> {
        let payload = self.conn
            .query_row("SELECT payload FROM deletion_queue WHERE entry_id = ?1", params![entry_id], |row| row.get::<_, Vec<u8>>(0))
            .optional()?;
        Ok(payload)
    }

    pub fn queue_remove(&self, entry_id: i64) -> Result<bool> {
        let rows = self.conn.execute("DELETE FROM deletion_queue WHERE entry_id = ?1", params![entry_id])?;
        Ok(rows > 0)
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        file_id: row.get(0)?,
        owner_id: row.get(1)?,
        subtype: row.get(2)?,
        filename: row.get(3)?,
        rel_path: row.get(4)?,
        mime_type: row.get(5)?,
        remote_locator: row.get::<_, Option<String>>(6)?.filter(|l| !l.is_empty()),
        created_at: row.get(7)?,
    })
}
