// FILE: src/core/job_lock.rs
//! Per-job lock file.
//!
//! Two upload sweeps running side by side could both push the same pending file
//! before either writes its locator back. Every sweep entry point takes this lock
//! first. The lock is a file created with `create_new`, so it also works across
//! processes (system cron invoking the CLI while the daemon runs).

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use crate::error::Result;

/// Locks older than this are assumed to belong to a crashed run.
pub const STALE_AFTER: Duration = Duration::from_secs(600);

#[derive(Debug)]
pub struct JobLock {
    path: PathBuf,
}

impl JobLock {
    /// Try to take the lock for `job`. `Ok(None)` means another run holds it.
    pub fn acquire(lock_dir: &Path, job: &str) -> Result<Option<Self>> {
        Self::acquire_with(lock_dir, job, STALE_AFTER)
    }

    pub fn acquire_with(lock_dir: &Path, job: &str, stale_after: Duration) -> Result<Option<Self>> {
        fs::create_dir_all(lock_dir)?;
        let path = lock_dir.join(format!("{}.lock", job));

        for _ in 0..2 {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    record_owner(&mut file, &path);
                    tracing::debug!("[JobLock] Acquired {}", path.display());
                    return Ok(Some(Self { path }));
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if !Self::is_stale(&path, stale_after) {
                        return Ok(None);
                    }
                    tracing::warn!("[JobLock] Breaking stale lock {}", path.display());
                    match fs::remove_file(&path) {
                        Ok(()) => continue,
                        Err(e) if e.kind() == ErrorKind::NotFound => continue,
                        Err(e) => return Err(e.into()),
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(None)
    }

    fn is_stale(path: &Path, stale_after: Duration) -> bool {
        let modified = match fs::metadata(path).and_then(|m| m.modified()) {
            Ok(t) => t,
            // Vanished between create_new and stat: let the retry take it
            Err(_) => return true,
        };
        SystemTime::now()
            .duration_since(modified)
            .map(|age| age >= stale_after)
            .unwrap_or(false)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Write our pid into the lock file. Only informational: the lock is held
/// either way, a failed write is just logged.
fn record_owner(file: &mut impl Write, path: &Path) -> bool {
    match writeln!(file, "{}", std::process::id()) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("[JobLock] Failed to record owner in {}: {}", path.display(), e);
            false
        }
    }
}

impl Drop for JobLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!("[JobLock] Failed to release {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_is_exclusive_until_dropped() {
        let dir = tempfile::tempdir().unwrap();

        let first = JobLock::acquire(dir.path(), "upload_sweep").unwrap();
        assert!(first.is_some());
        assert!(JobLock::acquire(dir.path(), "upload_sweep").unwrap().is_none());

        // Different job names do not contend
        assert!(JobLock::acquire(dir.path(), "deletion_sweep").unwrap().is_some());

        drop(first);
        assert!(JobLock::acquire(dir.path(), "upload_sweep").unwrap().is_some());
    }

    #[test]
    fn test_stale_lock_is_broken() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("upload_sweep.lock"), "12345\n").unwrap();

        let lock = JobLock::acquire_with(dir.path(), "upload_sweep", Duration::ZERO).unwrap();
        assert!(lock.is_some());
    }

    struct FullDisk;

    impl Write for FullDisk {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(ErrorKind::Other, "no space left on device"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_owner_pid_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let lock = JobLock::acquire(dir.path(), "deletion_sweep").unwrap().unwrap();

        let contents = fs::read_to_string(lock.path()).unwrap();
        assert_eq!(contents.trim(), std::process::id().to_string());
    }

    #[test]
    fn test_failed_owner_write_is_reported() {
        let path = Path::new("/locks/upload_sweep.lock");
        assert!(!record_owner(&mut FullDisk, path));

        let mut buf = Vec::new();
        assert!(record_owner(&mut buf, path));
        assert_eq!(String::from_utf8(buf).unwrap().trim(), std::process::id().to_string());
    }
}
