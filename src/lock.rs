//! File-based run lock.
//!
//! At most one run per lock path is active at a time on one machine. The lock file holds the
//! owner's pid and acquisition time; a lock older than the staleness threshold, or one that
//! cannot be parsed, is presumed abandoned by a crashed run and is cleared. This is best-effort
//! exclusion for cron overlap, not a distributed lock.

use serde::{Deserialize, Serialize};
use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use crate::error::SiteError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub pid: u32,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

impl LockRecord {
    pub fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms.saturating_sub(self.timestamp)
    }
}

#[derive(Debug)]
pub enum LockAcquisition {
    Acquired(RunLock),
    /// Another live run holds the lock.
    Held(LockRecord),
}

/// Held lock. Released explicitly with [`RunLock::release`], or on drop.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    record: LockRecord,
    released: bool,
}

impl RunLock {
    pub fn acquire<P: AsRef<Path>>(
        path: P,
        stale_after: Duration,
        now_ms: i64,
    ) -> Result<LockAcquisition, SiteError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let record = LockRecord {
            pid: std::process::id(),
            timestamp: now_ms,
        };

        // Two passes: the second one runs after clearing a stale lock.
        for _ in 0..2 {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(mut file) => {
                    file.write_all(serde_json::to_string(&record)?.as_bytes())?;
                    tracing::debug!("lock acquired: {} (pid {})", path.display(), record.pid);
                    return Ok(LockAcquisition::Acquired(RunLock {
                        path: path.to_path_buf(),
                        record,
                        released: false,
                    }));
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                    match read_record(path) {
                        // Stale once its age reaches `stale_after`.
                        Some(holder) if holder.age_ms(now_ms) < stale_after.as_millis() as i64 => {
                            tracing::info!(
                                "⏳ lock {} held by pid {} for {}s, skipping",
                                path.display(),
                                holder.pid,
                                holder.age_ms(now_ms) / 1000
                            );
                            return Ok(LockAcquisition::Held(holder));
                        }
                        Some(holder) => {
                            tracing::warn!(
                                "clearing stale lock {} (pid {}, {}s old)",
                                path.display(),
                                holder.pid,
                                holder.age_ms(now_ms) / 1000
                            );
                        }
                        None => {
                            tracing::warn!("clearing unreadable lock {}", path.display());
                        }
                    }
                    match fs::remove_file(path) {
                        Ok(()) => {}
                        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                        Err(e) => return Err(e.into()),
                    }
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(SiteError::Lock(format!(
            "could not acquire {} after clearing a stale lock",
            path.display()
        )))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self) -> LockRecord {
        self.record
    }

    pub fn release(mut self) -> Result<(), SiteError> {
        self.released = true;
        match fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::debug!("lock released: {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if !self.released {
            let _ = fs::remove_file(&self.path);
        }
    }
}

/// Current lock holder, if the lock file exists and parses.
pub fn read_record<P: AsRef<Path>>(path: P) -> Option<LockRecord> {
    let raw = fs::read_to_string(path).ok()?;
    serde_json::from_str(&raw).ok()
}
