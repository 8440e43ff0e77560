//! Timestamped catalog backups with bounded retention.
//!
//! Backups are named `<stem>.<YYYYMMDDTHHMMSSmmmZ>.<seq>.json`. The sequence number makes names
//! unique even when two backups land in the same millisecond. Listing only considers names of
//! exactly that shape and orders them by timestamp, then sequence number.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::error::SiteError;

/// `<timestamp>.<seq>.json`, the part of a backup name after `<stem>.`.
static BACKUP_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{8}T\d{9}Z)\.(\d{3,})\.json$").expect("static regex"));

#[derive(Debug, Clone)]
pub struct BackupStore {
    dir: PathBuf,
    stem: String,
    retention: usize,
}

impl BackupStore {
    /// Backups of files named `<stem>.json`, kept in `dir`.
    pub fn new<P: AsRef<Path>>(dir: P, stem: &str, retention: usize) -> Self {
        BackupStore {
            dir: dir.as_ref().to_path_buf(),
            stem: stem.to_string(),
            retention,
        }
    }

    /// Store for backups of `source`, named after its file stem.
    pub fn for_file<P: AsRef<Path>, Q: AsRef<Path>>(dir: P, source: Q, retention: usize) -> Self {
        let stem = source
            .as_ref()
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "backup".to_string());
        BackupStore::new(dir, &stem, retention)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Timestamp and sequence number of a file name this store wrote, `None` for anything else.
    fn parse_name(&self, name: &str) -> Option<(String, u64)> {
        let rest = name.strip_prefix(&self.stem)?.strip_prefix('.')?;
        let caps = BACKUP_SUFFIX.captures(rest)?;
        Some((caps[1].to_string(), caps[2].parse().ok()?))
    }

    /// Copy `source` into a new backup file and return its path.
    pub fn backup<P: AsRef<Path>>(
        &self,
        source: P,
        now: DateTime<Utc>,
    ) -> Result<PathBuf, SiteError> {
        fs::create_dir_all(&self.dir)?;
        let stamp = now.format("%Y%m%dT%H%M%S%3fZ");
        let mut seq = 0u32;
        let target = loop {
            let candidate = self.dir.join(format!("{}.{stamp}.{seq:03}.json", self.stem));
            if !candidate.exists() {
                break candidate;
            }
            seq += 1;
        };
        fs::copy(source.as_ref(), &target)?;
        tracing::info!("🗄️ backup written: {}", target.display());
        Ok(target)
    }

    /// Existing backups, oldest first.
    pub fn list(&self) -> Result<Vec<PathBuf>, SiteError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut backups = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(key) = self.parse_name(&name) {
                if entry.file_type()?.is_file() {
                    backups.push((key, entry.path()));
                }
            }
        }
        backups.sort();
        Ok(backups.into_iter().map(|(_, path)| path).collect())
    }

    /// Delete all but the newest `retention` backups. Returns the removed paths.
    pub fn prune(&self) -> Result<Vec<PathBuf>, SiteError> {
        let backups = self.list()?;
        let excess = backups.len().saturating_sub(self.retention);
        let mut removed = Vec::with_capacity(excess);
        for path in backups.into_iter().take(excess) {
            fs::remove_file(&path)?;
            tracing::debug!("pruned backup {}", path.display());
            removed.push(path);
        }
        Ok(removed)
    }

    /// Copy `backup` back over `target`.
    pub fn restore<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        backup: P,
        target: Q,
    ) -> Result<(), SiteError> {
        let bytes = fs::read(backup.as_ref())?;
        crate::catalog::write_atomic(target.as_ref(), &bytes)?;
        tracing::warn!(
            "↩️ restored {} from {}",
            target.as_ref().display(),
            backup.as_ref().display()
        );
        Ok(())
    }
}
