//! Single-record health files polled by external monitoring.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, fs, path::Path};

use crate::{catalog::write_atomic, error::SiteError};

/// Terminal status of a catalog update run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    Ok,
    Error,
    Partial,
    Skipped,
    DryRun,
    Crash,
}

impl RunStatus {
    /// Whether the process should exit non-zero.
    pub fn is_failure(&self) -> bool {
        matches!(self, RunStatus::Error | RunStatus::Crash)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let label = match self {
            RunStatus::Ok => "ok",
            RunStatus::Error => "error",
            RunStatus::Partial => "partial",
            RunStatus::Skipped => "skipped",
            RunStatus::DryRun => "dry-run",
            RunStatus::Crash => "crash",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub status: RunStatus,
    pub last_run: String,
    pub catalog_count: usize,
    pub new_standards: usize,
    pub errors: Vec<String>,
}

impl HealthStatus {
    pub fn new(status: RunStatus, at: DateTime<Utc>) -> Self {
        HealthStatus {
            status,
            last_run: at.to_rfc3339_opts(SecondsFormat::Millis, true),
            catalog_count: 0,
            new_standards: 0,
            errors: Vec::new(),
        }
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, SiteError> {
        read_json(path)
    }

    /// Overwrite the health record.
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<(), SiteError> {
        write_json(path, self)
    }
}

pub(crate) fn read_json<T: serde::de::DeserializeOwned, P: AsRef<Path>>(
    path: P,
) -> Result<T, SiteError> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

pub(crate) fn write_json<T: Serialize, P: AsRef<Path>>(
    path: P,
    value: &T,
) -> Result<(), SiteError> {
    let json = serde_json::to_string_pretty(value)?;
    write_atomic(path.as_ref(), json.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn wire_format() {
        let at = Utc.with_ymd_and_hms(2026, 10, 19, 8, 30, 0).unwrap();
        let mut health = HealthStatus::new(RunStatus::DryRun, at);
        health.catalog_count = 120;
        health.new_standards = 2;
        let value = serde_json::to_value(&health).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "status": "dry-run",
                "lastRun": "2026-10-19T08:30:00.000Z",
                "catalogCount": 120,
                "newStandards": 2,
                "errors": []
            })
        );
    }

    #[test]
    fn write_then_read() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("health.json");
        let mut health = HealthStatus::new(RunStatus::Partial, Utc::now());
        health.errors.push("push: rejected".to_string());
        health.write(&path).unwrap();
        assert_eq!(HealthStatus::read(&path).unwrap(), health);
    }

    #[test]
    fn display_matches_serialized_label() {
        for status in [
            RunStatus::Ok,
            RunStatus::Error,
            RunStatus::Partial,
            RunStatus::Skipped,
            RunStatus::DryRun,
            RunStatus::Crash,
        ] {
            assert_eq!(
                serde_json::to_value(status).unwrap(),
                serde_json::Value::String(status.to_string())
            );
        }
    }
}
