//! The standards catalog: one JSON document holding every known standard.
//!
//! ```json
//! { "standards": [ { "id": 1, "code": "GBZ 1-2010", "title": "...", ... } ],
//!   "categories": ["基础标准", ...],
//!   "stats": { "total": 1 },
//!   "generatedAt": "2026-10-19T08:00:00.000Z" }
//! ```
//!
//! [`CatalogSnapshot::parse`] is the only way external JSON becomes a snapshot. It checks the
//! raw document shape first, so malformed input is rejected with a precise reason before any
//! business logic sees it, then deserializes into strict types and checks the uniqueness
//! invariants. Fields this crate does not model are carried through untouched.

use chrono::{DateTime, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{
    collections::{BTreeSet, HashSet},
    fs,
    path::Path,
};

use crate::error::SiteError;

static TRAILING_YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-(\d{4})$").expect("static regex"));

/// Lifecycle state of a standard. Stored with the site's display labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum StandardStatus {
    #[default]
    #[serde(rename = "现行", alias = "current")]
    Current,
    #[serde(rename = "废止", alias = "withdrawn")]
    Withdrawn,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StandardEntry {
    pub id: u64,
    pub code: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub full_title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default)]
    pub status: StandardStatus,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub category: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub slug: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StandardEntry {
    /// Build a catalog row for a newly discovered standard.
    pub fn discovered(id: u64, code: &str, title: &str, category: &str, current_year: i32) -> Self {
        StandardEntry {
            id,
            code: code.to_string(),
            title: title.to_string(),
            full_title: format!("{code} {title}"),
            year: Some(year_from_code(code, current_year)),
            status: StandardStatus::Current,
            category: category.to_string(),
            slug: code_to_slug(code),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogStats {
    #[serde(default)]
    pub total: usize,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSnapshot {
    pub standards: Vec<StandardEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    #[serde(default)]
    pub stats: CatalogStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CatalogSnapshot {
    pub fn new(standards: Vec<StandardEntry>) -> Self {
        let total = standards.len();
        CatalogSnapshot {
            standards,
            categories: Vec::new(),
            stats: CatalogStats {
                total,
                extra: Map::new(),
            },
            generated_at: None,
            extra: Map::new(),
        }
    }

    /// Parse and validate a catalog document.
    pub fn parse(raw: &str) -> Result<Self, SiteError> {
        let value: Value = serde_json::from_str(raw)?;
        validate_document(&value)?;
        let snapshot: CatalogSnapshot = serde_json::from_value(value)?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SiteError> {
        tracing::debug!("Reading catalog {:?}", path.as_ref());
        let raw = fs::read_to_string(path)?;
        CatalogSnapshot::parse(&raw)
    }

    /// Structural invariants: non-empty, every row has a code and title, ids and codes unique.
    pub fn validate(&self) -> Result<(), SiteError> {
        if self.standards.is_empty() {
            return Err(SiteError::Validation("catalog has no standards".to_string()));
        }
        let mut ids = HashSet::new();
        let mut codes = HashSet::new();
        for (idx, entry) in self.standards.iter().enumerate() {
            if entry.code.trim().is_empty() {
                return Err(SiteError::Validation(format!(
                    "standard #{idx} (id {}) has an empty code",
                    entry.id
                )));
            }
            if entry.title.trim().is_empty() {
                return Err(SiteError::Validation(format!(
                    "standard {} has an empty title",
                    entry.code
                )));
            }
            if !ids.insert(entry.id) {
                return Err(SiteError::Validation(format!(
                    "duplicate id {} (code {})",
                    entry.id, entry.code
                )));
            }
            if !codes.insert(entry.code.as_str()) {
                return Err(SiteError::Validation(format!(
                    "duplicate code {}",
                    entry.code
                )));
            }
        }
        Ok(())
    }

    pub fn max_id(&self) -> u64 {
        self.standards.iter().map(|s| s.id).max().unwrap_or(0)
    }

    /// Codes of every row, trimmed.
    pub fn codes(&self) -> HashSet<String> {
        self.standards.iter().map(|s| s.code.trim().to_string()).collect()
    }

    /// Append new rows, registering any category the catalog does not list yet.
    pub fn append(&mut self, entries: Vec<StandardEntry>) {
        let known: BTreeSet<String> = self.categories.iter().cloned().collect();
        let mut added = BTreeSet::new();
        for entry in &entries {
            if !self.categories.is_empty()
                && !entry.category.is_empty()
                && !known.contains(&entry.category)
                && added.insert(entry.category.clone())
            {
                self.categories.push(entry.category.clone());
            }
        }
        self.standards.extend(entries);
        self.stats.total = self.standards.len();
    }

    /// Refresh the derived `stats.total` and `generatedAt` fields.
    pub fn stamp(&mut self, now: DateTime<Utc>) {
        self.stats.total = self.standards.len();
        self.generated_at = Some(now.to_rfc3339_opts(SecondsFormat::Millis, true));
    }

    pub fn to_json(&self) -> Result<String, SiteError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Overwrite the catalog file. The new content is written next to the target and renamed
    /// over it so readers never see a half-written document.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), SiteError> {
        let path = path.as_ref();
        let json = self.to_json()?;
        write_atomic(path, json.as_bytes())
    }
}

pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), SiteError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "catalog.json".to_string());
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Shape checks on the raw JSON, run before typed deserialization.
fn validate_document(value: &Value) -> Result<(), SiteError> {
    let object = value
        .as_object()
        .ok_or_else(|| SiteError::Validation("catalog is not a JSON object".to_string()))?;
    let standards = object
        .get("standards")
        .and_then(Value::as_array)
        .ok_or_else(|| SiteError::Validation("`standards` is not a list".to_string()))?;
    if standards.is_empty() {
        return Err(SiteError::Validation("catalog has no standards".to_string()));
    }
    let mut ids = HashSet::new();
    for (idx, row) in standards.iter().enumerate() {
        let row = row
            .as_object()
            .ok_or_else(|| SiteError::Validation(format!("standard #{idx} is not an object")))?;
        let id = row
            .get("id")
            .and_then(Value::as_u64)
            .ok_or_else(|| SiteError::Validation(format!("standard #{idx} has no numeric id")))?;
        for field in ["code", "title"] {
            let present = row
                .get(field)
                .and_then(Value::as_str)
                .map(|s| !s.trim().is_empty())
                .unwrap_or(false);
            if !present {
                return Err(SiteError::Validation(format!(
                    "standard #{idx} (id {id}) is missing `{field}`"
                )));
            }
        }
        if !ids.insert(id) {
            return Err(SiteError::Validation(format!("duplicate id {id}")));
        }
    }
    Ok(())
}

/// URL-safe identifier derived from a standard code: `GBZ/T 300.1-2017` → `gbz-t-3001-2017`.
pub fn code_to_slug(code: &str) -> String {
    let mut slug = String::with_capacity(code.len());
    for c in code.to_lowercase().chars() {
        let c = if c == '/' || c.is_whitespace() { '-' } else { c };
        if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
            if c == '-' && slug.ends_with('-') {
                continue;
            }
            slug.push(c);
        }
    }
    slug
}

/// Year from a trailing `-YYYY` on the code, otherwise `current_year`.
///
/// The fallback mirrors the catalog's historical behavior for codes without a year suffix; it
/// is awaiting product-owner confirmation.
pub fn year_from_code(code: &str, current_year: i32) -> i32 {
    TRAILING_YEAR
        .captures(code.trim())
        .and_then(|caps| caps[1].parse().ok())
        .unwrap_or(current_year)
}
