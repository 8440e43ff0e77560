//! Image and slide-deck manifests (`<content_root>/<kind>/manifest.json`).

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    fs,
    path::{Path, PathBuf},
};

use super::ContentKind;
use crate::{
    error::SiteError,
    health::write_json,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaManifest {
    #[serde(default)]
    pub items: Vec<MediaItem>,
    #[serde(default)]
    pub updated_at: String,
}

impl MediaManifest {
    pub fn empty(now: DateTime<Utc>) -> Self {
        MediaManifest {
            items: Vec::new(),
            updated_at: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    pub fn path(content_root: &Path, kind: ContentKind) -> PathBuf {
        kind.dir(content_root).join("manifest.json")
    }

    /// Parse manifest JSON. Missing fields default, and an `items` value that is not a list
    /// reads as no items. Only invalid JSON or a malformed item is an error.
    pub fn parse(raw: &str) -> Result<MediaManifest, SiteError> {
        let value: Value = serde_json::from_str(raw)?;
        if !value.get("items").map(Value::is_array).unwrap_or(false) {
            let updated_at = value
                .get("updatedAt")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            return Ok(MediaManifest {
                items: Vec::new(),
                updated_at,
            });
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Parse the manifest file at `path`.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<MediaManifest, SiteError> {
        MediaManifest::parse(&fs::read_to_string(path)?)
    }

    /// The manifest for `kind`, or an empty one when the file is missing or unreadable.
    pub fn load(content_root: &Path, kind: ContentKind) -> MediaManifest {
        let path = MediaManifest::path(content_root, kind);
        if !path.exists() {
            return MediaManifest::empty(Utc::now());
        }
        match MediaManifest::read(&path) {
            Ok(manifest) => manifest,
            Err(err) => {
                tracing::warn!("ignoring unreadable manifest {}: {err}", path.display());
                MediaManifest::empty(Utc::now())
            }
        }
    }

    pub fn save(&self, content_root: &Path, kind: ContentKind) -> Result<(), SiteError> {
        write_json(MediaManifest::path(content_root, kind), self)
    }

    /// Items ordered newest first.
    pub fn sorted_items(&self) -> Vec<MediaItem> {
        let mut items = self.items.clone();
        items.sort_by(|a, b| b.date.cmp(&a.date));
        items
    }

    pub fn find(&self, id: &str) -> Option<&MediaItem> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Items whose file is absent from `<uploads_root>/<kind>/`.
    pub fn missing_files(&self, uploads_root: &Path, kind: ContentKind) -> Vec<&MediaItem> {
        let dir = uploads_root.join(kind.as_str());
        self.items
            .iter()
            .filter(|item| !dir.join(&item.filename).is_file())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn item(id: &str, filename: &str, date: &str) -> MediaItem {
        MediaItem {
            id: id.to_string(),
            title: id.to_uppercase(),
            description: String::new(),
            filename: filename.to_string(),
            thumbnail: None,
            tags: vec![],
            date: date.to_string(),
            source: None,
        }
    }

    #[test]
    fn missing_or_corrupt_manifest_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(MediaManifest::load(dir.path(), ContentKind::Images).items.is_empty());
        fs::create_dir_all(dir.path().join("images")).unwrap();
        fs::write(dir.path().join("images/manifest.json"), "{\"items\": 3}").unwrap();
        assert!(MediaManifest::load(dir.path(), ContentKind::Images).items.is_empty());
        fs::write(dir.path().join("images/manifest.json"), "not json").unwrap();
        assert!(MediaManifest::load(dir.path(), ContentKind::Images).items.is_empty());
    }

    #[test]
    fn sparse_manifests_parse() {
        assert_eq!(MediaManifest::parse("{}").unwrap().items, vec![]);
        let parsed = MediaManifest::parse(r#"{"items": [{"filename": "a.png"}]}"#).unwrap();
        assert_eq!(parsed.items.len(), 1);
        assert_eq!(parsed.items[0].filename, "a.png");
        assert_eq!(parsed.items[0].id, "");
        assert_eq!(parsed.updated_at, "");
        assert!(MediaManifest::parse("{ not json").is_err());
    }

    #[test]
    fn save_load_and_missing_files() {
        let dir = TempDir::new().unwrap();
        let content = dir.path().join("content");
        let uploads = dir.path().join("public/uploads");
        let mut manifest = MediaManifest::empty(Utc::now());
        manifest.items = vec![
            item("a", "a.png", "2026-01-02"),
            item("b", "b.png", "2026-03-04"),
        ];
        manifest.save(&content, ContentKind::Images).unwrap();
        fs::create_dir_all(uploads.join("images")).unwrap();
        fs::write(uploads.join("images/a.png"), b"png").unwrap();

        let loaded = MediaManifest::load(&content, ContentKind::Images);
        assert_eq!(loaded, manifest);
        assert_eq!(loaded.sorted_items()[0].id, "b");
        let missing: Vec<_> = loaded
            .missing_files(&uploads, ContentKind::Images)
            .into_iter()
            .map(|i| i.id.as_str())
            .collect();
        assert_eq!(missing, vec!["b"]);
        assert_eq!(loaded.find("a").unwrap().filename, "a.png");
    }
}
