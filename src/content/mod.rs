//! Flat-file content store: MDX documents with YAML front-matter under `<content_root>/<kind>/`.

use chrono::{NaiveDate, Utc};
use pulldown_cmark::{Event as MdEvent, Options, Parser, Tag as MdTag, TagEnd as MdTagEnd};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::{
    fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use walkdir::WalkDir;

use crate::error::SiteError;

pub mod frontmatter;
pub mod media;
pub mod writer;

pub use frontmatter::{build_document, build_frontmatter, UpsertContent};
pub use media::{MediaItem, MediaManifest};
pub use writer::{
    select_writer, write_content, ContentWriter, LocalWriter, RepoWriter, WrittenContent,
};

pub const DEFAULT_CATEGORY: &str = "未分类";
pub const DEFAULT_TAG: &str = "无标签";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Laws,
    Articles,
    Standards,
    Images,
    Ppts,
}

impl ContentKind {
    pub const ALL: [ContentKind; 5] = [
        ContentKind::Laws,
        ContentKind::Articles,
        ContentKind::Standards,
        ContentKind::Images,
        ContentKind::Ppts,
    ];

    /// Directory name under the content root.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Laws => "laws",
            ContentKind::Articles => "articles",
            ContentKind::Standards => "standards",
            ContentKind::Images => "images",
            ContentKind::Ppts => "ppts",
        }
    }

    /// Singular form, used as the fallback slug prefix.
    pub fn singular(&self) -> &'static str {
        let name = self.as_str();
        &name[..name.len() - 1]
    }

    /// Kinds stored as one MDX document per entry.
    pub fn is_document(&self) -> bool {
        matches!(self, ContentKind::Laws | ContentKind::Articles)
    }

    pub fn dir(&self, content_root: &Path) -> PathBuf {
        content_root.join(self.as_str())
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = SiteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContentKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| {
                SiteError::Config(format!(
                    "unknown content kind '{s}', expected one of laws, articles, standards, images, ppts"
                ))
            })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentType {
    Image,
    Pdf,
    Ppt,
    Mindmap,
    Audio,
    #[default]
    File,
}

impl AttachmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttachmentType::Image => "image",
            AttachmentType::Pdf => "pdf",
            AttachmentType::Ppt => "ppt",
            AttachmentType::Mindmap => "mindmap",
            AttachmentType::Audio => "audio",
            AttachmentType::File => "file",
        }
    }

    /// Unknown labels fall back to `file`.
    pub fn parse_lenient(label: &str) -> Self {
        match label {
            "image" => AttachmentType::Image,
            "pdf" => AttachmentType::Pdf,
            "ppt" => AttachmentType::Ppt,
            "mindmap" => AttachmentType::Mindmap,
            "audio" => AttachmentType::Audio,
            _ => AttachmentType::File,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentAttachment {
    pub name: String,
    pub url: String,
    #[serde(rename = "type", default)]
    pub kind: AttachmentType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentMeta {
    pub slug: String,
    pub title: String,
    pub summary: String,
    pub date: String,
    pub tags: Vec<String>,
    pub category: String,
    pub author: Option<String>,
    pub source: Option<String>,
    pub attachments: Vec<ContentAttachment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentDetail {
    #[serde(flatten)]
    pub meta: ContentMeta,
    pub content: String,
}

/// URL-safe slug from `input`. Inputs that reduce to fewer than three characters (for example
/// all-CJK titles) get `"{prefix}-{epoch_ms}"` instead.
pub fn create_slug(input: &str, prefix: &str) -> String {
    let kept: String = input
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace() || *c == '-')
        .collect();
    let dashed = kept.split_whitespace().collect::<Vec<_>>().join("-");
    let normalized = dashed
        .split('-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    if normalized.len() >= 3 {
        normalized
    } else {
        format!("{prefix}-{}", Utc::now().timestamp_millis())
    }
}

/// Split a document into its YAML front-matter (if any) and the remaining body.
pub fn split_frontmatter(raw: &str) -> (Option<String>, &str) {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_YAML_STYLE_METADATA_BLOCKS);
    let mut yaml: Option<String> = None;
    for (event, range) in Parser::new_ext(raw, options).into_offset_iter() {
        match event {
            MdEvent::Start(MdTag::MetadataBlock(_)) => yaml = Some(String::new()),
            MdEvent::Text(text) => match yaml.as_mut() {
                Some(accum) => accum.push_str(&text),
                None => break,
            },
            MdEvent::End(MdTagEnd::MetadataBlock(_)) => {
                let body = raw.get(range.end..).unwrap_or_default();
                return (yaml, body);
            }
            _ => break,
        }
    }
    (None, raw)
}

fn string_field(data: &Mapping, key: &str) -> Option<String> {
    match data.get(key) {
        Some(Value::String(s)) => Some(s.clone()),
        _ => None,
    }
}

fn string_list(data: &Mapping, key: &str) -> Vec<String> {
    match data.get(key) {
        Some(Value::Sequence(items)) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::trim))
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn attachments(data: &Mapping) -> Vec<ContentAttachment> {
    let Some(Value::Sequence(items)) = data.get("attachments") else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let record = item.as_mapping()?;
            let name = string_field(record, "name").filter(|s| !s.is_empty())?;
            let url = string_field(record, "url").filter(|s| !s.is_empty())?;
            let kind = string_field(record, "type")
                .map(|t| AttachmentType::parse_lenient(&t))
                .unwrap_or_default();
            Some(ContentAttachment { name, url, kind })
        })
        .collect()
}

/// Parse one document. Missing fields fall back to the file's slug, today's date and the
/// default category.
pub fn parse_document(slug: &str, raw: &str) -> Result<ContentDetail, SiteError> {
    let (yaml, body) = split_frontmatter(raw);
    let data = match yaml.as_deref().map(serde_yaml::from_str::<Value>).transpose()? {
        Some(Value::Mapping(map)) => map,
        _ => Mapping::new(),
    };
    let today = Utc::now().format("%Y-%m-%d").to_string();
    let meta = ContentMeta {
        slug: slug.to_string(),
        title: string_field(&data, "title").unwrap_or_else(|| slug.to_string()),
        summary: string_field(&data, "summary").unwrap_or_default(),
        date: string_field(&data, "date").unwrap_or(today),
        tags: string_list(&data, "tags"),
        category: string_field(&data, "category").unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
        author: string_field(&data, "author").filter(|s| !s.is_empty()),
        source: string_field(&data, "source").filter(|s| !s.is_empty()),
        attachments: attachments(&data),
    };
    Ok(ContentDetail {
        meta,
        content: body.trim().to_string(),
    })
}

fn is_markdown(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            ext == "md" || ext == "mdx"
        })
        .unwrap_or(false)
}

fn slug_of(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

pub fn read_document<P: AsRef<Path>>(path: P) -> Result<ContentDetail, SiteError> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)?;
    parse_document(&slug_of(path), &raw)
}

/// Markdown files directly under the kind's directory. A missing directory is empty.
pub fn document_paths(content_root: &Path, kind: ContentKind) -> Vec<PathBuf> {
    let dir = kind.dir(content_root);
    if !dir.exists() {
        return Vec::new();
    }
    let mut paths: Vec<PathBuf> = WalkDir::new(&dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && is_markdown(entry.path()))
        .map(|entry| entry.into_path())
        .collect();
    paths.sort();
    paths
}

fn date_key(date: &str) -> i64 {
    NaiveDate::parse_from_str(date.get(..10).unwrap_or(date), "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or(0)
}

/// Every readable document of `kind`, newest first.
pub fn list_documents(content_root: &Path, kind: ContentKind) -> Vec<ContentMeta> {
    let mut records: Vec<ContentMeta> = document_paths(content_root, kind)
        .into_iter()
        .filter_map(|path| match read_document(&path) {
            Ok(detail) => Some(detail.meta),
            Err(err) => {
                tracing::warn!("skipping unreadable document {}: {err}", path.display());
                None
            }
        })
        .collect();
    records.sort_by_key(|meta| std::cmp::Reverse(date_key(&meta.date)));
    records
}

pub fn find_document(
    content_root: &Path,
    kind: ContentKind,
    slug: &str,
) -> Result<Option<ContentDetail>, SiteError> {
    let dir = kind.dir(content_root);
    for ext in ["mdx", "md"] {
        let path = dir.join(format!("{slug}.{ext}"));
        if path.is_file() {
            return read_document(&path).map(Some);
        }
    }
    Ok(None)
}

/// Sorted, distinct tags across all documents of `kind`.
pub fn all_tags(content_root: &Path, kind: ContentKind) -> Vec<String> {
    let mut tags: Vec<String> = list_documents(content_root, kind)
        .into_iter()
        .flat_map(|meta| meta.tags)
        .collect();
    tags.sort();
    tags.dedup();
    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugs_keep_ascii_words() {
        assert_eq!(create_slug("  Noise -- Exposure  Limits ", "article"), "noise-exposure-limits");
        assert_eq!(create_slug("GBZ/T 188-2014", "law"), "gbzt-188-2014");
    }

    #[test]
    fn short_slugs_fall_back_to_prefix_and_time() {
        let slug = create_slug("职业病防治法", "law");
        let (prefix, millis) = slug.split_once('-').unwrap();
        assert_eq!(prefix, "law");
        assert!(millis.parse::<i64>().is_ok());
    }

    #[test]
    fn kind_names() {
        assert_eq!(ContentKind::Articles.singular(), "article");
        assert_eq!("PPTS".parse::<ContentKind>().unwrap(), ContentKind::Ppts);
        assert!("videos".parse::<ContentKind>().is_err());
    }

    #[test]
    fn frontmatter_and_body_are_split() {
        let raw = "---\ntitle: \"噪声\"\ntags:\n  - a\n---\n\n# Heading\n\nBody\n";
        let (yaml, body) = split_frontmatter(raw);
        assert!(yaml.unwrap().contains("title"));
        assert_eq!(body.trim(), "# Heading\n\nBody");
    }

    #[test]
    fn documents_without_frontmatter_get_defaults() {
        let detail = parse_document("plain-note", "Just text.\n").unwrap();
        assert_eq!(detail.meta.title, "plain-note");
        assert_eq!(detail.meta.category, DEFAULT_CATEGORY);
        assert!(detail.meta.tags.is_empty());
        assert_eq!(detail.content, "Just text.");
    }

    #[test]
    fn unknown_attachment_types_become_files() {
        let raw = "---\nattachments:\n  - name: a\n    url: /a.bin\n    type: video\n  - name: b\n---\n";
        let detail = parse_document("x", raw).unwrap();
        assert_eq!(
            detail.meta.attachments,
            vec![ContentAttachment {
                name: "a".to_string(),
                url: "/a.bin".to_string(),
                kind: AttachmentType::File,
            }]
        );
    }
}
