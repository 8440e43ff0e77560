//! Front-matter and document assembly for written content.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{ContentAttachment, DEFAULT_CATEGORY, DEFAULT_TAG};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpsertContent {
    pub slug: Option<String>,
    pub title: String,
    pub summary: Option<String>,
    pub date: Option<String>,
    pub tags: Vec<String>,
    pub category: Option<String>,
    pub author: Option<String>,
    pub source: Option<String>,
    pub attachments: Vec<ContentAttachment>,
    pub content: String,
}

/// Double-quoted YAML scalar. JSON string syntax is a subset of YAML's double-quoted style, and
/// quoting keeps values such as dates from being read back as non-strings.
fn quoted(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("\"{}\"", value.replace('"', "\\\"")))
}

/// The `---` delimited header for `payload`, ending with an empty line.
pub fn build_frontmatter(payload: &UpsertContent, slug: &str, today: NaiveDate) -> String {
    let date = payload
        .date
        .clone()
        .unwrap_or_else(|| today.format("%Y-%m-%d").to_string());
    let category = payload.category.as_deref().unwrap_or(DEFAULT_CATEGORY);

    let mut lines = vec![
        "---".to_string(),
        format!("slug: {}", quoted(slug)),
        format!("title: {}", quoted(&payload.title)),
        format!("summary: {}", quoted(payload.summary.as_deref().unwrap_or_default())),
        format!("date: {}", quoted(&date)),
        format!("category: {}", quoted(category)),
    ];
    if let Some(author) = payload.author.as_deref().filter(|s| !s.is_empty()) {
        lines.push(format!("author: {}", quoted(author)));
    }
    if let Some(source) = payload.source.as_deref().filter(|s| !s.is_empty()) {
        lines.push(format!("source: {}", quoted(source)));
    }

    lines.push("tags:".to_string());
    let tags: Vec<&str> = payload
        .tags
        .iter()
        .map(String::as_str)
        .filter(|t| !t.is_empty())
        .collect();
    if tags.is_empty() {
        lines.push(format!("  - {}", quoted(DEFAULT_TAG)));
    } else {
        lines.extend(tags.iter().map(|tag| format!("  - {}", quoted(tag))));
    }

    if payload.attachments.is_empty() {
        lines.push("attachments: []".to_string());
    } else {
        lines.push("attachments:".to_string());
        for attachment in &payload.attachments {
            lines.push(format!("  - name: {}", quoted(&attachment.name)));
            lines.push(format!("    url: {}", quoted(&attachment.url)));
            lines.push(format!("    type: {}", quoted(attachment.kind.as_str())));
        }
    }

    lines.push("---".to_string());
    lines.push(String::new());
    lines.join("\n")
}

/// Front-matter followed by the body with trailing whitespace stripped from every line.
pub fn build_document(payload: &UpsertContent, slug: &str, today: NaiveDate) -> String {
    let body = payload
        .content
        .split('\n')
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n");
    format!("{}{body}\n", build_frontmatter(payload, slug, today))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{parse_document, AttachmentType};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    #[test]
    fn defaults_are_filled_in() {
        let payload = UpsertContent {
            title: "噪声作业 \"分级\"".to_string(),
            content: "line one   \nline two\t".to_string(),
            ..Default::default()
        };
        let doc = build_document(&payload, "noise-grading", today());
        assert!(doc.starts_with("---\nslug: \"noise-grading\"\n"));
        assert!(doc.contains("date: \"2026-10-19\"\n"));
        assert!(doc.contains("category: \"未分类\"\n"));
        assert!(doc.contains("tags:\n  - \"无标签\"\n"));
        assert!(doc.contains("attachments: []\n"));
        assert!(doc.ends_with("---\nline one\nline two\n"));
    }

    #[test]
    fn written_document_reads_back() {
        let payload = UpsertContent {
            title: "Hearing \\ protection".to_string(),
            summary: Some("ear: muffs".to_string()),
            tags: vec!["噪声".to_string(), String::new(), "PPE".to_string()],
            author: Some("Xu".to_string()),
            attachments: vec![ContentAttachment {
                name: "slides".to_string(),
                url: "/uploads/ppts/a.pptx".to_string(),
                kind: AttachmentType::Ppt,
            }],
            content: "# Body".to_string(),
            ..Default::default()
        };
        let doc = build_document(&payload, "hearing-protection", today());
        let detail = parse_document("hearing-protection", &doc).unwrap();
        assert_eq!(detail.meta.title, "Hearing \\ protection");
        assert_eq!(detail.meta.summary, "ear: muffs");
        assert_eq!(detail.meta.date, "2026-10-19");
        assert_eq!(detail.meta.tags, vec!["噪声".to_string(), "PPE".to_string()]);
        assert_eq!(detail.meta.author.as_deref(), Some("Xu"));
        assert_eq!(detail.meta.source, None);
        assert_eq!(detail.meta.attachments, payload.attachments);
        assert_eq!(detail.content, "# Body");
    }
}
