//! Health-commission announcement page, scanned for newly published GBZ codes.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use super::{clean_text, fetch_text, DiscoveryCandidate, DiscoverySource};
use crate::error::SiteError;

/// A GBZ code followed by its title, optionally wrapped in 《》.
static ANNOUNCED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(GBZ[/\s]*T?\s*[\d.]+-\d{4})\s*《?([^<》\n]+)").expect("static regex")
});

pub struct AnnouncementSource {
    client: reqwest::Client,
    url: String,
}

impl AnnouncementSource {
    pub fn new(client: reqwest::Client, url: &str) -> Self {
        AnnouncementSource {
            client,
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl DiscoverySource for AnnouncementSource {
    fn name(&self) -> &str {
        "nhc"
    }

    /// The page takes no query.
    fn queries(&self) -> Vec<String> {
        vec![String::new()]
    }

    async fn search(&self, _query: &str) -> Result<Vec<DiscoveryCandidate>, SiteError> {
        let html = fetch_text(&self.client, &self.url).await?;
        Ok(parse_announcements(&html))
    }
}

/// Distinct announced codes with a title, first occurrence kept.
pub fn parse_announcements(html: &str) -> Vec<DiscoveryCandidate> {
    let mut seen = HashSet::new();
    ANNOUNCED
        .captures_iter(html)
        .filter_map(|caps| {
            let code = clean_text(&caps[1]);
            let title = clean_text(&caps[2])
                .trim_matches(|c: char| c == '》' || c == '、' || c == '，')
                .to_string();
            if title.is_empty() || !seen.insert(code.clone()) {
                return None;
            }
            Some(DiscoveryCandidate::new(code, title))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_distinct_codes_with_titles() {
        let html = r#"
<li><a href="/1.shtml">关于发布 GBZ 49-2025《职业性噪声聋的诊断》等标准的通告</a></li>
<li><a href="/2.shtml">GBZ/T 189.8-2025 工作场所物理因素测量 噪声</a></li>
<li><a href="/3.shtml">GBZ 49-2025《职业性噪声聋的诊断》解读</a></li>
<li><a href="/4.shtml">GBZ 50-2025</a></li>
"#;
        let found = parse_announcements(html);
        assert_eq!(
            found,
            vec![
                DiscoveryCandidate::new("GBZ 49-2025", "职业性噪声聋的诊断"),
                DiscoveryCandidate::new("GBZ/T 189.8-2025", "工作场所物理因素测量 噪声"),
            ]
        );
    }
}
