//! Title-keyword search on the standards download site.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use super::{clean_text, fetch_text, DiscoveryCandidate, DiscoverySource};
use crate::error::SiteError;

/// `>GBZ/T 189.8-2007 工作场所物理因素测量 第8部分：噪声<`
static RESULT_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r">((?:GBZ|GB|WS)[/\s]*T?\s*[\d.]+-\d{4})\s+([^<]+)<").expect("static regex")
});

pub struct SearchSource {
    client: reqwest::Client,
    base_url: String,
    terms: Vec<String>,
}

impl SearchSource {
    pub fn new(client: reqwest::Client, base_url: &str, terms: Vec<String>) -> Self {
        SearchSource {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            terms,
        }
    }

    pub fn query_url(&self, term: &str) -> Result<Url, SiteError> {
        Ok(Url::parse_with_params(
            &format!("{}/plus/search.php", self.base_url),
            &[("keyword", term), ("searchtype", "titlekeyword")],
        )?)
    }
}

#[async_trait]
impl DiscoverySource for SearchSource {
    fn name(&self) -> &str {
        "biaozhun"
    }

    fn queries(&self) -> Vec<String> {
        self.terms.clone()
    }

    async fn search(&self, query: &str) -> Result<Vec<DiscoveryCandidate>, SiteError> {
        let url = self.query_url(query)?;
        let html = fetch_text(&self.client, url.as_str()).await?;
        Ok(parse_search_results(&html))
    }
}

pub fn parse_search_results(html: &str) -> Vec<DiscoveryCandidate> {
    RESULT_LINK
        .captures_iter(html)
        .filter_map(|caps| {
            let code = clean_text(&caps[1]);
            let title = clean_text(&caps[2]);
            (!code.is_empty() && !title.is_empty()).then(|| DiscoveryCandidate::new(code, title))
        })
        .collect()
}
