//! National standard full-text registry listing.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use super::{clean_text, fetch_text, DiscoveryCandidate, DiscoverySource};
use crate::error::SiteError;

static LISTING_ROW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"class="std_code"[^>]*>([^<]+)<[\s\S]*?class="std_name"[^>]*>([^<]+)<"#)
        .expect("static regex")
});

pub struct RegistrySource {
    client: reqwest::Client,
    base_url: String,
    keywords: Vec<String>,
}

impl RegistrySource {
    pub fn new(client: reqwest::Client, base_url: &str, keywords: Vec<String>) -> Self {
        RegistrySource {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            keywords,
        }
    }

    /// Listing sorted by circulation date, newest first.
    pub fn query_url(&self, keyword: &str) -> Result<Url, SiteError> {
        Ok(Url::parse_with_params(
            &format!("{}/bzgk/gb/std_list", self.base_url),
            &[
                ("p.p1", "0"),
                ("p.p90", "circulation_date"),
                ("p.p91", "desc"),
                ("p.p2", keyword),
                ("p.p5", "PRODUCT_SORT"),
                ("p.p9", ""),
                ("p.p4", ""),
                ("p.p6", ""),
                ("p.p96", ""),
            ],
        )?)
    }
}

#[async_trait]
impl DiscoverySource for RegistrySource {
    fn name(&self) -> &str {
        "openstd"
    }

    fn queries(&self) -> Vec<String> {
        self.keywords.clone()
    }

    async fn search(&self, query: &str) -> Result<Vec<DiscoveryCandidate>, SiteError> {
        let url = self.query_url(query)?;
        let html = fetch_text(&self.client, url.as_str()).await?;
        Ok(parse_registry_listing(&html))
    }
}

pub fn parse_registry_listing(html: &str) -> Vec<DiscoveryCandidate> {
    LISTING_ROW
        .captures_iter(html)
        .filter_map(|caps| {
            let code = clean_text(&caps[1]);
            let title = clean_text(&caps[2]);
            (!code.is_empty() && !title.is_empty()).then(|| DiscoveryCandidate::new(code, title))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_listing_rows() {
        let html = r##"
<table>
<tr><td class="std_code" title="x">GBZ 2.1-2019</td>
    <td><a class="std_name" href="#">工作场所有害因素职业接触限值 第1部分：化学有害因素</a></td></tr>
<tr><td class="std_code">
  GB/T 23466-2009 </td><td class="std_name">护听器的选择指南</td></tr>
<tr><td class="std_code"></td><td class="std_name">空</td></tr>
</table>"##;
        let found = parse_registry_listing(html);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].code, "GBZ 2.1-2019");
        assert_eq!(found[0].title, "工作场所有害因素职业接触限值 第1部分：化学有害因素");
        assert_eq!(found[1], DiscoveryCandidate::new("GB/T 23466-2009", "护听器的选择指南"));
    }

    #[test]
    fn query_url_keeps_empty_params() {
        let source = RegistrySource::new(reqwest::Client::new(), "https://openstd.example", vec![]);
        let url = source.query_url("GBZ").unwrap();
        assert!(url.as_str().starts_with("https://openstd.example/bzgk/gb/std_list?p.p1=0"));
        assert!(url.as_str().contains("p.p2=GBZ"));
        assert!(url.as_str().ends_with("p.p96="));
    }
}
