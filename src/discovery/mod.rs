//! Remote discovery of candidate standards.
//!
//! A [`DiscoverySource`] turns a query into `(code, title)` pairs. [`Discovery`] walks every
//! configured source and query sequentially, with bounded retries per query and a fixed pause
//! between queries. A failing query only loses that query's contribution: the failure is
//! recorded as a warning and the walk continues.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{
    config::DiscoveryConfig,
    error::SiteError,
    retry::{retry_with_backoff, RetryPolicy},
};

pub mod announcements;
pub mod registry;
pub mod search;

pub use announcements::AnnouncementSource;
pub use registry::RegistrySource;
pub use search::SearchSource;

/// A standard reported by an external source, not yet admitted to the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DiscoveryCandidate {
    pub code: String,
    pub title: String,
}

impl DiscoveryCandidate {
    pub fn new<C: Into<String>, T: Into<String>>(code: C, title: T) -> Self {
        DiscoveryCandidate {
            code: code.into(),
            title: title.into(),
        }
    }
}

#[async_trait]
pub trait DiscoverySource: Send + Sync {
    /// Short name used in logs and warnings.
    fn name(&self) -> &str;

    /// Queries this source is asked, in order.
    fn queries(&self) -> Vec<String>;

    async fn search(&self, query: &str) -> Result<Vec<DiscoveryCandidate>, SiteError>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscoveryReport {
    /// Every candidate in the order it was reported, duplicates included.
    pub candidates: Vec<DiscoveryCandidate>,
    pub warnings: Vec<String>,
    pub queries_run: usize,
    pub queries_failed: usize,
}

pub struct Discovery {
    sources: Vec<Box<dyn DiscoverySource>>,
    retry: RetryPolicy,
    request_delay: Duration,
}

impl Discovery {
    pub fn new(
        sources: Vec<Box<dyn DiscoverySource>>,
        retry: RetryPolicy,
        request_delay: Duration,
    ) -> Self {
        Discovery {
            sources,
            retry,
            request_delay,
        }
    }

    /// The HTTP sources enabled in `config`.
    pub fn from_config(config: &DiscoveryConfig) -> Result<Self, SiteError> {
        let client = http_client(config)?;
        let mut sources: Vec<Box<dyn DiscoverySource>> = Vec::new();
        if config.enable_search {
            sources.push(Box::new(SearchSource::new(
                client.clone(),
                &config.search_base_url,
                config.search_terms.clone(),
            )));
        }
        if config.enable_registry {
            sources.push(Box::new(RegistrySource::new(
                client.clone(),
                &config.registry_base_url,
                config.registry_keywords.clone(),
            )));
        }
        if config.enable_announcements {
            sources.push(Box::new(AnnouncementSource::new(
                client,
                &config.announcement_url,
            )));
        }
        Ok(Discovery::new(sources, config.retry, config.request_delay))
    }

    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_string()).collect()
    }

    pub async fn run(&self) -> DiscoveryReport {
        let mut report = DiscoveryReport::default();
        for source in &self.sources {
            for query in source.queries() {
                tracing::info!("🔍 {}: searching {:?}", source.name(), query);
                report.queries_run += 1;
                let label = format!("{} {:?}", source.name(), query);
                let result =
                    retry_with_backoff(&self.retry, &label, |_| source.search(&query)).await;
                match result {
                    Ok(found) => {
                        tracing::debug!("{label}: {} candidate(s)", found.len());
                        report.candidates.extend(found);
                    }
                    Err(err) => {
                        report.queries_failed += 1;
                        let warning = format!("{label}: {}", err.headline());
                        tracing::warn!("⚠️ discovery failed, continuing: {warning}");
                        report.warnings.push(warning);
                    }
                }
                if !self.request_delay.is_zero() {
                    tokio::time::sleep(self.request_delay).await;
                }
            }
        }
        report
    }
}

pub fn http_client(config: &DiscoveryConfig) -> Result<reqwest::Client, SiteError> {
    reqwest::Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(config.timeout)
        .build()
        .map_err(|e| SiteError::Network(format!("failed to create HTTP client: {e}")))
}

/// GET `url` and return the body, treating non-2xx statuses as errors.
pub(crate) async fn fetch_text(client: &reqwest::Client, url: &str) -> Result<String, SiteError> {
    let response = client
        .get(url)
        .header(reqwest::header::ACCEPT, "text/html,application/xhtml+xml")
        .send()
        .await?;
    let status = response.status();
    if !status.is_success() {
        return Err(SiteError::Network(format!("GET {url} returned HTTP {status}")));
    }
    Ok(response.text().await?)
}

/// Collapse whitespace and decode the handful of entities these listing pages use.
pub(crate) fn clean_text(raw: &str) -> String {
    let decoded = raw
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}
