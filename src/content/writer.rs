//! Persist content documents locally or through a source-repository contents API.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::NaiveDate;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use super::{create_slug, frontmatter::build_document, ContentKind, UpsertContent};
use crate::{
    config::{RepoConfig, SiteConfig},
    error::SiteError,
};

#[async_trait]
pub trait ContentWriter: Send + Sync {
    fn name(&self) -> &str;

    /// Create or overwrite the file at `relative_path` (relative to the site root). Returns where
    /// the file ended up.
    async fn write(&self, relative_path: &str, content: &str) -> Result<String, SiteError>;
}

/// Writes under the site root on local disk.
#[derive(Debug, Clone)]
pub struct LocalWriter {
    site_root: PathBuf,
}

impl LocalWriter {
    pub fn new<P: AsRef<Path>>(site_root: P) -> Self {
        LocalWriter {
            site_root: site_root.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl ContentWriter for LocalWriter {
    fn name(&self) -> &str {
        "local"
    }

    async fn write(&self, relative_path: &str, content: &str) -> Result<String, SiteError> {
        let path = self.site_root.join(relative_path);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content).await?;
        tracing::info!("✍️ wrote {}", path.display());
        Ok(path.to_string_lossy().to_string())
    }
}

/// A file as returned by the contents API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteFile {
    pub sha: String,
    #[serde(default)]
    pub content: String,
}

impl RemoteFile {
    pub fn decoded(&self) -> Result<String, SiteError> {
        let compact: String = self.content.split_whitespace().collect();
        Ok(String::from_utf8(BASE64.decode(compact)?)?)
    }
}

#[derive(Debug, Serialize)]
struct PutBody<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<String>,
}

#[derive(Debug, Serialize)]
struct DeleteBody<'a> {
    message: &'a str,
    sha: &'a str,
    branch: &'a str,
}

/// Writes through the hosted repository's contents API
/// (`GET`/`PUT`/`DELETE /repos/{repo}/contents/{path}`).
#[derive(Debug, Clone)]
pub struct RepoWriter {
    client: Client,
    config: RepoConfig,
    token: String,
}

impl RepoWriter {
    pub fn new(config: RepoConfig, token: String) -> Result<Self, SiteError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("ohsite-core/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(RepoWriter {
            client,
            config,
            token,
        })
    }

    fn contents_url(&self, relative_path: &str) -> Result<Url, SiteError> {
        let mut url = Url::parse(&self.config.api_base_url)?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                SiteError::Config(format!(
                    "contents API base '{}' cannot carry a path",
                    self.config.api_base_url
                ))
            })?;
            segments.pop_if_empty().push("repos");
            segments.extend(self.config.repo.split('/').filter(|s| !s.is_empty()));
            segments.push("contents");
            segments.extend(self.config.path_prefix.split('/').filter(|s| !s.is_empty()));
            segments.extend(relative_path.split('/').filter(|s| !s.is_empty()));
        }
        Ok(url)
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        req.bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, "application/vnd.github.v3+json")
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, SiteError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            Err(SiteError::Remote { status, message })
        }
    }

    /// The file at `relative_path`, or `None` when it does not exist.
    pub async fn get(&self, relative_path: &str) -> Result<Option<RemoteFile>, SiteError> {
        let mut url = self.contents_url(relative_path)?;
        url.query_pairs_mut().append_pair("ref", &self.config.branch);
        let response = self.authorized(self.client.get(url)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::check(response).await?;
        Ok(Some(response.json().await?))
    }

    /// Create or update, passing the current sha when the file already exists.
    pub async fn put(
        &self,
        relative_path: &str,
        content: &str,
        message: &str,
    ) -> Result<(), SiteError> {
        let sha = self.get(relative_path).await?.map(|file| file.sha);
        let body = PutBody {
            message,
            content: BASE64.encode(content.as_bytes()),
            branch: &self.config.branch,
            sha,
        };
        let url = self.contents_url(relative_path)?;
        let response = self.authorized(self.client.put(url)).json(&body).send().await?;
        Self::check(response).await?;
        tracing::info!("✍️ committed {relative_path} to {}", self.config.repo);
        Ok(())
    }

    pub async fn delete(&self, relative_path: &str, message: &str) -> Result<(), SiteError> {
        let file = self
            .get(relative_path)
            .await?
            .ok_or_else(|| {
                SiteError::NotFound(format!("{relative_path} in {}", self.config.repo))
            })?;
        let body = DeleteBody {
            message,
            sha: &file.sha,
            branch: &self.config.branch,
        };
        let url = self.contents_url(relative_path)?;
        let response = self.authorized(self.client.delete(url)).json(&body).send().await?;
        Self::check(response).await?;
        tracing::info!("🗑️ deleted {relative_path} from {}", self.config.repo);
        Ok(())
    }
}

#[async_trait]
impl ContentWriter for RepoWriter {
    fn name(&self) -> &str {
        "repo"
    }

    async fn write(&self, relative_path: &str, content: &str) -> Result<String, SiteError> {
        self.put(relative_path, content, &format!("content: auto-add {relative_path}"))
            .await?;
        Ok(relative_path.to_string())
    }
}

/// Remote writer when `repo.remote_writes` is on and a token is available, local otherwise.
pub fn select_writer(config: &SiteConfig) -> Result<Box<dyn ContentWriter>, SiteError> {
    if config.repo.remote_writes {
        match config.repo.token() {
            Some(token) => return Ok(Box::new(RepoWriter::new(config.repo.clone(), token)?)),
            None => tracing::warn!(
                "remote writes enabled but ${} is not set, writing locally",
                config.repo.token_env
            ),
        }
    }
    Ok(Box::new(LocalWriter::new(&config.site_root)))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenContent {
    pub slug: String,
    /// `content/<kind>/<slug>.mdx`, relative to the site root.
    pub relative_path: String,
    pub location: String,
}

/// Build the document for `payload` and hand it to `writer`.
pub async fn write_content(
    writer: &dyn ContentWriter,
    kind: ContentKind,
    payload: &UpsertContent,
    today: NaiveDate,
) -> Result<WrittenContent, SiteError> {
    if !kind.is_document() {
        return Err(SiteError::Validation(format!(
            "{kind} entries are not stored as documents"
        )));
    }
    if payload.title.trim().is_empty() {
        return Err(SiteError::Validation("content title is empty".to_string()));
    }
    let slug_input = payload.slug.as_deref().unwrap_or(&payload.title);
    let slug = create_slug(slug_input, kind.singular());
    let relative_path = format!("content/{kind}/{slug}.mdx");
    let document = build_document(payload, &slug, today);
    let location = writer.write(&relative_path, &document).await?;
    tracing::debug!("{} writer stored {relative_path}", writer.name());
    Ok(WrittenContent {
        slug,
        relative_path,
        location,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn writer(base: &str) -> RepoWriter {
        let config = RepoConfig {
            api_base_url: base.to_string(),
            repo: "owner/site-repo".to_string(),
            path_prefix: "site".to_string(),
            ..RepoConfig::default()
        };
        RepoWriter::new(config, "t0ken".to_string()).unwrap()
    }

    #[test]
    fn contents_url_joins_repo_prefix_and_path() {
        let url = writer("https://api.example.com")
            .contents_url("content/articles/noise.mdx")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.com/repos/owner/site-repo/contents/site/content/articles/noise.mdx"
        );
    }

    #[test]
    fn remote_content_is_decoded_across_line_breaks() {
        let encoded = BASE64.encode("职业卫生\n".as_bytes());
        let (a, b) = encoded.split_at(4);
        let file = RemoteFile {
            sha: "abc".to_string(),
            content: format!("{a}\n{b}\n"),
        };
        assert_eq!(file.decoded().unwrap(), "职业卫生\n");
    }

    #[tokio::test]
    async fn media_kinds_are_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let writer = LocalWriter::new(dir.path());
        let payload = UpsertContent {
            title: "x".to_string(),
            ..Default::default()
        };
        let today = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        let result = write_content(&writer, ContentKind::Images, &payload, today).await;
        assert!(matches!(result, Err(SiteError::Validation(_))));
    }
}
