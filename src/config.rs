//! Site and job configuration.
//!
//! Every job takes a [`SiteConfig`] at construction time. Nothing is read from ambient
//! globals: the CLI loads the config (TOML file, then `OHSITE_*` environment overrides) and
//! tests build one around a temporary directory with [`SiteConfig::for_site`].
//!
//! Relative paths in the config are resolved against `site_root`; runtime files (lock, health
//! record, log) live in `state_dir`, which defaults to the system temp directory.

use crate::{error::SiteError, retry::RetryPolicy};
use serde::{Deserialize, Serialize};
use std::{
    env,
    fs::read_to_string,
    path::{Path, PathBuf},
    time::Duration,
};

pub const ENV_CONFIG: &str = "OHSITE_CONFIG";
pub const ENV_SITE_ROOT: &str = "OHSITE_SITE_ROOT";
pub const ENV_STATE_DIR: &str = "OHSITE_STATE_DIR";

/// Serialize a [`Duration`] as integer milliseconds.
pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub site_root: PathBuf,
    pub content_root: PathBuf,
    pub catalog_path: PathBuf,
    pub backup_dir: PathBuf,
    pub backup_retention: usize,
    pub state_dir: PathBuf,
    #[serde(with = "duration_ms", rename = "lock_stale_after_ms")]
    pub lock_stale_after: Duration,
    /// Log files larger than this are cut down before the subscriber is installed.
    pub log_max_bytes: u64,
    pub log_keep_bytes: u64,
    pub discovery: DiscoveryConfig,
    pub publish: PublishConfig,
    pub repo: RepoConfig,
    pub maintain: MaintainConfig,
}

impl Default for SiteConfig {
    fn default() -> Self {
        SiteConfig {
            site_root: PathBuf::from("."),
            content_root: PathBuf::from("content"),
            catalog_path: PathBuf::from("content/standards/standards-catalog.json"),
            backup_dir: PathBuf::from("content/standards/backups"),
            backup_retention: 10,
            state_dir: env::temp_dir(),
            lock_stale_after: Duration::from_secs(30 * 60),
            log_max_bytes: 5 * 1024 * 1024,
            log_keep_bytes: 1024 * 1024,
            discovery: DiscoveryConfig::default(),
            publish: PublishConfig::default(),
            repo: RepoConfig::default(),
            maintain: MaintainConfig::default(),
        }
    }
}

impl SiteConfig {
    /// Default configuration for a site checked out at `root`.
    pub fn for_site<P: AsRef<Path>>(root: P) -> Self {
        SiteConfig {
            site_root: root.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    /// Place the lock, health and log files under `dir`.
    pub fn with_state_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.state_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Load a TOML config file. A relative `site_root` is taken relative to the file's directory.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SiteError> {
        let path = path.as_ref();
        tracing::debug!("Reading site config from: {:?}", path);
        let content = read_to_string(path)
            .map_err(|e| SiteError::Config(format!("cannot read {}: {e}", path.display())))?;
        let mut config: SiteConfig = toml::from_str(&content)?;
        if config.site_root.is_relative() {
            let base = path.parent().unwrap_or_else(|| Path::new("."));
            config.site_root = base.join(&config.site_root);
        }
        Ok(config.with_env_overrides())
    }

    /// Resolve the config the CLI should use: an explicit file, then `OHSITE_CONFIG`, then
    /// defaults for the current directory.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, SiteError> {
        if let Some(path) = explicit {
            return SiteConfig::load(path);
        }
        if let Ok(path) = env::var(ENV_CONFIG) {
            return SiteConfig::load(path);
        }
        let cwd = env::current_dir()?;
        Ok(SiteConfig::for_site(cwd).with_env_overrides())
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(root) = env::var(ENV_SITE_ROOT) {
            self.site_root = PathBuf::from(root);
        }
        if let Ok(dir) = env::var(ENV_STATE_DIR) {
            self.state_dir = PathBuf::from(dir);
        }
        self
    }

    pub fn resolve<P: AsRef<Path>>(&self, path: P) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.site_root.join(path)
        }
    }

    pub fn content_root(&self) -> PathBuf {
        self.resolve(&self.content_root)
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.resolve(&self.catalog_path)
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.resolve(&self.backup_dir)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.state_dir.join("standards-update.lock")
    }

    pub fn health_path(&self) -> PathBuf {
        self.state_dir.join("standards-update-health.json")
    }

    pub fn log_path(&self) -> PathBuf {
        self.state_dir.join("ohsite.log")
    }

    pub fn maintain_lock_path(&self) -> PathBuf {
        self.state_dir.join("site-maintain.lock")
    }

    pub fn maintain_health_path(&self) -> PathBuf {
        self.state_dir.join("site-maintain-health.json")
    }

    /// Root of uploaded media files (`public/uploads/<kind>`).
    pub fn uploads_root(&self) -> PathBuf {
        self.site_root.join("public").join("uploads")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Title keywords sent to the standards search site.
    pub search_terms: Vec<String>,
    /// Keywords sent to the national standard full-text registry.
    pub registry_keywords: Vec<String>,
    pub search_base_url: String,
    pub registry_base_url: String,
    pub announcement_url: String,
    pub enable_search: bool,
    pub enable_registry: bool,
    pub enable_announcements: bool,
    pub user_agent: String,
    #[serde(with = "duration_ms", rename = "timeout_ms")]
    pub timeout: Duration,
    /// Pause after every query, for rate limiting.
    #[serde(with = "duration_ms", rename = "request_delay_ms")]
    pub request_delay: Duration,
    pub retry: RetryPolicy,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        DiscoveryConfig {
            search_terms: ["职业病诊断", "职业健康监护", "噪声聋", "听力测定", "工作场所有害因素"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            registry_keywords: vec!["GBZ".to_string(), "职业卫生".to_string()],
            search_base_url: "https://www.biaozhun.org".to_string(),
            registry_base_url: "https://openstd.samr.gov.cn".to_string(),
            announcement_url: "https://www.nhc.gov.cn/wjw/pcrb/new_list.shtml".to_string(),
            enable_search: true,
            enable_registry: true,
            enable_announcements: false,
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36"
                .to_string(),
            timeout: Duration::from_secs(15),
            request_delay: Duration::from_secs(2),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    /// When false the catalog is saved locally and nothing is committed or deployed.
    pub enabled: bool,
    pub git_program: String,
    pub remote: String,
    pub branch: String,
    #[serde(with = "duration_ms", rename = "git_timeout_ms")]
    pub git_timeout: Duration,
    pub push_retry: RetryPolicy,
    /// Empty commands are skipped.
    pub build_command: Vec<String>,
    #[serde(with = "duration_ms", rename = "build_timeout_ms")]
    pub build_timeout: Duration,
    pub deploy_command: Vec<String>,
    #[serde(with = "duration_ms", rename = "deploy_timeout_ms")]
    pub deploy_timeout: Duration,
    /// Process-manager restart, tried first.
    pub restart_command: Vec<String>,
    /// Relaunch command used after killing whatever listens on `port`.
    pub start_command: Vec<String>,
    pub port: u16,
    #[serde(with = "duration_ms", rename = "restart_timeout_ms")]
    pub restart_timeout: Duration,
    pub liveness_url: Option<String>,
    #[serde(with = "duration_ms", rename = "liveness_timeout_ms")]
    pub liveness_timeout: Duration,
    #[serde(with = "duration_ms", rename = "liveness_interval_ms")]
    pub liveness_interval: Duration,
}

impl Default for PublishConfig {
    fn default() -> Self {
        let words = |s: &str| s.split_whitespace().map(str::to_string).collect::<Vec<_>>();
        PublishConfig {
            enabled: true,
            git_program: "git".to_string(),
            remote: "origin".to_string(),
            branch: "main".to_string(),
            git_timeout: Duration::from_secs(30),
            push_retry: RetryPolicy::new(3, Duration::from_secs(5)),
            build_command: words("npx next build"),
            build_timeout: Duration::from_secs(120),
            deploy_command: words("npx vercel --prod --yes"),
            deploy_timeout: Duration::from_secs(300),
            restart_command: words("pm2 restart xu-health-site"),
            start_command: words("npx next start -p 3000"),
            port: 3000,
            restart_timeout: Duration::from_secs(10),
            liveness_url: Some("http://localhost:3000/".to_string()),
            liveness_timeout: Duration::from_secs(20),
            liveness_interval: Duration::from_secs(1),
        }
    }
}

/// Source-repository contents API used by the remote content writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoConfig {
    /// Write content through the API instead of the local filesystem (read-only deployments).
    pub remote_writes: bool,
    pub api_base_url: String,
    /// `owner/name`
    pub repo: String,
    pub branch: String,
    /// Directory of the site inside the repository.
    pub path_prefix: String,
    /// Environment variable holding the API token.
    pub token_env: String,
    #[serde(with = "duration_ms", rename = "timeout_ms")]
    pub timeout: Duration,
}

impl Default for RepoConfig {
    fn default() -> Self {
        RepoConfig {
            remote_writes: false,
            api_base_url: "https://api.github.com".to_string(),
            repo: "axuan20160304-oss/xu-occupational-health".to_string(),
            branch: "main".to_string(),
            path_prefix: "site".to_string(),
            token_env: "GITHUB_TOKEN".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl RepoConfig {
    pub fn token(&self) -> Option<String> {
        env::var(&self.token_env).ok().filter(|t| !t.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCheck {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintainConfig {
    pub pages: Vec<PageCheck>,
    #[serde(with = "duration_ms", rename = "page_timeout_ms")]
    pub page_timeout: Duration,
}

impl Default for MaintainConfig {
    fn default() -> Self {
        let pages = [
            ("首页", "/"),
            ("标准", "/standards"),
            ("文章", "/articles"),
            ("图片", "/images"),
            ("PPT", "/ppts"),
            ("法规", "/laws"),
        ]
        .iter()
        .map(|(name, path)| PageCheck {
            name: name.to_string(),
            url: format!("http://localhost:3000{path}"),
        })
        .collect();
        MaintainConfig {
            pages,
            page_timeout: Duration::from_secs(10),
        }
    }
}
