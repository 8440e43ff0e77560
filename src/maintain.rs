//! Hourly whole-site check.
//!
//! Runs the catalog update (dry run in check-only mode), then inspects articles, image and
//! slide manifests, and the public pages. Module problems are collected into one error list; the
//! overall status is `ok` with no errors, `warning` with up to two, `error` beyond that.

use chrono::{SecondsFormat, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::{fmt, fs, io::BufRead, panic::AssertUnwindSafe, path::Path};

use crate::{
    config::{PageCheck, SiteConfig},
    content::{document_paths, ContentKind, MediaManifest},
    error::SiteError,
    health::{read_json, write_json, RunStatus},
    lock::{LockAcquisition, RunLock},
    updater::CatalogUpdater,
};

/// Errors tolerated before the overall status turns from `warning` to `error`.
pub const WARNING_ERROR_LIMIT: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleStatus {
    Ok,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaintenanceStatus {
    Ok,
    Warning,
    Error,
    Skipped,
    Crash,
}

impl MaintenanceStatus {
    pub fn from_error_count(count: usize) -> Self {
        match count {
            0 => MaintenanceStatus::Ok,
            n if n <= WARNING_ERROR_LIMIT => MaintenanceStatus::Warning,
            _ => MaintenanceStatus::Error,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, MaintenanceStatus::Error | MaintenanceStatus::Crash)
    }
}

impl fmt::Display for MaintenanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let label = match self {
            MaintenanceStatus::Ok => "ok",
            MaintenanceStatus::Warning => "warning",
            MaintenanceStatus::Error => "error",
            MaintenanceStatus::Skipped => "skipped",
            MaintenanceStatus::Crash => "crash",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StandardsReport {
    pub status: ModuleStatus,
    pub run_status: RunStatus,
    pub new_standards: usize,
    pub message: String,
}

/// Articles, images or slides: how many entries, how many are broken or missing their file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilesReport {
    pub status: ModuleStatus,
    pub total: usize,
    pub flagged: usize,
    pub message: String,
}

impl FilesReport {
    fn failed(err: &SiteError) -> Self {
        FilesReport {
            status: ModuleStatus::Error,
            total: 0,
            flagged: 0,
            message: err.headline(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageResult {
    pub name: String,
    pub url: String,
    /// HTTP status, `0` when no response arrived.
    pub status: u16,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebsiteReport {
    pub status: ModuleStatus,
    pub pages: Vec<PageResult>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceReport {
    pub standards: StandardsReport,
    pub articles: FilesReport,
    pub images: FilesReport,
    pub ppts: FilesReport,
    pub website: WebsiteReport,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceHealth {
    pub status: MaintenanceStatus,
    pub last_run: String,
    pub pid: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<MaintenanceReport>,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl MaintenanceHealth {
    pub fn new(status: MaintenanceStatus) -> Self {
        MaintenanceHealth {
            status,
            last_run: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            pid: std::process::id(),
            report: None,
            errors: Vec::new(),
        }
    }

    pub fn crashed(err: &SiteError) -> Self {
        let mut health = MaintenanceHealth::new(MaintenanceStatus::Crash);
        health.errors.push(err.headline());
        health
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, SiteError> {
        read_json(path)
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<(), SiteError> {
        write_json(path, self)
    }
}

pub struct SiteMaintainer {
    config: SiteConfig,
    updater: CatalogUpdater,
}

impl SiteMaintainer {
    /// `updater` should share `config`'s site root.
    pub fn new(config: SiteConfig, updater: CatalogUpdater) -> Self {
        SiteMaintainer { config, updater }
    }

    pub fn from_config(config: SiteConfig) -> Result<Self, SiteError> {
        let updater = CatalogUpdater::from_config(config.clone())?;
        Ok(SiteMaintainer::new(config, updater))
    }

    pub async fn run(&self, check_only: bool) -> MaintenanceHealth {
        tracing::info!(
            "========== site maintenance{} ==========",
            if check_only { " [check]" } else { "" }
        );
        let health = match RunLock::acquire(
            self.config.maintain_lock_path(),
            self.config.lock_stale_after,
            Utc::now().timestamp_millis(),
        ) {
            Ok(LockAcquisition::Acquired(lock)) => {
                let health = AssertUnwindSafe(self.check_all(check_only))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|payload| {
                        let err = SiteError::from_panic(payload);
                        tracing::error!("❌ maintenance crashed: {err}");
                        MaintenanceHealth::crashed(&err)
                    });
                if let Err(err) = lock.release() {
                    tracing::error!("failed to release maintenance lock: {err}");
                }
                health
            }
            Ok(LockAcquisition::Held(holder)) => {
                tracing::info!("⏳ maintenance already running (pid {}), skipping", holder.pid);
                MaintenanceHealth::new(MaintenanceStatus::Skipped)
            }
            Err(err) => {
                tracing::error!("❌ maintenance crashed: {err}");
                MaintenanceHealth::crashed(&err)
            }
        };

        let path = self.config.maintain_health_path();
        if let Err(err) = health.write(&path) {
            tracing::error!("failed to write {}: {err}", path.display());
        }
        health
    }

    async fn check_all(&self, check_only: bool) -> MaintenanceHealth {
        let mut errors = Vec::new();

        tracing::info!("📋 [1/5] standards");
        let standards = self.check_standards(check_only).await;
        if standards.status == ModuleStatus::Error {
            errors.push(format!("standards: {}", standards.message));
        }
        tracing::info!("   standards: {}", standards.message);

        tracing::info!("📝 [2/5] articles");
        let articles = check_articles(&self.config.content_root()).unwrap_or_else(|err| {
            errors.push(format!("articles: {}", err.headline()));
            FilesReport::failed(&err)
        });
        tracing::info!("   articles: {}", articles.message);

        let uploads = self.config.uploads_root();
        tracing::info!("🖼️ [3/5] images");
        let images = check_media(&self.config.content_root(), &uploads, ContentKind::Images)
            .unwrap_or_else(|err| {
                errors.push(format!("images: {}", err.headline()));
                FilesReport::failed(&err)
            });
        tracing::info!("   images: {}", images.message);

        tracing::info!("📊 [4/5] ppts");
        let ppts = check_media(&self.config.content_root(), &uploads, ContentKind::Ppts)
            .unwrap_or_else(|err| {
                errors.push(format!("ppts: {}", err.headline()));
                FilesReport::failed(&err)
            });
        tracing::info!("   ppts: {}", ppts.message);

        tracing::info!("🌐 [5/5] website");
        let website = self.check_website().await;
        for page in website.pages.iter().filter(|p| !p.ok) {
            errors.push(format!("page {}: {}", page.name, page_problem(page)));
        }

        let status = MaintenanceStatus::from_error_count(errors.len());
        tracing::info!("========== maintenance {status} ({} problem(s)) ==========", errors.len());
        MaintenanceHealth {
            report: Some(MaintenanceReport {
                standards,
                articles,
                images,
                ppts,
                website,
            }),
            errors,
            ..MaintenanceHealth::new(status)
        }
    }

    async fn check_standards(&self, check_only: bool) -> StandardsReport {
        let run = self.updater.run(check_only).await;
        let new_standards = run.new_standards.len();
        let (status, message) = match run.status {
            RunStatus::Error | RunStatus::Crash => (
                ModuleStatus::Error,
                run.errors
                    .first()
                    .cloned()
                    .unwrap_or_else(|| format!("catalog update ended with {}", run.status)),
            ),
            RunStatus::Partial => (
                ModuleStatus::Warning,
                format!("{new_standards} new standard(s), publish incomplete"),
            ),
            RunStatus::Skipped => (ModuleStatus::Ok, "catalog update already running".to_string()),
            _ if new_standards == 0 => (ModuleStatus::Ok, "no new standards".to_string()),
            _ => (ModuleStatus::Ok, format!("{new_standards} new standard(s)")),
        };
        StandardsReport {
            status,
            run_status: run.status,
            new_standards,
            message,
        }
    }

    async fn check_website(&self) -> WebsiteReport {
        let client = reqwest::Client::builder()
            .timeout(self.config.maintain.page_timeout)
            .build();
        let mut pages = Vec::with_capacity(self.config.maintain.pages.len());
        for page in &self.config.maintain.pages {
            let result = match &client {
                Ok(client) => check_page(client, page).await,
                Err(err) => PageResult {
                    name: page.name.clone(),
                    url: page.url.clone(),
                    status: 0,
                    ok: false,
                    error: Some(format!("http client: {err}")),
                },
            };
            if result.ok {
                tracing::info!("   ✅ {}: HTTP {}", result.name, result.status);
            } else {
                tracing::warn!("   ❌ {}: {}", result.name, page_problem(&result));
            }
            pages.push(result);
        }
        let failed = pages.iter().filter(|p| !p.ok).count();
        WebsiteReport {
            status: if failed == 0 {
                ModuleStatus::Ok
            } else {
                ModuleStatus::Error
            },
            message: if failed == 0 {
                "all pages reachable".to_string()
            } else {
                format!("{failed} page(s) failing")
            },
            pages,
        }
    }
}

fn page_problem(page: &PageResult) -> String {
    page.error
        .clone()
        .unwrap_or_else(|| format!("HTTP {}", page.status))
}

pub async fn check_page(client: &reqwest::Client, page: &PageCheck) -> PageResult {
    let (status, error) = match client.get(&page.url).send().await {
        Ok(resp) => (resp.status().as_u16(), None),
        Err(err) => (0, Some(SiteError::from(err).headline())),
    };
    PageResult {
        name: page.name.clone(),
        url: page.url.clone(),
        status,
        ok: status == 200,
        error,
    }
}

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Whether the first line of `path` is exactly `---`, ignoring a byte-order mark and line ending.
fn opens_with_fence(path: &Path) -> Result<bool, SiteError> {
    let file = fs::File::open(path)?;
    let mut line = Vec::new();
    std::io::BufReader::new(file).read_until(b'\n', &mut line)?;
    let line = line.strip_prefix(UTF8_BOM).unwrap_or(&line[..]);
    Ok(String::from_utf8_lossy(line).trim_end() == "---")
}

/// Count `.mdx` articles and those that do not open with a front-matter fence. An unreadable
/// file is flagged like a malformed one.
pub fn check_articles(content_root: &Path) -> Result<FilesReport, SiteError> {
    let mdx: Vec<_> = document_paths(content_root, ContentKind::Articles)
        .into_iter()
        .filter(|p| p.extension().map(|e| e == "mdx").unwrap_or(false))
        .collect();
    let mut broken = 0;
    for path in &mdx {
        match opens_with_fence(path) {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!("   ⚠️ no front-matter: {}", path.display());
                broken += 1;
            }
            Err(err) => {
                tracing::warn!("   ⚠️ unreadable article {}: {err}", path.display());
                broken += 1;
            }
        }
    }
    Ok(FilesReport {
        status: if broken > 0 {
            ModuleStatus::Warning
        } else {
            ModuleStatus::Ok
        },
        total: mdx.len(),
        flagged: broken,
        message: if broken > 0 {
            format!("{} article(s), {broken} malformed", mdx.len())
        } else {
            format!("{} article(s)", mdx.len())
        },
    })
}

/// Count manifest items and those whose upload is missing. Sparse manifests are accepted;
/// a file that is not JSON is an error.
pub fn check_media(
    content_root: &Path,
    uploads_root: &Path,
    kind: ContentKind,
) -> Result<FilesReport, SiteError> {
    let path = MediaManifest::path(content_root, kind);
    if !path.exists() {
        return Ok(FilesReport {
            status: ModuleStatus::Ok,
            total: 0,
            flagged: 0,
            message: "no manifest".to_string(),
        });
    }
    let manifest = MediaManifest::read(&path)?;
    let missing = manifest.missing_files(uploads_root, kind);
    for item in &missing {
        tracing::warn!("   ⚠️ missing {kind} file: {}", item.filename);
    }
    let total = manifest.items.len();
    Ok(FilesReport {
        status: if missing.is_empty() {
            ModuleStatus::Ok
        } else {
            ModuleStatus::Warning
        },
        total,
        flagged: missing.len(),
        message: if missing.is_empty() {
            format!("{total} {kind} item(s)")
        } else {
            format!("{total} {kind} item(s), {} file(s) missing", missing.len())
        },
    })
}
