//! The catalog update run.
//!
//! One run walks `Idle → LockAcquired → Loaded → Validated → Discovering → Merging →
//! (DryRunReport | Persisting) → Revalidated → (RolledBack | Saved) → Publishing →
//! HealthReported → LockReleased`, stopping early where a terminal status is reached. The health
//! record is written and the lock released on every path out of [`CatalogUpdater::run`].

use chrono::{DateTime, Datelike, Utc};
use futures::FutureExt;
use std::{fs, panic::AssertUnwindSafe, path::PathBuf, sync::Arc};

use crate::{
    backup::BackupStore,
    catalog::{CatalogSnapshot, StandardEntry},
    config::SiteConfig,
    discovery::Discovery,
    error::SiteError,
    health::{HealthStatus, RunStatus},
    lock::{LockAcquisition, RunLock},
    merge::merge_candidates,
    outcome::PublishReport,
    publish::{CommandRunner, Publisher, SystemRunner},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    LockAcquired,
    Loaded,
    Validated,
    Discovering,
    Merging,
    DryRunReport,
    Persisting,
    /// The persisted catalog was read back and validated.
    Revalidated,
    RolledBack,
    Saved,
    Publishing,
    HealthReported,
    LockReleased,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub status: RunStatus,
    pub catalog_count: usize,
    pub new_standards: Vec<StandardEntry>,
    pub errors: Vec<String>,
    /// Discovery failures. Logged, not part of the health record.
    pub warnings: Vec<String>,
    pub phases: Vec<RunPhase>,
    pub backup: Option<PathBuf>,
    pub publish: PublishReport,
}

impl RunReport {
    fn new() -> Self {
        RunReport {
            status: RunStatus::Ok,
            catalog_count: 0,
            new_standards: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            phases: vec![RunPhase::Idle],
            backup: None,
            publish: PublishReport::default(),
        }
    }

    fn enter(&mut self, phase: RunPhase) {
        tracing::debug!("phase {:?} -> {phase:?}", self.phases.last());
        self.phases.push(phase);
    }

    fn fail(&mut self, status: RunStatus, err: &SiteError) {
        self.status = status;
        self.errors.push(err.headline());
    }

    pub fn reached(&self, phase: RunPhase) -> bool {
        self.phases.contains(&phase)
    }

    pub fn health(&self, at: DateTime<Utc>) -> HealthStatus {
        HealthStatus {
            catalog_count: self.catalog_count,
            new_standards: self.new_standards.len(),
            errors: self.errors.clone(),
            ..HealthStatus::new(self.status, at)
        }
    }
}

/// Mutates the merged snapshot right before it is persisted.
pub type PostMergeHook = Box<dyn Fn(&mut CatalogSnapshot) + Send + Sync>;

pub struct CatalogUpdater {
    config: SiteConfig,
    discovery: Discovery,
    runner: Arc<dyn CommandRunner>,
    post_merge: Option<PostMergeHook>,
}

impl CatalogUpdater {
    pub fn new(config: SiteConfig, discovery: Discovery, runner: Arc<dyn CommandRunner>) -> Self {
        CatalogUpdater {
            config,
            discovery,
            runner,
            post_merge: None,
        }
    }

    /// HTTP discovery and real child processes, as configured.
    pub fn from_config(config: SiteConfig) -> Result<Self, SiteError> {
        let discovery = Discovery::from_config(&config.discovery)?;
        Ok(CatalogUpdater::new(config, discovery, Arc::new(SystemRunner)))
    }

    pub fn with_post_merge_hook(mut self, hook: PostMergeHook) -> Self {
        self.post_merge = Some(hook);
        self
    }

    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    pub async fn run(&self, dry_run: bool) -> RunReport {
        let mut report = RunReport::new();
        tracing::info!(
            "========== catalog update{} ==========",
            if dry_run { " (dry run)" } else { "" }
        );

        let lock_path = self.config.lock_path();
        let lock = match RunLock::acquire(
            &lock_path,
            self.config.lock_stale_after,
            Utc::now().timestamp_millis(),
        ) {
            Ok(LockAcquisition::Acquired(lock)) => Some(lock),
            Ok(LockAcquisition::Held(holder)) => {
                report.status = RunStatus::Skipped;
                tracing::info!("another run (pid {}) is active, skipping", holder.pid);
                None
            }
            Err(err) => {
                tracing::error!("❌ could not take run lock: {err}");
                report.fail(RunStatus::Crash, &err);
                None
            }
        };

        if let Some(lock) = lock {
            report.enter(RunPhase::LockAcquired);
            let outcome = AssertUnwindSafe(self.execute(dry_run, &mut report))
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| Err(SiteError::from_panic(payload)));
            if let Err(err) = outcome {
                tracing::error!("❌ catalog update crashed: {err}");
                report.fail(RunStatus::Crash, &err);
            }
            self.report_health(&mut report);
            if let Err(err) = lock.release() {
                tracing::error!("failed to release {}: {err}", lock_path.display());
            }
            report.enter(RunPhase::LockReleased);
        } else {
            self.report_health(&mut report);
        }

        tracing::info!(
            "========== {} ({} new, {} in catalog) ==========",
            report.status,
            report.new_standards.len(),
            report.catalog_count
        );
        report
    }

    fn report_health(&self, report: &mut RunReport) {
        let path = self.config.health_path();
        match report.health(Utc::now()).write(&path) {
            Ok(()) => report.enter(RunPhase::HealthReported),
            Err(err) => tracing::error!("failed to write health record {}: {err}", path.display()),
        }
    }

    /// Everything between lock acquisition and health reporting. Expected terminal states are
    /// recorded on `report`; an `Err` is an unexpected failure.
    async fn execute(&self, dry_run: bool, report: &mut RunReport) -> Result<(), SiteError> {
        let catalog_path = self.config.catalog_path();
        let now = Utc::now();

        let raw = match fs::read_to_string(&catalog_path) {
            Ok(raw) => raw,
            Err(err) => {
                let err = SiteError::from(err);
                tracing::error!("❌ cannot read catalog {}: {err}", catalog_path.display());
                report.fail(RunStatus::Error, &err);
                return Ok(());
            }
        };
        report.enter(RunPhase::Loaded);
        let mut snapshot = match CatalogSnapshot::parse(&raw) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                tracing::error!("❌ catalog is invalid, aborting without changes: {err}");
                report.fail(RunStatus::Error, &err);
                return Ok(());
            }
        };
        report.catalog_count = snapshot.standards.len();
        report.enter(RunPhase::Validated);
        tracing::info!("📚 catalog has {} standards", report.catalog_count);

        report.enter(RunPhase::Discovering);
        let discovered = self.discovery.run().await;
        report.warnings.extend(discovered.warnings);
        tracing::info!(
            "discovery: {} candidate(s), {}/{} queries failed",
            discovered.candidates.len(),
            discovered.queries_failed,
            discovered.queries_run
        );

        report.enter(RunPhase::Merging);
        report.new_standards = merge_candidates(&snapshot, &discovered.candidates, now.year());
        if report.new_standards.is_empty() {
            tracing::info!("✅ no new standards, nothing to update");
            report.status = RunStatus::Ok;
            return Ok(());
        }
        tracing::info!("📝 {} new standard(s)", report.new_standards.len());

        if dry_run {
            report.enter(RunPhase::DryRunReport);
            for entry in &report.new_standards {
                tracing::info!("   [dry run] would add {} {}", entry.code, entry.title);
            }
            report.status = RunStatus::DryRun;
            return Ok(());
        }

        report.enter(RunPhase::Persisting);
        let store = BackupStore::for_file(
            self.config.backup_dir(),
            &catalog_path,
            self.config.backup_retention,
        );
        let backup = store.backup(&catalog_path, now)?;
        report.backup = Some(backup.clone());
        if let Err(err) = store.prune() {
            tracing::warn!("backup pruning failed: {err}");
        }

        snapshot.append(report.new_standards.clone());
        if let Some(hook) = &self.post_merge {
            hook(&mut snapshot);
        }
        snapshot.stamp(now);
        snapshot.save(&catalog_path)?;

        match CatalogSnapshot::load(&catalog_path) {
            Ok(saved) => {
                report.enter(RunPhase::Revalidated);
                report.catalog_count = saved.standards.len();
                report.enter(RunPhase::Saved);
                tracing::info!("💾 catalog saved, {} standards", report.catalog_count);
            }
            Err(err) => {
                tracing::error!("❌ merged catalog failed validation, rolling back: {err}");
                store.restore(&backup, &catalog_path)?;
                report.enter(RunPhase::RolledBack);
                report.new_standards.clear();
                report.fail(RunStatus::Error, &err);
                return Ok(());
            }
        }

        if !self.config.publish.enabled {
            tracing::info!("publishing disabled, catalog saved locally only");
            report.status = RunStatus::Ok;
            return Ok(());
        }

        report.enter(RunPhase::Publishing);
        let publisher = Publisher::new(
            &self.config.publish,
            &self.config.site_root,
            self.runner.as_ref(),
        );
        let message = commit_message(report.new_standards.len(), now);
        report.publish = publisher.commit_and_push(&[catalog_path], &message).await;
        if !report.publish.git_succeeded() {
            report.errors.extend(report.publish.failures());
            report.status = RunStatus::Partial;
            tracing::warn!("git publish failed, skipping build and deploy");
            return Ok(());
        }

        let deployed = publisher.deploy().await;
        report.publish.extend(deployed);
        report.errors.extend(report.publish.failures());
        report.status = RunStatus::Ok;
        Ok(())
    }
}

pub fn commit_message(count: usize, now: DateTime<Utc>) -> String {
    format!("auto: 自动添加{count}个新标准 ({})", now.format("%Y-%m-%d"))
}
