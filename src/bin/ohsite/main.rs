//! ohsite CLI tool
//!
//! Entry point for the site's scheduled jobs.
//!
//! ## Commands
//!
//! - `update [--dry-run]`: one catalog update run
//! - `maintain [--check]`: the whole-site maintenance check
//! - `write <kind> --title ...`: write an article or law document
//! - `restore [backup]`: put a catalog backup back in place
//!
//! Every command logs to stdout and appends to the configured log file. `update` and `maintain`
//! exit non-zero when the run ends in `error` or `crash`, so cron mail and monitoring see it.
//!
//! ## Example crontab
//!
//! ```text
//! 0 */6 * * * cd /srv/site && ohsite update
//! 0 * * * *   cd /srv/site && ohsite maintain
//! ```

use chrono::Utc;
use clap::{Parser, Subcommand};
use ohsite_core::{
    backup::BackupStore,
    catalog::CatalogSnapshot,
    config::SiteConfig,
    content::{select_writer, write_content, ContentAttachment, ContentKind, UpsertContent},
    logging::rotate_log,
    maintain::SiteMaintainer,
    updater::CatalogUpdater,
    SiteError,
};
use std::{
    fs::OpenOptions,
    io::Read,
    path::{Path, PathBuf},
    sync::Mutex,
};
use tracing_subscriber::fmt::writer::MakeWriterExt;

#[derive(Parser)]
#[command(name = "ohsite")]
#[command(
    author,
    version,
    about = "Scheduled maintenance jobs for the occupational-health site",
    long_about = None
)]
struct Cli {
    /// Configuration file (default: $OHSITE_CONFIG, else defaults for the current directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover new standards and publish the updated catalog
    Update {
        /// Report what would be added without writing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Check every site module and record a maintenance health report
    Maintain {
        /// Check only: the catalog update runs as a dry run
        #[arg(long)]
        check: bool,
    },

    /// Write a content document (articles or laws)
    Write {
        /// Content kind
        kind: ContentKind,

        #[arg(long)]
        title: String,

        /// Body file (reads stdin when omitted)
        #[arg(long)]
        body: Option<PathBuf>,

        #[arg(long)]
        slug: Option<String>,

        #[arg(long)]
        summary: Option<String>,

        /// Publication date, YYYY-MM-DD (default: today)
        #[arg(long)]
        date: Option<String>,

        /// Tag, repeatable
        #[arg(long = "tag")]
        tags: Vec<String>,

        #[arg(long)]
        category: Option<String>,

        #[arg(long)]
        author: Option<String>,

        #[arg(long)]
        source: Option<String>,

        /// Attachment as `name=url[=type]`, repeatable
        #[arg(long = "attach", value_parser = parse_attachment)]
        attachments: Vec<ContentAttachment>,
    },

    /// Restore the catalog from a backup (default: the newest one)
    Restore {
        backup: Option<PathBuf>,
    },
}

fn parse_attachment(raw: &str) -> Result<ContentAttachment, String> {
    let mut parts = raw.splitn(3, '=');
    let name = parts.next().unwrap_or_default().trim();
    let url = parts.next().unwrap_or_default().trim();
    if name.is_empty() || url.is_empty() {
        return Err(format!("expected name=url[=type], got '{raw}'"));
    }
    Ok(ContentAttachment {
        name: name.to_string(),
        url: url.to_string(),
        kind: ohsite_core::content::AttachmentType::parse_lenient(parts.next().unwrap_or("file")),
    })
}

/// Stdout plus the appended log file, after trimming an oversized log.
fn init_tracing(config: &SiteConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let log_path = config.log_path();
    let rotated = rotate_log(&log_path, config.log_max_bytes, config.log_keep_bytes);
    let file = log_path
        .parent()
        .map(std::fs::create_dir_all)
        .transpose()
        .and_then(|_| OpenOptions::new().create(true).append(true).open(&log_path));

    match file {
        Ok(file) => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(std::io::stdout.and(Mutex::new(file)))
            .init(),
        Err(err) => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            tracing::warn!("cannot append to {}: {err}", log_path.display());
        }
    }
    match rotated {
        Ok(true) => tracing::info!("log {} truncated", log_path.display()),
        Ok(false) => {}
        Err(err) => tracing::warn!("log rotation failed: {err}"),
    }
}

fn read_body(path: Option<&Path>) -> Result<String, SiteError> {
    match path {
        Some(path) => Ok(std::fs::read_to_string(path)?),
        None => {
            let mut body = String::new();
            std::io::stdin().read_to_string(&mut body)?;
            Ok(body)
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = SiteConfig::discover(cli.config.as_deref())?;
    init_tracing(&config);
    tracing::debug!("site root: {}", config.site_root.display());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    match cli.command {
        Commands::Update { dry_run } => {
            let updater = CatalogUpdater::from_config(config)?;
            let report = runtime.block_on(updater.run(dry_run));
            println!(
                "status: {} | new: {} | catalog: {}",
                report.status,
                report.new_standards.len(),
                report.catalog_count
            );
            for error in &report.errors {
                println!("  - {error}");
            }
            if report.status.is_failure() {
                std::process::exit(1);
            }
            Ok(())
        }

        Commands::Maintain { check } => {
            let maintainer = SiteMaintainer::from_config(config)?;
            let health = runtime.block_on(maintainer.run(check));
            println!("status: {} | problems: {}", health.status, health.errors.len());
            for error in &health.errors {
                println!("  - {error}");
            }
            if health.status.is_failure() {
                std::process::exit(1);
            }
            Ok(())
        }

        Commands::Write {
            kind,
            title,
            body,
            slug,
            summary,
            date,
            tags,
            category,
            author,
            source,
            attachments,
        } => {
            let payload = UpsertContent {
                slug,
                title,
                summary,
                date,
                tags,
                category,
                author,
                source,
                attachments,
                content: read_body(body.as_deref())?,
            };
            let writer = select_writer(&config)?;
            let written = runtime.block_on(write_content(
                writer.as_ref(),
                kind,
                &payload,
                Utc::now().date_naive(),
            ))?;
            println!("✓ {} written: {}", written.slug, written.location);
            Ok(())
        }

        Commands::Restore { backup } => {
            let catalog_path = config.catalog_path();
            let store = BackupStore::for_file(
                config.backup_dir(),
                &catalog_path,
                config.backup_retention,
            );
            let backup = match backup {
                Some(path) => path,
                None => store.list()?.pop().ok_or_else(|| {
                    SiteError::NotFound(format!("no backups in {}", store.dir().display()))
                })?,
            };
            // A backup must itself pass validation.
            CatalogSnapshot::load(&backup)?;
            store.restore(&backup, &catalog_path)?;
            println!("✓ {} restored from {}", catalog_path.display(), backup.display());
            Ok(())
        }
    }
}
