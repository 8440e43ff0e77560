//! # ohsite-core
//!
//! Unattended maintenance jobs for a flat-file occupational-health content site.
//!
//! ## Overview
//!
//! The site keeps its content as MDX documents and JSON files under a content root. This crate
//! runs the jobs a scheduler fires against that tree:
//!
//! - **Catalog update**: query public standards registries, merge relevant new standards into
//!   `standards-catalog.json`, back it up, validate it, commit and push it, then rebuild,
//!   redeploy and restart the site. One health record per run tells monitoring how it went.
//! - **Site maintenance**: the hourly check across standards, articles, image and slide
//!   manifests, and the public pages.
//! - **Content writing**: build front-matter documents and store them locally or through the
//!   hosting repository's contents API.
//!
//! ## Architecture
//!
//! - **[`catalog`]**, **[`classify`]**, **[`merge`]**: the catalog model, the relevance
//!   classifier and merge-by-code
//! - **[`discovery`]**: remote registry clients behind the [`discovery::DiscoverySource`] trait
//! - **[`backup`]**, **[`lock`]**, **[`health`]**, **[`retry`]**: run scaffolding
//! - **[`publish`]**, **[`outcome`]**: git, build, deploy and restart steps through a
//!   [`publish::CommandRunner`], reported as typed [`outcome::Outcome`]s
//! - **[`updater`]**: the catalog update run
//! - **[`maintain`]**: the site maintenance run
//! - **[`content`]**: documents, manifests and writers
//! - **[`config`]**: one explicit [`config::SiteConfig`], loaded from TOML
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ohsite_core::{config::SiteConfig, updater::CatalogUpdater};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SiteConfig::for_site("/srv/site");
//!     let updater = CatalogUpdater::from_config(config)?;
//!     let report = updater.run(true).await;
//!     for entry in &report.new_standards {
//!         println!("{} {}", entry.code, entry.title);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `bin`: the `ohsite` command-line tool

pub mod backup;
pub mod catalog;
pub mod classify;
pub mod config;
pub mod content;
pub mod discovery;
pub mod error;
pub mod health;
pub mod lock;
pub mod logging;
pub mod maintain;
pub mod merge;
pub mod outcome;
pub mod publish;
pub mod retry;
pub mod updater;

pub use error::*;
