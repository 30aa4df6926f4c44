//! prsync - Incremental pull request sync into a local database.
//!
//! This library mirrors organizations, their repositories, pull requests,
//! reviews and review authors from a rate-limited remote API into a database,
//! fetching only what changed since the previous run.
//!
//! # Features
//!
//! - `sqlite` - SQLite backend for sea-orm.
//! - `migrate` - Enables database migration support. When enabled, you can use
//!   [`connect_and_migrate`] to automatically run migrations on connection.
//! - `github` - [`github::GitHubClient`], the GitHub implementation of [`RemoteApi`].
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use prsync::{AccessConfig, AccessLayer, SystemClock, SyncOptions, SyncOrchestrator};
//! use prsync::github::GitHubClient;
//!
//! let db = prsync::connect_and_migrate("sqlite://prsync.db?mode=rwc").await?;
//! let client = Arc::new(GitHubClient::new(&token)?);
//! let access = AccessLayer::new(client, Arc::new(SystemClock), AccessConfig::default());
//!
//! let orchestrator = SyncOrchestrator::builder()
//!     .access(Arc::new(access))
//!     .database(Arc::new(db))
//!     .options(SyncOptions::default())
//!     .build()?;
//!
//! let summary = orchestrator.sync_organization("rust-lang").await?;
//! println!("Synced {} pull requests", summary.pull_requests.synced);
//! ```

pub mod access;
pub mod concurrency;
pub mod db;
pub mod entity;
pub mod store;
pub mod sync;

#[cfg(feature = "github")]
pub mod github;

#[cfg(feature = "migrate")]
pub mod migration;

pub use access::{
    AccessConfig, AccessLayer, ApiError, Clock, ManualClock, QuotaSnapshot, RemoteApi,
    SystemClock,
};
pub use db::{connect, connect_with_pool};
#[cfg(feature = "migrate")]
pub use db::{connect_and_migrate, connect_and_migrate_with_pool};
pub use entity::prelude::*;
pub use store::StoreError;
pub use sync::{SyncError, SyncMode, SyncOptions, SyncOrchestrator, SyncSummary};
