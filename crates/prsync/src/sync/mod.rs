//! Incremental sync of organizations, repositories, pull requests and reviews.
//!
//! # Module Structure
//!
//! - [`types`] - `SyncOptions`, `SyncMode`, `SyncSummary`
//! - [`filter`] - the incremental-skip rule and listing cutoffs
//! - [`orchestrator`] - `SyncOrchestrator`, which walks the cascade

pub mod filter;
pub mod orchestrator;
mod errors;
mod types;

pub use errors::{Result, SyncError};
pub use orchestrator::{SyncOrchestrator, SyncOrchestratorBuilder};
pub use types::{
    DEFAULT_REVIEW_FANOUT_THRESHOLD, EntityCounts, SyncMode, SyncOptions, SyncSummary,
};
