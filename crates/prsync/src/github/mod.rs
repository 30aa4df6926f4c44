//! GitHub implementation of the remote API.
//!
//! # Module Structure
//!
//! - [`error`] - Mapping of octocrab failures onto [`ApiError`](crate::access::ApiError)
//! - [`types`] - Wire payloads for the REST endpoints the sync reads
//! - [`convert`] - Conversion from wire payloads to typed summaries
//! - [`client`] - [`GitHubClient`], the [`RemoteApi`](crate::access::RemoteApi) implementation
//!
//! ```ignore
//! use std::sync::Arc;
//! use prsync::github::GitHubClient;
//!
//! let client = Arc::new(GitHubClient::new(&token)?);
//! let quota = client.quota().await?;
//! ```

mod client;
mod convert;
mod error;
mod types;

pub use client::{GitHubClient, PER_PAGE, create_client};
pub use error::{classify_octocrab_error, is_rate_limit_message};
