use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::Result;

/// Request quota as reported by the remote API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaSnapshot {
    /// Requests allowed per window.
    pub limit: u64,
    /// Requests left in the current window.
    pub remaining: u64,
    /// When the window resets.
    pub reset_at: DateTime<Utc>,
}

/// Owner/name pair identifying a repository on the remote.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// A user or bot account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub external_id: i64,
    pub login: String,
    /// Display name, only present on full profile lookups.
    pub name: Option<String>,
    /// Account type as reported by the remote ("User", "Bot", "Organization").
    pub kind: String,
}

/// A repository as returned by an organization listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositorySummary {
    pub external_id: i64,
    pub organization: String,
    pub name: String,
    pub description: Option<String>,
    pub default_branch: String,
    pub is_private: bool,
    pub is_archived: bool,
    pub updated_at: DateTime<Utc>,
}

impl RepositorySummary {
    pub fn repo_ref(&self) -> RepoRef {
        RepoRef::new(&self.organization, &self.name)
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.organization, self.name)
    }
}

/// A pull request as returned by a repository listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestSummary {
    pub external_id: i64,
    pub number: u64,
    pub title: String,
    pub state: String,
    pub author: Option<UserSummary>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Full pull request with diff statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestDetail {
    pub summary: PullRequestSummary,
    pub additions: u64,
    pub deletions: u64,
    pub changed_files: u64,
    pub commits: u64,
    pub merged: bool,
    pub closed_at: Option<DateTime<Utc>>,
    pub merged_at: Option<DateTime<Utc>>,
}

/// A single review on a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewSummary {
    pub external_id: i64,
    /// `None` when the reviewing account was deleted.
    pub author: Option<UserSummary>,
    pub state: String,
    pub body: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
}

/// Out-of-band quota query.
#[async_trait]
pub trait QuotaSource: Send + Sync {
    /// Fetch the current quota without consuming it.
    async fn quota(&self) -> Result<QuotaSnapshot>;
}

/// Read operations the sync needs from the remote API.
///
/// Implementations map transport and status failures onto
/// [`ApiError`](super::ApiError) variants; retrying, pacing and caching are
/// layered on top by [`AccessLayer`](super::AccessLayer).
#[async_trait]
pub trait RemoteApi: QuotaSource {
    /// List an organization's repositories, keeping only those updated after `since`.
    async fn list_org_repos(
        &self,
        org: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RepositorySummary>>;

    /// List pull requests in every state, keeping only those updated after `since`.
    async fn list_pull_requests(
        &self,
        repo: &RepoRef,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<PullRequestSummary>>;

    /// Fetch one pull request with its diff statistics.
    async fn get_pull_request(&self, repo: &RepoRef, number: u64) -> Result<PullRequestDetail>;

    /// List every review on one pull request.
    async fn list_reviews(&self, repo: &RepoRef, number: u64) -> Result<Vec<ReviewSummary>>;

    /// Look up a user's full profile.
    async fn get_user(&self, login: &str) -> Result<UserSummary>;
}

/// Keep items strictly newer than `since`.
///
/// Used by remote clients whose listing endpoints lack server-side filtering.
pub fn updated_since<T>(
    items: Vec<T>,
    since: Option<DateTime<Utc>>,
    updated_at: impl Fn(&T) -> DateTime<Utc>,
) -> Vec<T> {
    match since {
        Some(cutoff) => items
            .into_iter()
            .filter(|item| updated_at(item) > cutoff)
            .collect(),
        None => items,
    }
}
