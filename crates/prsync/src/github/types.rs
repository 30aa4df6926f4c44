//! Wire payloads for the GitHub REST endpoints read during a sync.
//!
//! Only the fields the sync consumes are declared; everything else in the
//! response is ignored by serde.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GhUser {
    pub id: i64,
    pub login: String,
    #[serde(rename = "type", default = "default_user_kind")]
    pub kind: String,
    #[serde(default)]
    pub name: Option<String>,
}

fn default_user_kind() -> String {
    "User".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GhRepository {
    pub id: i64,
    pub name: String,
    pub owner: GhUser,
    pub description: Option<String>,
    pub default_branch: Option<String>,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub archived: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GhPullRequest {
    pub id: i64,
    pub number: u64,
    #[serde(default)]
    pub title: String,
    pub state: String,
    pub user: Option<GhUser>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub merged_at: Option<DateTime<Utc>>,
    // Present only on the single pull request endpoint.
    pub merged: Option<bool>,
    pub additions: Option<u64>,
    pub deletions: Option<u64>,
    pub changed_files: Option<u64>,
    pub commits: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GhReview {
    pub id: i64,
    pub user: Option<GhUser>,
    pub state: String,
    pub body: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
}

/// Query parameters for paginated listings.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ListParams {
    pub per_page: u8,
    pub page: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<&'static str>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<&'static str>,
}
