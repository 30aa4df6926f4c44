//! GitHub client creation and the paginated read operations.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use octocrab::Octocrab;
use serde::de::DeserializeOwned;

use crate::access::{
    self, ApiError, PullRequestDetail, PullRequestSummary, QuotaSnapshot, QuotaSource, RemoteApi,
    RepoRef, RepositorySummary, ReviewSummary, UserSummary,
};

use super::convert::{
    to_pull_request_detail, to_pull_request_summary, to_repository_summary, to_review_summary,
    to_user_summary,
};
use super::error::classify_octocrab_error;
use super::types::{GhPullRequest, GhRepository, GhReview, GhUser, ListParams};

/// Page size requested from listing endpoints.
pub const PER_PAGE: u8 = 100;

/// Create an authenticated Octocrab client.
pub fn create_client(token: &str) -> access::Result<Octocrab> {
    Octocrab::builder()
        .personal_token(token.to_string())
        .build()
        .map_err(|e| classify_octocrab_error(e, "client"))
}

/// GitHub implementation of [`RemoteApi`].
#[derive(Clone)]
pub struct GitHubClient {
    inner: Arc<Octocrab>,
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient").finish_non_exhaustive()
    }
}

impl GitHubClient {
    /// Create a client authenticated with a personal access token.
    pub fn new(token: &str) -> access::Result<Self> {
        Ok(Self {
            inner: Arc::new(create_client(token)?),
        })
    }

    /// Wrap an existing Octocrab instance.
    pub fn from_octocrab(client: Octocrab) -> Self {
        Self {
            inner: Arc::new(client),
        }
    }

    /// The underlying Octocrab client.
    pub fn inner(&self) -> &Octocrab {
        &self.inner
    }

    async fn get<T: DeserializeOwned>(
        &self,
        route: &str,
        params: Option<&ListParams>,
    ) -> access::Result<T> {
        self.inner
            .get(route, params)
            .await
            .map_err(|e| classify_octocrab_error(e, route))
    }

    /// Fetch pages of a listing sorted newest-updated first, stopping at the
    /// first item not newer than `since`.
    async fn list_updated_desc<T, F>(
        &self,
        route: &str,
        params: ListParams,
        since: Option<DateTime<Utc>>,
        updated_at: F,
    ) -> access::Result<Vec<T>>
    where
        T: DeserializeOwned,
        F: Fn(&T) -> DateTime<Utc>,
    {
        let mut items = Vec::new();
        let mut params = params;

        loop {
            let page: Vec<T> = self.get(route, Some(&params)).await?;
            let page_len = page.len();

            let kept_before = items.len();
            items.extend(
                page.into_iter()
                    .take_while(|item| since.is_none_or(|cutoff| updated_at(item) > cutoff)),
            );
            let reached_cutoff = items.len() - kept_before < page_len;

            if page_len < usize::from(params.per_page) || reached_cutoff {
                break;
            }
            params.page += 1;
        }

        tracing::debug!(route, count = items.len(), "Fetched listing");
        Ok(items)
    }
}

fn listing(sort_updated: bool) -> ListParams {
    ListParams {
        per_page: PER_PAGE,
        page: 1,
        state: None,
        kind: None,
        sort: sort_updated.then_some("updated"),
        direction: sort_updated.then_some("desc"),
    }
}

#[async_trait]
impl QuotaSource for GitHubClient {
    async fn quota(&self) -> access::Result<QuotaSnapshot> {
        let rate_limit = self
            .inner
            .ratelimit()
            .get()
            .await
            .map_err(|e| classify_octocrab_error(e, "/rate_limit"))?;
        let core = &rate_limit.resources.core;

        Ok(QuotaSnapshot {
            limit: core.limit as u64,
            remaining: core.remaining as u64,
            reset_at: DateTime::from_timestamp(core.reset as i64, 0).unwrap_or_else(Utc::now),
        })
    }
}

#[async_trait]
impl RemoteApi for GitHubClient {
    async fn list_org_repos(
        &self,
        org: &str,
        since: Option<DateTime<Utc>>,
    ) -> access::Result<Vec<RepositorySummary>> {
        let route = format!("/orgs/{}/repos", org);
        let params = ListParams {
            kind: Some("all"),
            ..listing(true)
        };
        let repos: Vec<GhRepository> = self
            .list_updated_desc(&route, params, since, |r: &GhRepository| r.updated_at)
            .await?;

        Ok(repos.into_iter().map(to_repository_summary).collect())
    }

    async fn list_pull_requests(
        &self,
        repo: &RepoRef,
        since: Option<DateTime<Utc>>,
    ) -> access::Result<Vec<PullRequestSummary>> {
        let route = format!("/repos/{}/{}/pulls", repo.owner, repo.name);
        let params = ListParams {
            state: Some("all"),
            ..listing(true)
        };
        let pulls: Vec<GhPullRequest> = self
            .list_updated_desc(&route, params, since, |p: &GhPullRequest| p.updated_at)
            .await?;

        Ok(pulls.iter().map(to_pull_request_summary).collect())
    }

    async fn get_pull_request(
        &self,
        repo: &RepoRef,
        number: u64,
    ) -> access::Result<PullRequestDetail> {
        let route = format!("/repos/{}/{}/pulls/{}", repo.owner, repo.name, number);
        let pr: GhPullRequest = self.get(&route, None).await?;
        Ok(to_pull_request_detail(pr))
    }

    async fn list_reviews(&self, repo: &RepoRef, number: u64) -> access::Result<Vec<ReviewSummary>> {
        let route = format!("/repos/{}/{}/pulls/{}/reviews", repo.owner, repo.name, number);
        let mut params = listing(false);
        let mut reviews = Vec::new();

        loop {
            let page: Vec<GhReview> = self.get(&route, Some(&params)).await?;
            let full_page = page.len() >= usize::from(params.per_page);
            reviews.extend(page.into_iter().map(to_review_summary));
            if !full_page {
                break;
            }
            params.page += 1;
        }

        Ok(reviews)
    }

    async fn get_user(&self, login: &str) -> access::Result<UserSummary> {
        if login.is_empty() {
            return Err(ApiError::not_found("user with empty login"));
        }
        let route = format!("/users/{}", login);
        let user: GhUser = self.get(&route, None).await?;
        Ok(to_user_summary(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_params_serialize() {
        let params = ListParams {
            state: Some("all"),
            ..listing(true)
        };
        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "per_page": 100,
                "page": 1,
                "state": "all",
                "sort": "updated",
                "direction": "desc"
            })
        );
    }

    #[test]
    fn test_plain_listing_omits_sorting() {
        let value = serde_json::to_value(listing(false)).unwrap();
        assert_eq!(value, serde_json::json!({"per_page": 100, "page": 1}));
    }

    #[test]
    fn test_org_listing_requests_all_types() {
        let params = ListParams {
            kind: Some("all"),
            ..listing(true)
        };
        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(value["type"], "all");
    }
}
