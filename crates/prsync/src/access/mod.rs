//! Resilient access to the remote API.
//!
//! [`AccessLayer`] is the only way the sync talks to the remote. Each read goes
//! through three stages:
//!
//! 1. [`ResponseCache`] lookup, for resources whose staleness within one run is acceptable
//! 2. [`RetryingExecutor`], which classifies failures and retries transient ones
//! 3. [`RateGovernor`], consulted by the executor before every attempt
//!
//! Quota state and cached payloads stay inside this module; callers only see
//! the values (or `None` for resources that do not exist) and fatal errors.

mod cache;
pub mod clock;
mod errors;
mod governor;
mod retry;
mod types;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::concurrency::lock_strategy;

pub use cache::{CacheConfig, DEFAULT_CACHE_TTL, ResponseCache, keys};
pub use clock::{Clock, ManualClock, SystemClock};
pub use errors::{ApiError, ErrorKind, Result, short_error_message};
pub use governor::{GovernorConfig, LOW_QUOTA_PERCENT, RateGovernor, admission_delay, until_reset};
pub use retry::{
    AttemptOutcome, DEFAULT_BACKOFF_BASE, DEFAULT_MAX_RETRIES, Executed, ExecutionStats,
    RetryPolicy, RetryingExecutor,
};
pub use types::{
    PullRequestDetail, PullRequestSummary, QuotaSnapshot, QuotaSource, RemoteApi, RepoRef,
    RepositorySummary, ReviewSummary, UserSummary, updated_since,
};

/// Cached response bodies, one variant per cacheable resource kind.
#[derive(Debug, Clone)]
pub enum Payload {
    Repositories(Vec<RepositorySummary>),
    PullRequest(Box<PullRequestDetail>),
    Reviews(Vec<ReviewSummary>),
    User(UserSummary),
}

/// Configuration for [`AccessLayer`].
#[derive(Debug, Clone, Default)]
pub struct AccessConfig {
    /// Serialize quota admission across workers.
    pub concurrent: bool,
    pub governor: GovernorConfig,
    pub retry: RetryPolicy,
    pub cache: CacheConfig,
}

impl AccessConfig {
    /// Use `unit` for both the low-quota pause and the backoff schedule.
    #[must_use]
    pub fn with_time_unit(mut self, unit: Duration) -> Self {
        self.governor.time_unit = unit;
        self.retry.time_unit = unit;
        self
    }

    #[must_use]
    pub fn with_concurrency(mut self, concurrent: bool) -> Self {
        self.concurrent = concurrent;
        self
    }
}

/// Cached, governed, retrying access to a [`RemoteApi`].
pub struct AccessLayer {
    api: Arc<dyn RemoteApi>,
    executor: RetryingExecutor,
    cache: ResponseCache<Payload>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for AccessLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessLayer")
            .field("executor", &self.executor)
            .field("cached_entries", &self.cache.len())
            .finish_non_exhaustive()
    }
}

impl AccessLayer {
    pub fn new<A>(api: Arc<A>, clock: Arc<dyn Clock>, config: AccessConfig) -> Self
    where
        A: RemoteApi + 'static,
    {
        let quota: Arc<dyn QuotaSource> = api.clone();
        let governor = RateGovernor::new(
            quota,
            Arc::clone(&clock),
            lock_strategy(config.concurrent),
            config.governor,
        );

        Self {
            api,
            executor: RetryingExecutor::new(Arc::new(governor), config.retry),
            cache: ResponseCache::new(Arc::clone(&clock), config.cache),
            clock,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn executor(&self) -> &RetryingExecutor {
        &self.executor
    }

    pub fn cache(&self) -> &ResponseCache<Payload> {
        &self.cache
    }

    /// Query the current quota directly, outside the governor.
    pub async fn quota(&self) -> Result<QuotaSnapshot> {
        self.api.quota().await
    }

    /// Repositories of `org` updated after `since`.
    pub async fn org_repositories(
        &self,
        org: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Option<Vec<RepositorySummary>>> {
        self.cached(
            keys::org_repos(org, since),
            Payload::Repositories,
            |payload| match payload {
                Payload::Repositories(repos) => Some(repos),
                _ => None,
            },
            || self.api.list_org_repos(org, since),
        )
        .await
    }

    /// Pull requests of `repo` updated after `since`. Never cached.
    pub async fn pull_requests(
        &self,
        repo: &RepoRef,
        since: Option<DateTime<Utc>>,
    ) -> Result<Option<Vec<PullRequestSummary>>> {
        let resource = repo.to_string();
        self.executor
            .execute(&resource, || self.api.list_pull_requests(repo, since))
            .await
    }

    /// Detail of pull request `number` in `repo`.
    pub async fn pull_request(
        &self,
        repo: &RepoRef,
        number: u64,
    ) -> Result<Option<PullRequestDetail>> {
        self.cached(
            keys::pull_request(repo, number),
            |detail| Payload::PullRequest(Box::new(detail)),
            |payload| match payload {
                Payload::PullRequest(detail) => Some(*detail),
                _ => None,
            },
            || self.api.get_pull_request(repo, number),
        )
        .await
    }

    /// Reviews of pull request `number` in `repo`.
    pub async fn reviews(
        &self,
        repo: &RepoRef,
        number: u64,
    ) -> Result<Option<Vec<ReviewSummary>>> {
        self.cached(
            keys::reviews(repo, number),
            Payload::Reviews,
            |payload| match payload {
                Payload::Reviews(reviews) => Some(reviews),
                _ => None,
            },
            || self.api.list_reviews(repo, number),
        )
        .await
    }

    /// Full profile of `login`.
    pub async fn user(&self, login: &str) -> Result<Option<UserSummary>> {
        self.cached(
            keys::user(login),
            Payload::User,
            |payload| match payload {
                Payload::User(user) => Some(user),
                _ => None,
            },
            || self.api.get_user(login),
        )
        .await
    }

    async fn cached<T, F, Fut>(
        &self,
        key: String,
        wrap: impl FnOnce(T) -> Payload,
        unwrap: impl FnOnce(Payload) -> Option<T>,
        call: F,
    ) -> Result<Option<T>>
    where
        T: Clone,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(value) = self.cache.get(&key).and_then(unwrap) {
            tracing::trace!(key = %key, "Cache hit");
            return Ok(Some(value));
        }

        let fetched = self.executor.execute(&key, call).await?;
        if let Some(value) = &fetched {
            self.cache.put(key, wrap(value.clone()));
        }
        Ok(fetched)
    }
}
