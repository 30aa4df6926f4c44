//! Shared fixtures for integration tests: a scripted remote and a database harness.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use prsync::access::{
    self, AccessConfig, AccessLayer, ApiError, ManualClock, PullRequestDetail, PullRequestSummary,
    QuotaSnapshot, QuotaSource, RemoteApi, RepoRef, RepositorySummary, ReviewSummary, UserSummary,
    updated_since,
};
use prsync::sync::{SyncOptions, SyncOrchestrator};
use sea_orm::DatabaseConnection;

/// Upper bound for any single test run.
pub const RUN_TIMEOUT: Duration = Duration::from_secs(30);

pub fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, day, hour, 0, 0).unwrap()
}

// ─── Fixtures ────────────────────────────────────────────────────────────────

pub fn user(id: i64, login: &str) -> UserSummary {
    UserSummary {
        external_id: id,
        login: login.to_string(),
        name: None,
        kind: "User".to_string(),
    }
}

pub fn repo(id: i64, org: &str, name: &str, updated_at: DateTime<Utc>) -> RepositorySummary {
    RepositorySummary {
        external_id: id,
        organization: org.to_string(),
        name: name.to_string(),
        description: None,
        default_branch: "main".to_string(),
        is_private: false,
        is_archived: false,
        updated_at,
    }
}

pub fn pull(
    id: i64,
    number: u64,
    updated_at: DateTime<Utc>,
    author: Option<UserSummary>,
) -> PullRequestSummary {
    PullRequestSummary {
        external_id: id,
        number,
        title: format!("Change #{}", number),
        state: "open".to_string(),
        author,
        created_at: at(1, 0),
        updated_at,
    }
}

pub fn review(id: i64, author: Option<UserSummary>) -> ReviewSummary {
    ReviewSummary {
        external_id: id,
        author,
        state: "APPROVED".to_string(),
        body: None,
        submitted_at: Some(at(1, 12)),
    }
}

// ─── Scripted remote ─────────────────────────────────────────────────────────

struct Injected {
    error: ApiError,
    /// `None` fails forever.
    remaining: Option<usize>,
}

#[derive(Default)]
struct Script {
    repos: HashMap<String, Vec<RepositorySummary>>,
    pulls: HashMap<String, Vec<PullRequestSummary>>,
    details: HashMap<String, PullRequestDetail>,
    reviews: HashMap<String, Vec<ReviewSummary>>,
    users: HashMap<String, UserSummary>,
    failures: HashMap<String, Injected>,
    calls: Vec<String>,
    /// Answer pull request listings as if the remote had no "since" filter.
    ignore_pull_since: bool,
}

/// In-memory [`RemoteApi`] driven by a script, recording every call.
///
/// Call keys: `repos:{org}`, `pulls:{o}/{r}`, `pull:{o}/{r}#{n}`,
/// `reviews:{o}/{r}#{n}`, `user:{login}`.
#[derive(Default)]
pub struct FakeRemote {
    script: Mutex<Script>,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn with<R>(&self, f: impl FnOnce(&mut Script) -> R) -> R {
        let mut script = self.script.lock().unwrap();
        f(&mut script)
    }

    pub fn add_repo(&self, repo: RepositorySummary) {
        self.with(|s| {
            s.pulls.entry(repo.full_name()).or_default();
            s.repos
                .entry(repo.organization.to_lowercase())
                .or_default()
                .push(repo);
        });
    }

    /// Register a pull request with a matching detail and no reviews.
    pub fn add_pull(&self, full_name: &str, pull: PullRequestSummary) {
        let key = format!("{}#{}", full_name, pull.number);
        self.with(|s| {
            s.details.insert(
                key.clone(),
                PullRequestDetail {
                    summary: pull.clone(),
                    additions: 10,
                    deletions: 3,
                    changed_files: 2,
                    commits: 1,
                    merged: false,
                    closed_at: None,
                    merged_at: None,
                },
            );
            s.reviews.entry(key).or_default();
            s.pulls.entry(full_name.to_string()).or_default().push(pull);
        });
    }

    pub fn set_reviews(&self, full_name: &str, number: u64, reviews: Vec<ReviewSummary>) {
        self.with(|s| {
            s.reviews.insert(format!("{}#{}", full_name, number), reviews);
        });
    }

    /// Make the pull request disappear from its detail endpoint.
    pub fn remove_detail(&self, full_name: &str, number: u64) {
        self.with(|s| {
            s.details.remove(&format!("{}#{}", full_name, number));
        });
    }

    pub fn ignore_pull_since(&self, ignore: bool) {
        self.with(|s| s.ignore_pull_since = ignore);
    }

    pub fn add_user(&self, user: UserSummary) {
        self.with(|s| {
            s.users.insert(user.login.to_lowercase(), user);
        });
    }

    /// Change the title and "updated" timestamp of a pull request.
    pub fn touch_pull(&self, full_name: &str, number: u64, title: &str, updated_at: DateTime<Utc>) {
        let key = format!("{}#{}", full_name, number);
        self.with(|s| {
            if let Some(pulls) = s.pulls.get_mut(full_name) {
                for pull in pulls.iter_mut().filter(|p| p.number == number) {
                    pull.title = title.to_string();
                    pull.updated_at = updated_at;
                }
            }
            if let Some(detail) = s.details.get_mut(&key) {
                detail.summary.title = title.to_string();
                detail.summary.updated_at = updated_at;
            }
        });
    }

    pub fn touch_repo(&self, org: &str, name: &str, updated_at: DateTime<Utc>) {
        self.with(|s| {
            if let Some(repos) = s.repos.get_mut(&org.to_lowercase()) {
                for repo in repos.iter_mut().filter(|r| r.name == name) {
                    repo.updated_at = updated_at;
                }
            }
        });
    }

    /// Fail the next `times` calls for `key` with `error`.
    pub fn fail(&self, key: &str, error: ApiError, times: usize) {
        self.with(|s| {
            s.failures.insert(
                key.to_string(),
                Injected {
                    error,
                    remaining: Some(times),
                },
            );
        });
    }

    /// Fail every call for `key` with `error` until [`FakeRemote::heal`].
    pub fn fail_always(&self, key: &str, error: ApiError) {
        self.with(|s| {
            s.failures.insert(
                key.to_string(),
                Injected {
                    error,
                    remaining: None,
                },
            );
        });
    }

    pub fn heal(&self, key: &str) {
        self.with(|s| {
            s.failures.remove(key);
        });
    }

    /// Every recorded call, in order.
    pub fn calls(&self) -> Vec<String> {
        self.with(|s| s.calls.clone())
    }

    /// Recorded calls starting with `prefix`.
    pub fn calls_to(&self, prefix: &str) -> Vec<String> {
        self.with(|s| {
            s.calls
                .iter()
                .filter(|call| call.starts_with(prefix))
                .cloned()
                .collect()
        })
    }

    pub fn clear_calls(&self) {
        self.with(|s| s.calls.clear());
    }

    fn record(&self, key: String) -> access::Result<()> {
        self.with(|s| {
            s.calls.push(key.clone());
            let Some(injected) = s.failures.get_mut(&key) else {
                return Ok(());
            };
            match &mut injected.remaining {
                None => Err(injected.error.clone()),
                Some(0) => Ok(()),
                Some(left) => {
                    *left -= 1;
                    Err(injected.error.clone())
                }
            }
        })
    }
}

#[async_trait]
impl QuotaSource for FakeRemote {
    async fn quota(&self) -> access::Result<QuotaSnapshot> {
        Ok(QuotaSnapshot {
            limit: 5000,
            remaining: 5000,
            reset_at: at(31, 0),
        })
    }
}

#[async_trait]
impl RemoteApi for FakeRemote {
    async fn list_org_repos(
        &self,
        org: &str,
        since: Option<DateTime<Utc>>,
    ) -> access::Result<Vec<RepositorySummary>> {
        self.record(format!("repos:{}", org))?;
        let repos = self
            .with(|s| s.repos.get(&org.to_lowercase()).cloned())
            .ok_or_else(|| ApiError::not_found(format!("organization {}", org)))?;
        Ok(updated_since(repos, since, |r| r.updated_at))
    }

    async fn list_pull_requests(
        &self,
        repo: &RepoRef,
        since: Option<DateTime<Utc>>,
    ) -> access::Result<Vec<PullRequestSummary>> {
        self.record(format!("pulls:{}", repo))?;
        let (pulls, ignore_since) = self.with(|s| {
            (s.pulls.get(&repo.to_string()).cloned(), s.ignore_pull_since)
        });
        let pulls = pulls.ok_or_else(|| ApiError::not_found(format!("repository {}", repo)))?;
        let since = if ignore_since { None } else { since };
        Ok(updated_since(pulls, since, |p| p.updated_at))
    }

    async fn get_pull_request(
        &self,
        repo: &RepoRef,
        number: u64,
    ) -> access::Result<PullRequestDetail> {
        let key = format!("{}#{}", repo, number);
        self.record(format!("pull:{}", key))?;
        self.with(|s| s.details.get(&key).cloned())
            .ok_or_else(|| ApiError::not_found(format!("pull request {}", key)))
    }

    async fn list_reviews(
        &self,
        repo: &RepoRef,
        number: u64,
    ) -> access::Result<Vec<ReviewSummary>> {
        let key = format!("{}#{}", repo, number);
        self.record(format!("reviews:{}", key))?;
        Ok(self.with(|s| s.reviews.get(&key).cloned().unwrap_or_default()))
    }

    async fn get_user(&self, login: &str) -> access::Result<UserSummary> {
        self.record(format!("user:{}", login))?;
        self.with(|s| s.users.get(&login.to_lowercase()).cloned())
            .ok_or_else(|| ApiError::not_found(format!("user {}", login)))
    }
}

// ─── Harness ─────────────────────────────────────────────────────────────────

/// A fresh in-memory database, a scripted remote, and a manual clock.
pub struct Harness {
    pub remote: Arc<FakeRemote>,
    pub clock: ManualClock,
    pub db: Arc<DatabaseConnection>,
}

impl Harness {
    pub async fn new() -> Self {
        let db = prsync::connect_and_migrate("sqlite::memory:")
            .await
            .expect("test db should migrate");
        Self {
            remote: FakeRemote::new(),
            clock: ManualClock::new(at(1, 9)),
            db: Arc::new(db),
        }
    }

    /// Access layer with millisecond time units and an empty cache.
    pub fn access(&self, concurrent: bool) -> Arc<AccessLayer> {
        let config = AccessConfig::default()
            .with_time_unit(Duration::from_millis(1))
            .with_concurrency(concurrent);
        Arc::new(AccessLayer::new(
            Arc::clone(&self.remote),
            Arc::new(self.clock.clone()),
            config,
        ))
    }

    /// An orchestrator for one run; every run starts with an empty cache.
    pub fn orchestrator(&self, options: SyncOptions) -> SyncOrchestrator {
        SyncOrchestrator::builder()
            .access(self.access(options.concurrent))
            .database(Arc::clone(&self.db))
            .options(options)
            .build()
            .expect("orchestrator should build")
    }
}
