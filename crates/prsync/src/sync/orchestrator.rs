//! The sync cascade: organization → repository → pull request → reviews and users.
//!
//! # Example
//!
//! ```ignore
//! use prsync::sync::{SyncOptions, SyncOrchestrator};
//!
//! let orchestrator = SyncOrchestrator::builder()
//!     .access(access)
//!     .database(db)
//!     .options(SyncOptions::default())
//!     .build()?;
//!
//! let summary = orchestrator.sync_organization("rust-lang").await?;
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use sea_orm::{DatabaseConnection, TransactionTrait};
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::access::{
    AccessLayer, Clock, PullRequestSummary, RepoRef, RepositorySummary, ReviewSummary, UserSummary,
};
use crate::concurrency::WorkerPool;
use crate::store::reviews::ReviewRecord;
use crate::store::{pull_requests, repositories, reviews, users};

use super::errors::{Result, SyncError};
use super::filter;
use super::types::{SyncOptions, SyncSummary};

/// Builder for creating a [`SyncOrchestrator`].
#[derive(Default)]
pub struct SyncOrchestratorBuilder {
    access: Option<Arc<AccessLayer>>,
    database: Option<Arc<DatabaseConnection>>,
    options: Option<SyncOptions>,
}

impl SyncOrchestratorBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the access layer used for every remote read.
    pub fn access(mut self, access: Arc<AccessLayer>) -> Self {
        self.access = Some(access);
        self
    }

    /// Set the database connection pool.
    pub fn database(mut self, db: Arc<DatabaseConnection>) -> Self {
        self.database = Some(db);
        self
    }

    /// Set sync options.
    pub fn options(mut self, options: SyncOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Build the orchestrator.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::MissingField` if the access layer or database is not set.
    pub fn build(self) -> Result<SyncOrchestrator> {
        let access = self
            .access
            .ok_or(SyncError::MissingField { field: "access" })?;
        let db = self
            .database
            .ok_or(SyncError::MissingField { field: "database" })?;
        let clock = Arc::clone(access.clock());

        Ok(SyncOrchestrator {
            access,
            db,
            clock,
            options: self.options.unwrap_or_default(),
        })
    }
}

/// Walks organizations down to reviews, writing what changed.
///
/// Cloning is cheap; clones share the access layer and the connection pool.
#[derive(Clone)]
pub struct SyncOrchestrator {
    access: Arc<AccessLayer>,
    db: Arc<DatabaseConnection>,
    clock: Arc<dyn Clock>,
    options: SyncOptions,
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("access", &self.access)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
enum PullOutcome {
    Skipped,
    Synced {
        reviews_written: usize,
        reviews_skipped: usize,
        users_written: usize,
    },
}

/// Result of one repository branch.
#[derive(Debug)]
struct RepositoryReport {
    external_id: i64,
    /// Every pull request was written or skipped, and the cursor advanced.
    complete: bool,
    summary: SyncSummary,
}

impl RepositoryReport {
    fn new(external_id: i64) -> Self {
        Self {
            external_id,
            complete: false,
            summary: SyncSummary::default(),
        }
    }

    fn failed(repo: &RepositorySummary, err: &SyncError) -> Self {
        let mut report = Self::new(repo.external_id);
        report.summary.repositories.failed = 1;
        report
            .summary
            .errors
            .push(format!("{}: {}", repo.full_name(), err));
        report
    }
}

#[derive(Debug, Default)]
struct RepositoryBatch {
    reports: Vec<RepositoryReport>,
    /// Workers that died without a report.
    lost: Vec<String>,
}

impl SyncOrchestrator {
    /// Create a new builder.
    pub fn builder() -> SyncOrchestratorBuilder {
        SyncOrchestratorBuilder::new()
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    pub fn access(&self) -> &Arc<AccessLayer> {
        &self.access
    }

    pub fn database(&self) -> &Arc<DatabaseConnection> {
        &self.db
    }

    /// Sync several organizations one after another.
    ///
    /// An organization whose listing or cursor step fails is counted in
    /// `organizations_failed` and the next one is synced.
    ///
    /// # Errors
    ///
    /// Stops only on an authentication failure.
    pub async fn sync_organizations<S: AsRef<str>>(&self, orgs: &[S]) -> Result<SyncSummary> {
        let mut summary = SyncSummary::default();
        for org in orgs {
            let org = org.as_ref();
            match self.sync_organization(org).await {
                Ok(part) => summary.absorb(part),
                Err(err) if err.is_global() => return Err(err),
                Err(err) => {
                    tracing::error!(org, error = %err, "Organization sync failed");
                    summary.organizations_failed += 1;
                    summary.errors.push(format!("{}: {}", org, err));
                }
            }
        }
        Ok(summary)
    }

    /// Sync every repository of `org` that changed since its cursor.
    ///
    /// Branch failures are logged and counted; the returned summary covers
    /// them. The cursors of failed repositories are left in place.
    pub async fn sync_organization(&self, org: &str) -> Result<SyncSummary> {
        let started_at = self.clock.now();
        let cursor = repositories::organization_cursor(self.db.as_ref(), org).await?;
        let since = filter::cutoff(self.options.mode, cursor);
        tracing::info!(org, since = ?since, mode = ?self.options.mode, "Listing repositories");

        let mut summary = SyncSummary::default();
        let Some(repos) = self.access.org_repositories(org, since).await? else {
            tracing::warn!(org, "Organization not found");
            summary
                .errors
                .push(format!("{}: organization not found", org));
            return Ok(summary);
        };
        tracing::info!(org, count = repos.len(), "Fetched repositories");

        let batch = if self.options.concurrent {
            self.sync_repositories_concurrent(repos).await?
        } else {
            self.sync_repositories_sequential(repos).await?
        };

        let mut incomplete = Vec::new();
        for report in batch.reports {
            if !report.complete {
                incomplete.push(report.external_id);
            }
            summary.absorb(report.summary);
        }

        let unrecorded = self.unrecorded_repositories(&incomplete).await?;
        if batch.lost.is_empty() && unrecorded.is_empty() {
            let touched =
                repositories::touch_organization(self.db.as_ref(), org, started_at, &incomplete)
                    .await?;
            tracing::debug!(org, touched, "Advanced organization cursor");
        } else {
            // A repository without a row cannot hold the derived cursor back.
            let rewound =
                repositories::rewind_organization(self.db.as_ref(), org, cursor).await?;
            tracing::warn!(
                org,
                lost = batch.lost.len(),
                unrecorded = ?unrecorded,
                rewound,
                "Repositories left no record, organization cursor kept at its previous value"
            );
        }
        if !batch.lost.is_empty() {
            summary.repositories.failed += batch.lost.len();
            summary.errors.extend(batch.lost);
        }

        summary.organizations += 1;
        tracing::info!(
            org,
            repositories = summary.repositories.synced,
            pull_requests = summary.pull_requests.synced,
            skipped = summary.pull_requests.skipped,
            failed = summary.pull_requests.failed + summary.repositories.failed,
            "Organization sync complete"
        );
        Ok(summary)
    }

    /// External ids among `incomplete` that have no stored row.
    async fn unrecorded_repositories(&self, incomplete: &[i64]) -> Result<Vec<i64>> {
        let mut unrecorded = Vec::new();
        for &external_id in incomplete {
            if repositories::find_by_external_id(self.db.as_ref(), external_id)
                .await?
                .is_none()
            {
                unrecorded.push(external_id);
            }
        }
        Ok(unrecorded)
    }

    async fn sync_repositories_sequential(
        &self,
        repos: Vec<RepositorySummary>,
    ) -> Result<RepositoryBatch> {
        let mut batch = RepositoryBatch::default();
        for repo in repos {
            batch.reports.push(self.process_repository(repo).await?);
        }
        Ok(batch)
    }

    async fn sync_repositories_concurrent(
        &self,
        repos: Vec<RepositorySummary>,
    ) -> Result<RepositoryBatch> {
        let pool = WorkerPool::new(self.options.pool_size);
        let mut tasks = JoinSet::new();
        for repo in repos {
            let this = self.clone();
            pool.spawn(&mut tasks, async move { this.process_repository(repo).await });
        }

        let mut batch = RepositoryBatch::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(report)) => batch.reports.push(report),
                Ok(Err(err)) => {
                    tracing::error!(error = %err, "Aborting remaining repository workers");
                    tasks.shutdown().await;
                    return Err(err);
                }
                Err(join_err) => {
                    let err = SyncError::from(join_err);
                    tracing::warn!(error = %err, "Repository worker failed");
                    batch.lost.push(err.to_string());
                }
            }
        }
        Ok(batch)
    }

    /// Run one repository branch, absorbing every failure except global ones.
    async fn process_repository(&self, repo: RepositorySummary) -> Result<RepositoryReport> {
        match self.sync_repository(&repo).await {
            Ok(report) => Ok(report),
            Err(err) if err.is_global() => Err(err),
            Err(err) => {
                tracing::warn!(repo = %repo.full_name(), error = %err, "Repository sync failed");
                Ok(RepositoryReport::failed(&repo, &err))
            }
        }
    }

    async fn sync_repository(&self, repo: &RepositorySummary) -> Result<RepositoryReport> {
        let started_at = self.clock.now();
        let record = repositories::upsert(self.db.as_ref(), repo).await?;
        let repo_ref = repo.repo_ref();
        let since = filter::cutoff(
            self.options.mode,
            record.last_synced_at.map(|t| t.with_timezone(&Utc)),
        );

        let pulls = match self.access.pull_requests(&repo_ref, since).await? {
            Some(pulls) => pulls,
            None => {
                tracing::warn!(repo = %repo_ref, "Pull request listing not found, treating as empty");
                Vec::new()
            }
        };
        tracing::debug!(repo = %repo_ref, since = ?since, count = pulls.len(), "Fetched pull requests");

        let mut report = RepositoryReport::new(repo.external_id);
        let counts = &mut report.summary;
        for pull in &pulls {
            match self.sync_pull_request(&repo_ref, record.id, pull).await {
                Ok(PullOutcome::Skipped) => counts.pull_requests.skipped += 1,
                Ok(PullOutcome::Synced {
                    reviews_written,
                    reviews_skipped,
                    users_written,
                }) => {
                    counts.pull_requests.synced += 1;
                    counts.reviews.synced += reviews_written;
                    counts.reviews.skipped += reviews_skipped;
                    counts.users.synced += users_written;
                }
                Err(err) if err.is_global() => return Err(err),
                Err(err) => {
                    tracing::warn!(
                        repo = %repo_ref,
                        number = pull.number,
                        error = %err,
                        "Pull request sync failed, will retry next run"
                    );
                    counts.pull_requests.failed += 1;
                    counts
                        .errors
                        .push(format!("{}#{}: {}", repo_ref, pull.number, err));
                }
            }
        }

        if counts.pull_requests.failed == 0 {
            repositories::mark_synced(self.db.as_ref(), record.id, repo.updated_at, started_at)
                .await?;
            counts.repositories.synced += 1;
            report.complete = true;
        } else {
            counts.repositories.failed += 1;
        }
        Ok(report)
    }

    async fn sync_pull_request(
        &self,
        repo: &RepoRef,
        repository_id: Uuid,
        pull: &PullRequestSummary,
    ) -> Result<PullOutcome> {
        let stored = pull_requests::find_by_external_id(self.db.as_ref(), pull.external_id).await?;
        let stored_last_synced = stored
            .as_ref()
            .and_then(|row| row.last_synced_at)
            .map(|t| t.with_timezone(&Utc));
        let stored_updated = stored.as_ref().map(|row| row.updated_at.with_timezone(&Utc));

        if filter::should_skip(
            self.options.mode,
            stored_last_synced,
            stored_updated,
            pull.updated_at,
        ) {
            self.report_skip(repo, pull.number);
            return Ok(PullOutcome::Skipped);
        }

        let Some(detail) = self.access.pull_request(repo, pull.number).await? else {
            tracing::warn!(repo = %repo, number = pull.number, "Pull request not found, skipping");
            return Ok(PullOutcome::Skipped);
        };
        let fetched = self
            .access
            .reviews(repo, pull.number)
            .await?
            .unwrap_or_default();

        let mut reviews_skipped = 0;
        let mut attributed: Vec<(&ReviewSummary, &UserSummary)> = Vec::with_capacity(fetched.len());
        for review in &fetched {
            match &review.author {
                Some(author) => attributed.push((review, author)),
                None => {
                    let err = SyncError::MissingAuthor {
                        review_id: review.external_id,
                    };
                    tracing::warn!(
                        repo = %repo,
                        number = pull.number,
                        review_id = review.external_id,
                        error = %err,
                        "Skipping review"
                    );
                    reviews_skipped += 1;
                }
            }
        }

        let authors = self
            .resolve_authors(
                attributed.iter().map(|(_, author)| (*author).clone()).collect(),
                fetched.len(),
            )
            .await?;

        let mut people: Vec<UserSummary> = detail.summary.author.iter().cloned().collect();
        people.extend(authors.values().cloned());

        // Everything below commits together or not at all.
        let now = self.clock.now();
        let txn = self.db.begin().await?;
        let user_ids = users::upsert_many(&txn, &people, now).await?;
        let author_id = detail
            .summary
            .author
            .as_ref()
            .and_then(|author| user_ids.get(&author.external_id).copied());
        let row = pull_requests::upsert(&txn, repository_id, &detail, author_id, now).await?;

        let mut records = Vec::with_capacity(attributed.len());
        for &(review, embedded) in &attributed {
            let author = authors.get(&login_key(&embedded.login)).unwrap_or(embedded);
            match user_ids.get(&author.external_id) {
                Some(&author_id) => records.push(ReviewRecord { review, author_id }),
                None => {
                    tracing::warn!(
                        repo = %repo,
                        number = pull.number,
                        review_id = review.external_id,
                        "Review author was not stored, skipping review"
                    );
                    reviews_skipped += 1;
                }
            }
        }
        let reviews_written = reviews::upsert_many(&txn, row.id, &records).await? as usize;
        txn.commit().await?;

        tracing::debug!(
            repo = %repo,
            number = pull.number,
            reviews = reviews_written,
            users = user_ids.len(),
            "Pull request synced"
        );
        Ok(PullOutcome::Synced {
            reviews_written,
            reviews_skipped,
            users_written: user_ids.len(),
        })
    }

    /// Look up the full profile of each distinct review author.
    ///
    /// Keyed by lowercased login.
    async fn resolve_authors(
        &self,
        embedded: Vec<UserSummary>,
        review_count: usize,
    ) -> Result<HashMap<String, UserSummary>> {
        let mut distinct: BTreeMap<String, UserSummary> = BTreeMap::new();
        for user in embedded {
            distinct.entry(login_key(&user.login)).or_insert(user);
        }

        let mut resolved = HashMap::with_capacity(distinct.len());
        if !self.options.fans_out_reviews(review_count) {
            for (key, user) in distinct {
                resolved.insert(key, resolve_user(&self.access, user).await?);
            }
            return Ok(resolved);
        }

        let pool = WorkerPool::new(self.options.pool_size);
        let mut tasks = JoinSet::new();
        for (key, user) in distinct {
            let access = Arc::clone(&self.access);
            pool.spawn(&mut tasks, async move {
                let user = resolve_user(&access, user).await;
                (key, user)
            });
        }
        while let Some(joined) = tasks.join_next().await {
            let (key, user) = joined?;
            resolved.insert(key, user?);
        }
        Ok(resolved)
    }

    fn report_skip(&self, repo: &RepoRef, number: u64) {
        if self.options.verbose {
            tracing::info!(repo = %repo, number, "Skipping pull request, unchanged since last sync");
        } else {
            tracing::debug!(repo = %repo, number, "Skipping pull request, unchanged since last sync");
        }
    }
}

fn login_key(login: &str) -> String {
    login.to_ascii_lowercase()
}

/// Full profile of `embedded`, or `embedded` itself when the lookup fails.
///
/// Only authentication failures are propagated.
async fn resolve_user(access: &AccessLayer, embedded: UserSummary) -> Result<UserSummary> {
    match access.user(&embedded.login).await {
        Ok(Some(profile)) => Ok(profile),
        Ok(None) => {
            tracing::warn!(login = %embedded.login, "User not found, keeping review identity");
            Ok(embedded)
        }
        Err(err) if err.is_auth() => Err(err.into()),
        Err(err) => {
            tracing::warn!(
                login = %embedded.login,
                error = %err,
                "User lookup failed, keeping review identity"
            );
            Ok(embedded)
        }
    }
}
