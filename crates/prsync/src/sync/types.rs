//! Sync options and the summary reported at the end of a run.

use crate::concurrency::DEFAULT_POOL_SIZE;

/// Review fan-out goes through the worker pool above this many reviews.
pub const DEFAULT_REVIEW_FANOUT_THRESHOLD: usize = 3;

/// Whether stored cursors limit what is fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Fetch only what changed since the stored cursors.
    #[default]
    Incremental,
    /// Ignore every cursor and refetch everything for this run.
    Full,
}

impl SyncMode {
    pub fn is_full(self) -> bool {
        matches!(self, Self::Full)
    }
}

/// Options for a sync run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub mode: SyncMode,
    /// Process repositories (and large review batches) on a worker pool.
    pub concurrent: bool,
    /// Workers per fan-out point.
    pub pool_size: usize,
    /// Review count above which author lookups are fanned out.
    pub review_fanout_threshold: usize,
    /// Report skips at info level and always fan out review lookups.
    pub verbose: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            mode: SyncMode::Incremental,
            concurrent: false,
            pool_size: DEFAULT_POOL_SIZE,
            review_fanout_threshold: DEFAULT_REVIEW_FANOUT_THRESHOLD,
            verbose: false,
        }
    }
}

impl SyncOptions {
    /// Whether the author lookups of `review_count` reviews use the pool.
    pub fn fans_out_reviews(&self, review_count: usize) -> bool {
        self.concurrent && (self.verbose || review_count > self.review_fanout_threshold)
    }
}

/// Outcome counts for one entity kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntityCounts {
    /// Fetched and written.
    pub synced: usize,
    /// Passed over without a write (unchanged, vanished, or invalid).
    pub skipped: usize,
    /// Failed; the enclosing cursor was left in place.
    pub failed: usize,
}

impl EntityCounts {
    pub fn total(&self) -> usize {
        self.synced + self.skipped + self.failed
    }

    fn absorb(&mut self, other: EntityCounts) {
        self.synced += other.synced;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

/// Counts per entity kind for a run, plus every non-fatal error message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    /// Organizations whose listing completed.
    pub organizations: usize,
    /// Organizations abandoned after their listing or cursor step failed.
    pub organizations_failed: usize,
    pub repositories: EntityCounts,
    pub pull_requests: EntityCounts,
    pub reviews: EntityCounts,
    /// User rows written, counted once per pull request that references them.
    pub users: EntityCounts,
    /// Errors encountered (non-fatal).
    pub errors: Vec<String>,
}

impl SyncSummary {
    /// Add the counts and errors of `other` into this summary.
    pub fn absorb(&mut self, other: SyncSummary) {
        self.organizations += other.organizations;
        self.organizations_failed += other.organizations_failed;
        self.repositories.absorb(other.repositories);
        self.pull_requests.absorb(other.pull_requests);
        self.reviews.absorb(other.reviews);
        self.users.absorb(other.users);
        self.errors.extend(other.errors);
    }

    /// Whether any entity failed during the run.
    pub fn has_failures(&self) -> bool {
        !self.errors.is_empty()
            || self.organizations_failed > 0
            || self.repositories.failed > 0
            || self.pull_requests.failed > 0
    }
}
