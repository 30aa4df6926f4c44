//! Time-boxed memoization of idempotent remote fetches.
//!
//! Entries are valid while `now - stored_at < ttl`. Expired entries are
//! dropped lazily on the lookup that finds them; nothing sweeps the map.
//!
//! The map lock is held only for the lookup or insert itself, never across
//! the remote call that produces a value. Two workers missing on the same key
//! at once may therefore both fetch; the later `put` wins.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::concurrency::SharedState;

use super::clock::Clock;
use super::types::RepoRef;

/// Default time-to-live for cached responses.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(600);

/// Configuration for [`ResponseCache`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_CACHE_TTL,
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    stored_at: DateTime<Utc>,
}

/// Composite cache keys, one builder per cached resource kind.
pub mod keys {
    use chrono::{DateTime, Utc};

    use super::RepoRef;

    /// Repository listing of an organization for a given cutoff.
    pub fn org_repos(org: &str, since: Option<DateTime<Utc>>) -> String {
        match since {
            Some(cutoff) => format!("repos:{}:since:{}", org, cutoff.timestamp_millis()),
            None => format!("repos:{}", org),
        }
    }

    /// Detail of one pull request.
    pub fn pull_request(repo: &RepoRef, number: u64) -> String {
        format!("pull:{}/{}#{}", repo.owner, repo.name, number)
    }

    /// Reviews of one pull request.
    pub fn reviews(repo: &RepoRef, number: u64) -> String {
        format!("reviews:{}/{}#{}", repo.owner, repo.name, number)
    }

    /// Profile of one user.
    pub fn user(login: &str) -> String {
        format!("user:{}", login.to_ascii_lowercase())
    }
}

/// TTL cache keyed by logical resource identity.
#[derive(Debug)]
pub struct ResponseCache<V> {
    entries: SharedState<HashMap<String, CacheEntry<V>>>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl<V: Clone> ResponseCache<V> {
    pub fn new(clock: Arc<dyn Clock>, config: CacheConfig) -> Self {
        Self {
            entries: SharedState::new(HashMap::new()),
            clock,
            ttl: config.ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the value stored under `key` if it is still fresh.
    ///
    /// A stale entry is removed and reported as a miss.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        self.entries.with(|entries| {
            let entry = entries.get(key)?;
            if is_fresh(entry.stored_at, now, self.ttl) {
                return Some(entry.value.clone());
            }
            entries.remove(key);
            tracing::trace!(key, "Evicted stale cache entry");
            None
        })
    }

    /// Store `value` under `key`, replacing any previous entry.
    pub fn put(&self, key: impl Into<String>, value: V) {
        let entry = CacheEntry {
            value,
            stored_at: self.clock.now(),
        };
        self.entries.with(|entries| {
            entries.insert(key.into(), entry);
        });
    }

    /// Number of entries held, fresh or not.
    pub fn len(&self) -> usize {
        self.entries.with(|entries| entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn is_fresh(stored_at: DateTime<Utc>, now: DateTime<Utc>, ttl: Duration) -> bool {
    match (now - stored_at).to_std() {
        Ok(age) => age < ttl,
        // Stored "in the future" (clock moved backwards): treat as brand new.
        Err(_) => true,
    }
}
