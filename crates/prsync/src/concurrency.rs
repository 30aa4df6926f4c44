//! Worker pool and locking primitives shared by the access layer and the sync.
//!
//! Two kinds of shared state exist:
//!
//! - Short map or snapshot accesses go through [`SharedState`], a locked
//!   cell that only hands out access inside a closure, so a guard can never be
//!   held across an `.await`.
//! - Multi-step sections that must not interleave between workers (quota check
//!   followed by the wait it decides on) go through a [`LockStrategy`]. When
//!   concurrency is disabled the strategy is [`NoopLock`] and entering is free.
//!
//! Only the second kind follows [`lock_strategy`]. The access layer is shared
//! behind an `Arc` in both modes, so its state must be `Sync` either way, and a
//! [`SharedState`] guard never outlives its closure. In sequential mode the
//! mutex is therefore never contended and never waited on.

use std::future::Future;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard, Semaphore};
use tokio::task::JoinSet;

/// Default number of workers per fan-out point.
pub const DEFAULT_POOL_SIZE: usize = 5;

/// Guard returned by [`LockStrategy::enter`]. Dropping it leaves the section.
pub type SectionGuard<'a> = Option<AsyncMutexGuard<'a, ()>>;

/// Capability to serialize a critical section across workers.
#[async_trait]
pub trait LockStrategy: Send + Sync + std::fmt::Debug {
    /// Enter the section, waiting for any other holder to leave.
    async fn enter(&self) -> SectionGuard<'_>;

    /// Whether entering actually excludes other workers.
    fn is_exclusive(&self) -> bool;
}

/// Mutual exclusion for concurrent mode.
#[derive(Debug, Default)]
pub struct ExclusiveLock {
    inner: AsyncMutex<()>,
}

#[async_trait]
impl LockStrategy for ExclusiveLock {
    async fn enter(&self) -> SectionGuard<'_> {
        Some(self.inner.lock().await)
    }

    fn is_exclusive(&self) -> bool {
        true
    }
}

/// No locking, for sequential mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLock;

#[async_trait]
impl LockStrategy for NoopLock {
    async fn enter(&self) -> SectionGuard<'_> {
        None
    }

    fn is_exclusive(&self) -> bool {
        false
    }
}

/// Pick the lock strategy for the given mode.
pub fn lock_strategy(concurrent: bool) -> Arc<dyn LockStrategy> {
    if concurrent {
        Arc::new(ExclusiveLock::default())
    } else {
        Arc::new(NoopLock)
    }
}

/// State shared between workers, reachable only through locked accessors.
///
/// Locked in both modes; see the module docs for how this relates to
/// [`LockStrategy`].
#[derive(Debug, Default)]
pub struct SharedState<T> {
    cell: Mutex<T>,
}

impl<T> SharedState<T> {
    pub fn new(value: T) -> Self {
        Self {
            cell: Mutex::new(value),
        }
    }

    /// Run `f` with exclusive access to the state.
    ///
    /// A panic in a previous holder does not poison the state for later callers.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.cell.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }
}

impl<T: Clone> SharedState<T> {
    /// Clone the current value out of the cell.
    pub fn snapshot(&self) -> T {
        self.with(|value| value.clone())
    }
}

/// Fixed-size pool bounding how many spawned tasks run at once.
///
/// Each fan-out point builds its own pool; pools are not shared globally.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    /// Create a pool running at most `size` tasks at once (minimum 1).
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Spawn `work` onto `tasks`; it starts once a pool slot is free.
    ///
    /// The slot is released when `work` finishes, whether it returns or panics.
    pub fn spawn<T, F>(&self, tasks: &mut JoinSet<T>, work: F)
    where
        T: Send + 'static,
        F: Future<Output = T> + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        tasks.spawn(async move {
            // Never closed, so acquisition cannot fail.
            let _permit = permits.acquire_owned().await.ok();
            work.await
        });
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_SIZE)
    }
}
