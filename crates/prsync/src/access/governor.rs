//! Quota-aware admission control for remote calls.
//!
//! Before every call the governor refreshes the quota snapshot and decides
//! how long the caller must wait:
//!
//! - quota exhausted: wait until the reset instant, rounded up to whole seconds
//! - quota below [`LOW_QUOTA_PERCENT`] of the limit: pause one time unit
//! - otherwise: no wait
//!
//! The refresh and the wait happen inside one critical section, so in
//! concurrent mode two workers cannot both observe spare quota and burst past
//! the boundary together.

use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use governor::clock::Clock as _;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

use crate::concurrency::{LockStrategy, SharedState};

use super::clock::Clock;
use super::types::{QuotaSnapshot, QuotaSource};

/// Remaining quota, as a percentage of the limit, below which calls are paced.
pub const LOW_QUOTA_PERCENT: u64 = 10;

/// Type alias for the steady-rate limiter.
type Pacer = RateLimiter<NotKeyed, InMemoryState, PacerClock, NoOpMiddleware<Duration>>;

/// Rate limiter clock reading tokio's time, so pacing follows a paused runtime.
#[derive(Debug, Clone, Copy)]
struct PacerClock {
    origin: tokio::time::Instant,
}

impl PacerClock {
    fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

impl governor::clock::Clock for PacerClock {
    type Instant = Duration;

    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Configuration for [`RateGovernor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GovernorConfig {
    /// Length of the short pause applied when quota runs low.
    pub time_unit: Duration,
    /// Threshold for the short pause, as a percentage of the limit.
    pub low_quota_percent: u64,
    /// Optional steady cap on requests per second, applied before the quota check.
    pub requests_per_second: Option<u32>,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            time_unit: Duration::from_secs(1),
            low_quota_percent: LOW_QUOTA_PERCENT,
            requests_per_second: None,
        }
    }
}

/// Tracks the remote quota and delays callers that would exceed it.
pub struct RateGovernor {
    source: Arc<dyn QuotaSource>,
    clock: Arc<dyn Clock>,
    lock: Arc<dyn LockStrategy>,
    config: GovernorConfig,
    snapshot: SharedState<Option<QuotaSnapshot>>,
    pacer: Option<(Pacer, PacerClock)>,
}

impl fmt::Debug for RateGovernor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateGovernor")
            .field("config", &self.config)
            .field("exclusive", &self.is_exclusive())
            .field("snapshot", &self.last_snapshot())
            .finish_non_exhaustive()
    }
}

impl RateGovernor {
    pub fn new(
        source: Arc<dyn QuotaSource>,
        clock: Arc<dyn Clock>,
        lock: Arc<dyn LockStrategy>,
        config: GovernorConfig,
    ) -> Self {
        // Burst of one: calls are spaced evenly instead of front-loaded.
        let pacer = config
            .requests_per_second
            .and_then(NonZeroU32::new)
            .map(|rps| {
                let clock = PacerClock::new();
                let quota = Quota::per_second(rps).allow_burst(NonZeroU32::MIN);
                (RateLimiter::direct_with_clock(quota, clock), clock)
            });

        Self {
            source,
            clock,
            lock,
            config,
            snapshot: SharedState::new(None),
            pacer,
        }
    }

    /// Whether admission is serialized across workers.
    pub fn is_exclusive(&self) -> bool {
        self.lock.is_exclusive()
    }

    /// The most recently observed quota, if any.
    pub fn last_snapshot(&self) -> Option<QuotaSnapshot> {
        self.snapshot.snapshot()
    }

    /// Wait until the next call may proceed, returning how long the quota
    /// policy made the caller wait.
    pub async fn admit(&self) -> Duration {
        let _section = self.lock.enter().await;

        if let Some((pacer, clock)) = &self.pacer {
            while let Err(not_until) = pacer.check() {
                tokio::time::sleep(not_until.wait_time_from(clock.now())).await;
            }
        }

        let wait = match self.refresh().await {
            Some(snapshot) => admission_delay(&snapshot, self.clock.now(), &self.config),
            None => Duration::ZERO,
        };

        if !wait.is_zero() {
            tracing::debug!(wait_ms = wait.as_millis() as u64, "Quota low, pausing before call");
            tokio::time::sleep(wait).await;
        }

        wait
    }

    /// Handle a quota-exceeded response by sleeping until the quota resets.
    ///
    /// The reset instant is recomputed from a fresh quota query, falling back
    /// to `reset_hint` from the failed response. Always waits at least one
    /// time unit so the caller's retry cannot spin.
    pub async fn wait_for_reset(&self, reset_hint: Option<DateTime<Utc>>) -> Duration {
        let _section = self.lock.enter().await;

        let refreshed = self
            .refresh()
            .await
            .filter(|snapshot| snapshot.remaining == 0)
            .map(|snapshot| snapshot.reset_at);
        let reset_at = match (refreshed, reset_hint) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };

        let wait = reset_at
            .map(|at| until_reset(at, self.clock.now()))
            .filter(|wait| !wait.is_zero())
            .unwrap_or(self.config.time_unit);

        tracing::warn!(
            wait_secs = wait.as_secs_f64(),
            reset_at = ?reset_at,
            "Rate limit exceeded, waiting for quota reset"
        );
        tokio::time::sleep(wait).await;
        wait
    }

    async fn refresh(&self) -> Option<QuotaSnapshot> {
        match self.source.quota().await {
            Ok(snapshot) => {
                self.snapshot.with(|slot| *slot = Some(snapshot));
                Some(snapshot)
            }
            Err(e) => {
                tracing::debug!(error = %e, "Quota query failed, using last known snapshot");
                self.last_snapshot()
            }
        }
    }
}

/// Decide how long a caller must wait given `snapshot` at `now`.
pub fn admission_delay(
    snapshot: &QuotaSnapshot,
    now: DateTime<Utc>,
    config: &GovernorConfig,
) -> Duration {
    if snapshot.remaining == 0 {
        return until_reset(snapshot.reset_at, now);
    }

    let low = snapshot.remaining.saturating_mul(100)
        < snapshot.limit.saturating_mul(config.low_quota_percent);
    if low {
        config.time_unit
    } else {
        Duration::ZERO
    }
}

/// Time from `now` until `reset_at`, rounded up to whole seconds; zero if past.
pub fn until_reset(reset_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    let millis = (reset_at - now).num_milliseconds();
    if millis <= 0 {
        Duration::ZERO
    } else {
        Duration::from_secs((millis as u64).div_ceil(1000))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::clock::ManualClock;
    use crate::access::errors::{ApiError, Result};
    use crate::concurrency::{ExclusiveLock, NoopLock};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FixedQuota {
        response: Mutex<Result<QuotaSnapshot>>,
        calls: AtomicU32,
    }

    impl FixedQuota {
        fn new(response: Result<QuotaSnapshot>) -> Arc<Self> {
            Arc::new(Self {
                response: Mutex::new(response),
                calls: AtomicU32::new(0),
            })
        }

        fn set(&self, response: Result<QuotaSnapshot>) {
            *self.response.lock().unwrap() = response;
        }
    }

    #[async_trait]
    impl QuotaSource for FixedQuota {
        async fn quota(&self) -> Result<QuotaSnapshot> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.response.lock().unwrap().clone()
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap()
    }

    fn snapshot(limit: u64, remaining: u64, reset_in_ms: i64) -> QuotaSnapshot {
        QuotaSnapshot {
            limit,
            remaining,
            reset_at: t0() + chrono::Duration::milliseconds(reset_in_ms),
        }
    }

    fn governor(source: Arc<FixedQuota>, lock: Arc<dyn LockStrategy>) -> RateGovernor {
        RateGovernor::new(
            source,
            Arc::new(ManualClock::new(t0())),
            lock,
            GovernorConfig::default(),
        )
    }

    // ─── Policy ──────────────────────────────────────────────────────────────

    #[test]
    fn test_exhausted_quota_waits_until_reset() {
        let config = GovernorConfig::default();
        let delay = admission_delay(&snapshot(5000, 0, 5_000), t0(), &config);
        assert_eq!(delay, Duration::from_secs(5));
    }

    #[test]
    fn test_exhausted_quota_rounds_up_to_whole_seconds() {
        let config = GovernorConfig::default();
        let delay = admission_delay(&snapshot(5000, 0, 4_200), t0(), &config);
        assert_eq!(delay, Duration::from_secs(5));
    }

    #[test]
    fn test_exhausted_quota_with_past_reset_proceeds() {
        let config = GovernorConfig::default();
        let delay = admission_delay(&snapshot(5000, 0, -3_000), t0(), &config);
        assert_eq!(delay, Duration::ZERO);
    }

    #[test]
    fn test_low_quota_pauses_one_unit() {
        let config = GovernorConfig {
            time_unit: Duration::from_millis(250),
            ..GovernorConfig::default()
        };
        let delay = admission_delay(&snapshot(5000, 499, 60_000), t0(), &config);
        assert_eq!(delay, Duration::from_millis(250));
    }

    #[test]
    fn test_quota_at_threshold_proceeds() {
        let config = GovernorConfig::default();
        assert_eq!(
            admission_delay(&snapshot(5000, 500, 60_000), t0(), &config),
            Duration::ZERO
        );
        assert_eq!(
            admission_delay(&snapshot(5000, 4999, 60_000), t0(), &config),
            Duration::ZERO
        );
    }

    // ─── Admission ───────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_admit_blocks_for_exactly_reset_interval() {
        let source = FixedQuota::new(Ok(snapshot(5000, 0, 7_000)));
        let gov = governor(source.clone(), Arc::new(NoopLock));

        let start = tokio::time::Instant::now();
        let waited = gov.admit().await;

        assert_eq!(waited, Duration::from_secs(7));
        assert_eq!(start.elapsed(), Duration::from_secs(7));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(gov.last_snapshot(), Some(snapshot(5000, 0, 7_000)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_admit_proceeds_immediately_with_healthy_quota() {
        let source = FixedQuota::new(Ok(snapshot(5000, 4000, 60_000)));
        let gov = governor(source, Arc::new(NoopLock));

        let start = tokio::time::Instant::now();
        assert_eq!(gov.admit().await, Duration::ZERO);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_admit_falls_back_to_last_snapshot_when_query_fails() {
        let source = FixedQuota::new(Ok(snapshot(5000, 0, 2_000)));
        let gov = governor(source.clone(), Arc::new(NoopLock));
        assert_eq!(gov.admit().await, Duration::from_secs(2));

        source.set(Err(ApiError::transient("connection reset")));
        assert_eq!(gov.admit().await, Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_admit_without_any_snapshot_proceeds() {
        let source = FixedQuota::new(Err(ApiError::transient("down")));
        let gov = governor(source, Arc::new(NoopLock));
        assert_eq!(gov.admit().await, Duration::ZERO);
        assert!(gov.last_snapshot().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exclusive_lock_serializes_waiting_workers() {
        let source = FixedQuota::new(Ok(snapshot(5000, 0, 3_000)));
        let gov = Arc::new(governor(source, Arc::new(ExclusiveLock::default())));

        let start = tokio::time::Instant::now();
        let a = tokio::spawn({
            let gov = Arc::clone(&gov);
            async move { gov.admit().await }
        });
        let b = tokio::spawn({
            let gov = Arc::clone(&gov);
            async move { gov.admit().await }
        });
        a.await.unwrap();
        b.await.unwrap();

        // Each worker observed the exhausted quota only after the other left.
        assert_eq!(start.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_noop_lock_lets_workers_wait_together() {
        let source = FixedQuota::new(Ok(snapshot(5000, 0, 3_000)));
        let gov = Arc::new(governor(source, Arc::new(NoopLock)));

        let start = tokio::time::Instant::now();
        let (a, b) = tokio::join!(gov.admit(), gov.admit());
        assert_eq!(a, Duration::from_secs(3));
        assert_eq!(b, Duration::from_secs(3));
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    // ─── Quota exceeded ──────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_reset_uses_refreshed_reset_time() {
        let source = FixedQuota::new(Ok(snapshot(5000, 0, 9_000)));
        let gov = governor(source, Arc::new(NoopLock));

        let waited = gov
            .wait_for_reset(Some(t0() + chrono::Duration::seconds(4)))
            .await;
        assert_eq!(waited, Duration::from_secs(9));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_reset_uses_hint_when_quota_looks_available() {
        let source = FixedQuota::new(Ok(snapshot(5000, 100, 9_000)));
        let gov = governor(source, Arc::new(NoopLock));

        let waited = gov
            .wait_for_reset(Some(t0() + chrono::Duration::seconds(4)))
            .await;
        assert_eq!(waited, Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_reset_never_returns_zero() {
        let source = FixedQuota::new(Ok(snapshot(5000, 0, -1_000)));
        let gov = governor(source, Arc::new(NoopLock));

        assert_eq!(gov.wait_for_reset(None).await, Duration::from_secs(1));
    }

    #[test]
    fn test_zero_requests_per_second_disables_pacer() {
        let source = FixedQuota::new(Ok(snapshot(5000, 5000, 0)));
        let gov = RateGovernor::new(
            source,
            Arc::new(ManualClock::new(t0())),
            Arc::new(NoopLock),
            GovernorConfig {
                requests_per_second: Some(0),
                ..GovernorConfig::default()
            },
        );
        assert!(gov.pacer.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacer_spaces_calls_evenly() {
        let source = FixedQuota::new(Ok(snapshot(5000, 5000, 60_000)));
        let gov = RateGovernor::new(
            source,
            Arc::new(ManualClock::new(t0())),
            Arc::new(NoopLock),
            GovernorConfig {
                requests_per_second: Some(4),
                ..GovernorConfig::default()
            },
        );

        let start = tokio::time::Instant::now();
        for _ in 0..5 {
            assert_eq!(gov.admit().await, Duration::ZERO);
        }
        let elapsed = start.elapsed();

        // Five calls at four per second: four gaps of 250ms.
        assert!(elapsed >= Duration::from_millis(1000), "{:?}", elapsed);
        assert!(elapsed < Duration::from_millis(1050), "{:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacer_first_call_is_immediate() {
        let source = FixedQuota::new(Ok(snapshot(5000, 5000, 60_000)));
        let gov = RateGovernor::new(
            source,
            Arc::new(ManualClock::new(t0())),
            Arc::new(NoopLock),
            GovernorConfig {
                requests_per_second: Some(2),
                ..GovernorConfig::default()
            },
        );

        let start = tokio::time::Instant::now();
        gov.admit().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
