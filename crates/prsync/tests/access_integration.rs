//! Integration tests for the access layer against a scripted remote.

#![cfg(all(feature = "sqlite", feature = "migrate"))]

mod common;

use chrono::Duration;
use common::{Harness, at, pull, repo, user};
use prsync::access::{ApiError, RepoRef, keys};

#[tokio::test]
async fn test_repeated_reads_hit_the_cache() {
    let h = Harness::new().await;
    h.remote.add_repo(repo(1, "acme", "widgets", at(1, 8)));
    h.remote.add_pull("acme/widgets", pull(10, 4, at(1, 7), None));
    h.remote.add_user(user(2, "bob"));
    let access = h.access(false);
    let widgets = RepoRef::new("acme", "widgets");

    for _ in 0..3 {
        assert!(access.pull_request(&widgets, 4).await.unwrap().is_some());
        assert!(access.user("Bob").await.unwrap().is_some());
        assert_eq!(access.org_repositories("acme", None).await.unwrap().unwrap().len(), 1);
    }

    assert_eq!(h.remote.calls_to("pull:").len(), 1);
    assert_eq!(h.remote.calls_to("user:").len(), 1);
    assert_eq!(h.remote.calls_to("repos:").len(), 1);
    assert!(access.cache().get(&keys::user("bob")).is_some());
}

#[tokio::test]
async fn test_pull_request_listings_are_never_cached() {
    let h = Harness::new().await;
    h.remote.add_repo(repo(1, "acme", "widgets", at(1, 8)));
    let access = h.access(false);
    let widgets = RepoRef::new("acme", "widgets");

    access.pull_requests(&widgets, None).await.unwrap();
    access.pull_requests(&widgets, None).await.unwrap();

    assert_eq!(h.remote.calls_to("pulls:").len(), 2);
}

#[tokio::test]
async fn test_expired_entries_are_refetched() {
    let h = Harness::new().await;
    h.remote.add_user(user(2, "bob"));
    let access = h.access(false);

    access.user("bob").await.unwrap();
    h.clock.advance(Duration::minutes(9));
    access.user("bob").await.unwrap();
    assert_eq!(h.remote.calls_to("user:").len(), 1);

    h.clock.advance(Duration::minutes(1));
    access.user("bob").await.unwrap();
    assert_eq!(h.remote.calls_to("user:").len(), 2);
}

#[tokio::test]
async fn test_not_found_is_an_empty_result() {
    let h = Harness::new().await;
    let access = h.access(false);

    assert!(access.user("nobody").await.unwrap().is_none());
    assert!(access.org_repositories("ghost", None).await.unwrap().is_none());
    // Misses are not cached.
    assert!(access.user("nobody").await.unwrap().is_none());
    assert_eq!(h.remote.calls_to("user:nobody").len(), 2);
}

#[tokio::test]
async fn test_auth_failure_is_not_retried() {
    let h = Harness::new().await;
    h.remote
        .fail_always("repos:acme", ApiError::auth("Bad credentials"));
    let access = h.access(false);

    let err = access.org_repositories("acme", None).await.unwrap_err();

    assert!(err.is_auth());
    assert_eq!(h.remote.calls_to("repos:").len(), 1);
}

#[tokio::test]
async fn test_exhausted_retries_surface_as_fatal() {
    let h = Harness::new().await;
    h.remote
        .fail_always("repos:acme", ApiError::transient("connection reset"));
    let access = h.access(true);

    let err = access.org_repositories("acme", None).await.unwrap_err();

    assert!(matches!(err, ApiError::RetriesExhausted { attempts: 4, .. }));
    assert_eq!(h.remote.calls_to("repos:").len(), 4);
}

#[tokio::test]
async fn test_admission_lock_follows_concurrency_mode() {
    let h = Harness::new().await;

    assert!(!h.access(false).executor().governor().is_exclusive());
    assert!(h.access(true).executor().governor().is_exclusive());
}

#[tokio::test]
async fn test_sequential_access_serves_spawned_readers() {
    let h = Harness::new().await;
    h.remote.add_user(user(2, "bob"));
    let access = h.access(false);

    let reader = tokio::spawn({
        let access = std::sync::Arc::clone(&access);
        async move { access.user("bob").await }
    });
    assert!(reader.await.unwrap().unwrap().is_some());
    assert!(access.user("bob").await.unwrap().is_some());

    assert_eq!(h.remote.calls_to("user:").len(), 1);
}
