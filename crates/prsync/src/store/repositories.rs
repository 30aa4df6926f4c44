//! Repository rows and the per-repository and per-organization cursors.

use chrono::{DateTime, Utc};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::{Expr, Func, OnConflict};
use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

use crate::access::RepositorySummary;
use crate::entity::repository::{ActiveModel, Column, Entity as Repository, Model};

use super::errors::{Result, StoreError};

// ─── Writes ──────────────────────────────────────────────────────────────────

fn active_model(repo: &RepositorySummary) -> ActiveModel {
    ActiveModel {
        id: Set(Uuid::new_v4()),
        external_id: Set(repo.external_id),
        organization: Set(repo.organization.clone()),
        name: Set(repo.name.clone()),
        full_name: Set(repo.full_name()),
        description: Set(repo.description.clone()),
        default_branch: Set(repo.default_branch.clone()),
        is_private: Set(repo.is_private),
        is_archived: Set(repo.is_archived),
        ..Default::default()
    }
}

/// ON CONFLICT clause for repository upserts.
///
/// The cursor columns are left alone: they only move through [`mark_synced`],
/// [`touch_organization`] and [`rewind_organization`].
pub(crate) fn build_upsert_on_conflict() -> OnConflict {
    OnConflict::column(Column::ExternalId)
        .update_columns([
            Column::Organization,
            Column::Name,
            Column::FullName,
            Column::Description,
            Column::DefaultBranch,
            Column::IsPrivate,
            Column::IsArchived,
        ])
        .to_owned()
}

/// Insert or refresh a repository by its remote ID.
pub async fn upsert<C>(db: &C, repo: &RepositorySummary) -> Result<Model>
where
    C: ConnectionTrait,
{
    Repository::insert(active_model(repo))
        .on_conflict(build_upsert_on_conflict())
        .exec_without_returning(db)
        .await?;

    find_by_external_id(db, repo.external_id)
        .await?
        .ok_or_else(|| StoreError::not_found_by_external_id("repository", repo.external_id))
}

/// Record a complete sync of repository `id`.
///
/// Writes the remote `updated_at` observed for this run together with the
/// time the run finished the repository.
pub async fn mark_synced<C>(
    db: &C,
    id: Uuid,
    remote_updated_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<()>
where
    C: ConnectionTrait,
{
    let result = Repository::update_many()
        .col_expr(Column::UpdatedAt, Expr::value(remote_updated_at.fixed_offset()))
        .col_expr(Column::LastSyncedAt, Expr::value(now.fixed_offset()))
        .filter(Column::Id.eq(id))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        return Err(StoreError::not_found_by_id("repository", id));
    }
    Ok(())
}

/// Advance the cursor of every cursored repository of `org` to `now`,
/// except the repositories whose remote IDs are listed in `exclude`.
///
/// Returns the number of repositories touched.
pub async fn touch_organization<C>(
    db: &C,
    org: &str,
    now: DateTime<Utc>,
    exclude: &[i64],
) -> Result<u64>
where
    C: ConnectionTrait,
{
    let mut query = Repository::update_many()
        .col_expr(Column::LastSyncedAt, Expr::value(now.fixed_offset()))
        .filter(organization_matches(org))
        .filter(Column::LastSyncedAt.is_not_null());
    if !exclude.is_empty() {
        query = query.filter(Column::ExternalId.is_not_in(exclude.iter().copied()));
    }

    let result = query.exec(db).await?;
    Ok(result.rows_affected)
}

/// Move the cursor of `org` back to `cursor`, its value before this run.
///
/// Repository cursors newer than `cursor` are set to it. With no previous
/// cursor every repository cursor of the org is cleared, so the next listing
/// is unfiltered. Used when a repository of the run left no row behind and so
/// cannot hold the derived cursor back on its own.
pub async fn rewind_organization<C>(
    db: &C,
    org: &str,
    cursor: Option<DateTime<Utc>>,
) -> Result<u64>
where
    C: ConnectionTrait,
{
    let query = match cursor {
        Some(cursor) => Repository::update_many()
            .col_expr(Column::LastSyncedAt, Expr::value(cursor.fixed_offset()))
            .filter(organization_matches(org))
            .filter(Column::LastSyncedAt.gt(cursor.fixed_offset())),
        None => Repository::update_many()
            .col_expr(Column::LastSyncedAt, Expr::value(None::<DateTimeWithTimeZone>))
            .filter(organization_matches(org))
            .filter(Column::LastSyncedAt.is_not_null()),
    };

    let result = query.exec(db).await?;
    Ok(result.rows_affected)
}

// ─── Queries ─────────────────────────────────────────────────────────────────

/// Organization logins compare case-insensitively, as they do remotely.
fn organization_matches(org: &str) -> Condition {
    Condition::all().add(
        Expr::expr(Func::lower(Expr::col(Column::Organization))).eq(org.to_lowercase()),
    )
}

/// Find a repository by its remote ID.
pub async fn find_by_external_id<C>(db: &C, external_id: i64) -> Result<Option<Model>>
where
    C: ConnectionTrait,
{
    Ok(Repository::find()
        .filter(Column::ExternalId.eq(external_id))
        .one(db)
        .await?)
}

/// All known repositories of `org`, ordered by name.
pub async fn find_by_organization<C>(db: &C, org: &str) -> Result<Vec<Model>>
where
    C: ConnectionTrait,
{
    Ok(Repository::find()
        .filter(organization_matches(org))
        .order_by_asc(Column::Name)
        .all(db)
        .await?)
}

/// The cutoff for listing repositories of `org`.
///
/// `None` when the organization has no repositories yet or any of them has
/// never completed a sync; otherwise the oldest repository cursor.
pub async fn organization_cursor<C>(db: &C, org: &str) -> Result<Option<DateTime<Utc>>>
where
    C: ConnectionTrait,
{
    let cursors: Vec<Option<DateTimeWithTimeZone>> = Repository::find()
        .select_only()
        .column(Column::LastSyncedAt)
        .filter(organization_matches(org))
        .into_tuple()
        .all(db)
        .await?;

    Ok(derive_cursor(cursors))
}

fn derive_cursor<I, T>(cursors: I) -> Option<DateTime<Utc>>
where
    I: IntoIterator<Item = Option<DateTime<T>>>,
    T: chrono::TimeZone,
{
    let mut oldest: Option<DateTime<Utc>> = None;
    for cursor in cursors {
        let cursor = cursor?.with_timezone(&Utc);
        oldest = Some(oldest.map_or(cursor, |current| current.min(cursor)));
    }
    oldest
}

/// Count all repositories.
pub async fn count<C>(db: &C) -> Result<u64>
where
    C: ConnectionTrait,
{
    Ok(Repository::find().count(db).await?)
}


#[cfg(all(test, feature = "sqlite", feature = "migrate"))]
mod db_tests {
    use chrono::TimeZone;
    use sea_orm::DatabaseConnection;

    use crate::connect_and_migrate;

    use super::*;

    async fn setup_db() -> DatabaseConnection {
        connect_and_migrate("sqlite::memory:")
            .await
            .expect("test db should migrate")
    }

    fn summary(id: i64, name: &str) -> RepositorySummary {
        RepositorySummary {
            external_id: id,
            organization: "acme".to_string(),
            name: name.to_string(),
            description: None,
            default_branch: "main".to_string(),
            is_private: false,
            is_archived: false,
            updated_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_upsert_keeps_row_id_and_cursor() {
        let db = setup_db().await;
        let t1 = Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap();

        let first = upsert(&db, &summary(10, "widgets")).await.unwrap();
        assert!(first.last_synced_at.is_none());
        assert!(first.updated_at.is_none());

        mark_synced(&db, first.id, t1, t1).await.unwrap();

        let mut renamed = summary(10, "gadgets");
        renamed.description = Some("Renamed".to_string());
        let second = upsert(&db, &renamed).await.unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.name, "gadgets");
        assert_eq!(second.full_name, "acme/gadgets");
        assert_eq!(second.last_synced_at.map(|t| t.with_timezone(&Utc)), Some(t1));
        assert_eq!(count(&db).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_mark_synced_unknown_id_is_not_found() {
        let db = setup_db().await;
        let err = mark_synced(&db, Uuid::new_v4(), Utc::now(), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_organization_cursor_and_touch() {
        let db = setup_db().await;
        let t1 = Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2026, 1, 3, 0, 0, 0).unwrap();
        let t3 = Utc.with_ymd_and_hms(2026, 1, 4, 0, 0, 0).unwrap();

        assert_eq!(organization_cursor(&db, "acme").await.unwrap(), None);

        let a = upsert(&db, &summary(1, "a")).await.unwrap();
        let b = upsert(&db, &summary(2, "b")).await.unwrap();
        mark_synced(&db, a.id, t1, t1).await.unwrap();
        assert_eq!(organization_cursor(&db, "acme").await.unwrap(), None);

        mark_synced(&db, b.id, t2, t2).await.unwrap();
        assert_eq!(organization_cursor(&db, "ACME").await.unwrap(), Some(t1));

        let touched = touch_organization(&db, "acme", t3, &[a.external_id]).await.unwrap();
        assert_eq!(touched, 1);
        assert_eq!(organization_cursor(&db, "acme").await.unwrap(), Some(t1));

        touch_organization(&db, "acme", t3, &[]).await.unwrap();
        assert_eq!(organization_cursor(&db, "acme").await.unwrap(), Some(t3));
    }

    #[tokio::test]
    async fn test_touch_skips_uncursored_repositories() {
        let db = setup_db().await;
        let now = Utc.with_ymd_and_hms(2026, 1, 4, 0, 0, 0).unwrap();
        upsert(&db, &summary(1, "a")).await.unwrap();

        assert_eq!(touch_organization(&db, "acme", now, &[]).await.unwrap(), 0);
        let rows = find_by_organization(&db, "acme").await.unwrap();
        assert!(rows[0].last_synced_at.is_none());
    }

    #[tokio::test]
    async fn test_rewind_restores_previous_cursor() {
        let db = setup_db().await;
        let t1 = Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2026, 1, 3, 0, 0, 0).unwrap();

        let a = upsert(&db, &summary(1, "a")).await.unwrap();
        let b = upsert(&db, &summary(2, "b")).await.unwrap();
        mark_synced(&db, a.id, t1, t1).await.unwrap();
        mark_synced(&db, b.id, t1, t1).await.unwrap();
        touch_organization(&db, "acme", t2, &[]).await.unwrap();
        assert_eq!(organization_cursor(&db, "acme").await.unwrap(), Some(t2));

        let rewound = rewind_organization(&db, "Acme", Some(t1)).await.unwrap();
        assert_eq!(rewound, 2);
        assert_eq!(organization_cursor(&db, "acme").await.unwrap(), Some(t1));

        assert_eq!(rewind_organization(&db, "acme", Some(t1)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rewind_without_previous_cursor_clears() {
        let db = setup_db().await;
        let t1 = Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap();
        let a = upsert(&db, &summary(1, "a")).await.unwrap();
        mark_synced(&db, a.id, t1, t1).await.unwrap();

        rewind_organization(&db, "acme", None).await.unwrap();

        assert_eq!(organization_cursor(&db, "acme").await.unwrap(), None);
        let rows = find_by_organization(&db, "acme").await.unwrap();
        assert!(rows[0].last_synced_at.is_none());
        assert!(rows[0].updated_at.is_some());
    }
}
