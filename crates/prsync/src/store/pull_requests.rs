//! Pull request rows.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

use crate::access::PullRequestDetail;
use crate::entity::pull_request::{ActiveModel, Column, Entity as PullRequest, Model};

use super::errors::{Result, StoreError};
use super::to_db_int;

fn active_model(
    repository_id: Uuid,
    detail: &PullRequestDetail,
    author_id: Option<Uuid>,
    now: DateTime<Utc>,
) -> ActiveModel {
    let summary = &detail.summary;
    ActiveModel {
        id: Set(Uuid::new_v4()),
        external_id: Set(summary.external_id),
        repository_id: Set(repository_id),
        number: Set(to_db_int(summary.number)),
        title: Set(summary.title.clone()),
        state: Set(summary.state.clone()),
        author_id: Set(author_id),
        additions: Set(to_db_int(detail.additions)),
        deletions: Set(to_db_int(detail.deletions)),
        changed_files: Set(to_db_int(detail.changed_files)),
        commits: Set(to_db_int(detail.commits)),
        merged: Set(detail.merged),
        created_at: Set(summary.created_at.fixed_offset()),
        closed_at: Set(detail.closed_at.map(|t| t.fixed_offset())),
        merged_at: Set(detail.merged_at.map(|t| t.fixed_offset())),
        updated_at: Set(summary.updated_at.fixed_offset()),
        last_synced_at: Set(Some(now.fixed_offset())),
    }
}

pub(crate) fn build_upsert_on_conflict() -> OnConflict {
    OnConflict::column(Column::ExternalId)
        .update_columns([
            Column::RepositoryId,
            Column::Number,
            Column::Title,
            Column::State,
            Column::AuthorId,
            Column::Additions,
            Column::Deletions,
            Column::ChangedFiles,
            Column::Commits,
            Column::Merged,
            Column::CreatedAt,
            Column::ClosedAt,
            Column::MergedAt,
            Column::UpdatedAt,
            Column::LastSyncedAt,
        ])
        .to_owned()
}

/// Insert or refresh a pull request by its remote ID.
///
/// Stores the remote `updated_at` and stamps `last_synced_at = now`; callers
/// run this inside the transaction that also writes the reviews.
pub async fn upsert<C>(
    db: &C,
    repository_id: Uuid,
    detail: &PullRequestDetail,
    author_id: Option<Uuid>,
    now: DateTime<Utc>,
) -> Result<Model>
where
    C: ConnectionTrait,
{
    let external_id = detail.summary.external_id;
    PullRequest::insert(active_model(repository_id, detail, author_id, now))
        .on_conflict(build_upsert_on_conflict())
        .exec_without_returning(db)
        .await?;

    find_by_external_id(db, external_id)
        .await?
        .ok_or_else(|| StoreError::not_found_by_external_id("pull_request", external_id))
}

/// Find a pull request by its remote ID.
pub async fn find_by_external_id<C>(db: &C, external_id: i64) -> Result<Option<Model>>
where
    C: ConnectionTrait,
{
    Ok(PullRequest::find()
        .filter(Column::ExternalId.eq(external_id))
        .one(db)
        .await?)
}

/// All pull requests of a repository, by number.
pub async fn find_by_repository<C>(db: &C, repository_id: Uuid) -> Result<Vec<Model>>
where
    C: ConnectionTrait,
{
    Ok(PullRequest::find()
        .filter(Column::RepositoryId.eq(repository_id))
        .order_by_asc(Column::Number)
        .all(db)
        .await?)
}

/// Count all pull requests.
pub async fn count<C>(db: &C) -> Result<u64>
where
    C: ConnectionTrait,
{
    Ok(PullRequest::find().count(db).await?)
}
