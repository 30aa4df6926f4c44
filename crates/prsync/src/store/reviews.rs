//! Review rows.

use std::collections::BTreeMap;

use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

use crate::access::ReviewSummary;
use crate::entity::review::{ActiveModel, Column, Entity as Review, Model};

use super::errors::Result;

/// A review ready to be written, with its author already resolved to a row.
#[derive(Debug, Clone)]
pub struct ReviewRecord<'a> {
    pub review: &'a ReviewSummary,
    pub author_id: Uuid,
}

fn active_model(pull_request_id: Uuid, record: &ReviewRecord<'_>) -> ActiveModel {
    ActiveModel {
        id: Set(Uuid::new_v4()),
        external_id: Set(record.review.external_id),
        pull_request_id: Set(pull_request_id),
        author_id: Set(record.author_id),
        state: Set(record.review.state.clone()),
        body: Set(record.review.body.clone()),
        submitted_at: Set(record.review.submitted_at.map(|t| t.fixed_offset())),
    }
}

pub(crate) fn build_upsert_on_conflict() -> OnConflict {
    OnConflict::column(Column::ExternalId)
        .update_columns([
            Column::PullRequestId,
            Column::AuthorId,
            Column::State,
            Column::Body,
            Column::SubmittedAt,
        ])
        .to_owned()
}

/// Upsert the reviews of one pull request in a single statement.
///
/// Returns the number of distinct reviews written.
pub async fn upsert_many<C>(
    db: &C,
    pull_request_id: Uuid,
    records: &[ReviewRecord<'_>],
) -> Result<u64>
where
    C: ConnectionTrait,
{
    let unique: BTreeMap<i64, &ReviewRecord<'_>> = records
        .iter()
        .map(|record| (record.review.external_id, record))
        .collect();
    if unique.is_empty() {
        return Ok(0);
    }

    let written = unique.len() as u64;
    let models: Vec<ActiveModel> = unique
        .values()
        .map(|record| active_model(pull_request_id, record))
        .collect();
    Review::insert_many(models)
        .on_conflict(build_upsert_on_conflict())
        .exec_without_returning(db)
        .await?;

    Ok(written)
}

/// All reviews of a pull request, oldest first.
pub async fn find_by_pull_request<C>(db: &C, pull_request_id: Uuid) -> Result<Vec<Model>>
where
    C: ConnectionTrait,
{
    Ok(Review::find()
        .filter(Column::PullRequestId.eq(pull_request_id))
        .order_by_asc(Column::SubmittedAt)
        .order_by_asc(Column::ExternalId)
        .all(db)
        .await?)
}

/// Count all reviews.
pub async fn count<C>(db: &C) -> Result<u64>
where
    C: ConnectionTrait,
{
    Ok(Review::find().count(db).await?)
}
