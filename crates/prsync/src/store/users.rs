//! User rows, shared by pull request and review authors.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, Set};
use uuid::Uuid;

use crate::access::UserSummary;
use crate::entity::user::{ActiveModel, Column, Entity as User, Model};

use super::errors::Result;

fn active_model(user: &UserSummary, now: DateTime<Utc>) -> ActiveModel {
    ActiveModel {
        id: Set(Uuid::new_v4()),
        external_id: Set(user.external_id),
        login: Set(user.login.clone()),
        name: Set(user.name.clone()),
        kind: Set(user.kind.clone()),
        synced_at: Set(now.fixed_offset()),
    }
}

/// ON CONFLICT clause for user upserts.
///
/// A summary without a display name never erases one learned earlier from a
/// full profile lookup.
pub(crate) fn build_upsert_on_conflict() -> OnConflict {
    OnConflict::column(Column::ExternalId)
        .update_columns([Column::Login, Column::Kind, Column::SyncedAt])
        .value(
            Column::Name,
            Expr::cust("COALESCE(\"excluded\".\"name\", \"users\".\"name\")"),
        )
        .to_owned()
}

/// Upsert users in a single statement and map remote IDs to row IDs.
///
/// Duplicate remote IDs in `users` collapse to the last occurrence.
pub async fn upsert_many<C>(
    db: &C,
    users: &[UserSummary],
    now: DateTime<Utc>,
) -> Result<HashMap<i64, Uuid>>
where
    C: ConnectionTrait,
{
    let unique: BTreeMap<i64, &UserSummary> =
        users.iter().map(|user| (user.external_id, user)).collect();
    if unique.is_empty() {
        return Ok(HashMap::new());
    }

    let models: Vec<ActiveModel> = unique
        .values()
        .map(|user| active_model(user, now))
        .collect();
    User::insert_many(models)
        .on_conflict(build_upsert_on_conflict())
        .exec_without_returning(db)
        .await?;

    let rows = User::find()
        .filter(Column::ExternalId.is_in(unique.keys().copied()))
        .all(db)
        .await?;
    Ok(rows.into_iter().map(|row| (row.external_id, row.id)).collect())
}

/// Find a user by its remote ID.
pub async fn find_by_external_id<C>(db: &C, external_id: i64) -> Result<Option<Model>>
where
    C: ConnectionTrait,
{
    Ok(User::find()
        .filter(Column::ExternalId.eq(external_id))
        .one(db)
        .await?)
}

/// Count all users.
pub async fn count<C>(db: &C) -> Result<u64>
where
    C: ConnectionTrait,
{
    Ok(User::find().count(db).await?)
}
