//! Persistence gateway: idempotent writes and cursor bookkeeping.
//!
//! Every function is generic over [`sea_orm::ConnectionTrait`] so that it runs
//! unchanged against a pooled connection or inside an open transaction.
//! Writes are `INSERT … ON CONFLICT(external_id) DO UPDATE` followed by a
//! re-read, which keeps them deterministic when workers race on a row.

mod errors;
pub mod pull_requests;
pub mod repositories;
pub mod reviews;
pub mod users;

pub use errors::{Result, StoreError};

/// Narrow an unsigned remote counter into a signed database column.
pub(crate) fn to_db_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
