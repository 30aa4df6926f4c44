//! The incremental-skip rule and listing cutoffs.

use chrono::{DateTime, Utc};

use super::types::SyncMode;

/// Whether a pull request can be passed over without fetching its detail.
///
/// True only in incremental mode, for a record that exists, completed a sync
/// before, and whose remote "updated" timestamp is not newer than the one
/// stored. Equal timestamps count as already complete: the stored timestamp
/// is only ever written in the same transaction as the reviews.
pub fn should_skip(
    mode: SyncMode,
    stored_last_synced_at: Option<DateTime<Utc>>,
    stored_updated_at: Option<DateTime<Utc>>,
    remote_updated_at: DateTime<Utc>,
) -> bool {
    if mode.is_full() || stored_last_synced_at.is_none() {
        return false;
    }
    stored_updated_at.is_some_and(|stored| remote_updated_at <= stored)
}

/// The "updated since" cutoff to pass to a listing, given the stored cursor.
pub fn cutoff(mode: SyncMode, stored_cursor: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match mode {
        SyncMode::Incremental => stored_cursor,
        SyncMode::Full => None,
    }
}
