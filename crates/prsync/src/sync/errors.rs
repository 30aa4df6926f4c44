use thiserror::Error;

use crate::access::ApiError;
use crate::store::StoreError;

/// Errors raised while walking the sync cascade.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Remote access failed after the access layer gave up.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Persistence failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A review arrived without an author.
    #[error("Review {review_id} has no author")]
    MissingAuthor { review_id: i64 },

    /// A worker task panicked or was cancelled.
    #[error("Worker failed: {message}")]
    Worker { message: String },

    /// Missing required field in builder.
    #[error("Missing required field: {field}")]
    MissingField { field: &'static str },
}

impl SyncError {
    /// Whether this error ends the whole run rather than one branch.
    pub fn is_global(&self) -> bool {
        matches!(self, Self::Api(err) if err.is_auth())
    }
}

impl From<sea_orm::DbErr> for SyncError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Store(StoreError::from(err))
    }
}

impl From<tokio::task::JoinError> for SyncError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Worker {
            message: err.to_string(),
        }
    }
}

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
