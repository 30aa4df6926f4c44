use sea_orm::DbErr;
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during persistence operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from sea-orm.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    /// A row expected to exist was not found.
    #[error("Record not found: {context}")]
    NotFound { context: String },

    /// Invalid input data.
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },
}

impl StoreError {
    /// Create a NotFound error for a UUID lookup.
    pub fn not_found_by_id(table: &str, id: Uuid) -> Self {
        Self::NotFound {
            context: format!("{} id={}", table, id),
        }
    }

    /// Create a NotFound error for a remote ID lookup.
    pub fn not_found_by_external_id(table: &str, external_id: i64) -> Self {
        Self::NotFound {
            context: format!("{} external_id={}", table, external_id),
        }
    }
}

/// Result type alias for persistence operations.
pub type Result<T> = std::result::Result<T, StoreError>;
