use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors returned by the remote API and the retrying executor.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// Resource does not exist (org, repo, pull request, user).
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// Credentials missing, invalid, or lacking permission.
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    /// Request quota exhausted until `reset_at`.
    #[error("Rate limit exceeded{}", reset_suffix(.reset_at))]
    QuotaExceeded { reset_at: Option<DateTime<Utc>> },

    /// Connection failure, timeout, or 5xx response.
    #[error("Transient failure: {message}")]
    Transient { message: String },

    /// Any other API failure.
    #[error("API error: {message}")]
    Api { message: String },

    /// A transient failure persisted through every retry.
    #[error("Gave up after {attempts} attempts: {message}")]
    RetriesExhausted { attempts: u32, message: String },
}

fn reset_suffix(reset_at: &Option<DateTime<Utc>>) -> String {
    match reset_at {
        Some(at) => format!(". Resets at {}", at),
        None => String::new(),
    }
}

/// Coarse classification that drives retry and propagation decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Benign; the caller receives an empty result.
    NotFound,
    /// Fatal for the whole run.
    AuthFailure,
    /// Retried with backoff up to the retry budget.
    TransientFailure,
    /// Handled by waiting for the quota reset.
    QuotaExceeded,
    /// Fatal for the enclosing scope.
    Fatal,
}

impl ApiError {
    /// Create a not found error.
    #[inline]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Create an authentication error.
    #[inline]
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Create a transient error.
    #[inline]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    /// Create a generic API error.
    #[inline]
    pub fn api(message: impl Into<String>) -> Self {
        Self::Api {
            message: message.into(),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Auth { .. } => ErrorKind::AuthFailure,
            Self::QuotaExceeded { .. } => ErrorKind::QuotaExceeded,
            Self::Transient { .. } => ErrorKind::TransientFailure,
            Self::Api { .. } | Self::RetriesExhausted { .. } => ErrorKind::Fatal,
        }
    }

    /// Check if this error must abort the entire run.
    #[inline]
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }
}

/// Extract a short error message suitable for logs.
///
/// Keeps only the first line, dropping multi-line bodies and backtraces.
#[inline]
pub fn short_error_message(e: &impl std::error::Error) -> String {
    let full = e.to_string();
    full.lines().next().unwrap_or(&full).to_string()
}

/// Result type for remote API operations.
pub type Result<T> = std::result::Result<T, ApiError>;
