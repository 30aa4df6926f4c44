//! Classification of octocrab failures.

use crate::access::{ApiError, short_error_message};

/// Check whether a GitHub error message describes a rate limit rejection.
///
/// GitHub answers both primary and secondary rate limits with a 403 whose
/// message mentions the rate limit, so the status alone is ambiguous.
pub fn is_rate_limit_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("rate limit")
}

/// Map an octocrab error for `resource` onto the sync's error taxonomy.
pub fn classify_octocrab_error(err: octocrab::Error, resource: &str) -> ApiError {
    match &err {
        octocrab::Error::GitHub { source, .. } => {
            let message = match source.documentation_url.as_deref() {
                Some(url) if url.contains("rate-limit") => format!("{} (rate limit)", source.message),
                _ => source.message.clone(),
            };
            classify_status(source.status_code.as_u16(), &message, resource)
        }
        octocrab::Error::Http { .. }
        | octocrab::Error::Hyper { .. }
        | octocrab::Error::Service { .. } => {
            ApiError::transient(format!("{}: {}", resource, short_error_message(&err)))
        }
        _ => ApiError::api(format!("{}: {}", resource, short_error_message(&err))),
    }
}

fn classify_status(status: u16, message: &str, resource: &str) -> ApiError {
    match status {
        404 => ApiError::not_found(resource),
        401 => ApiError::auth(message),
        429 => ApiError::QuotaExceeded { reset_at: None },
        403 if is_rate_limit_message(message) => ApiError::QuotaExceeded { reset_at: None },
        403 => ApiError::auth(message),
        500..=599 => ApiError::transient(format!("{} returned {}: {}", resource, status, message)),
        _ => ApiError::api(format!("{} returned {}: {}", resource, status, message)),
    }
}
