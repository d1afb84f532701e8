//! API request handlers.

pub mod admin;
pub mod comments;
pub mod editions;
pub mod home;
pub mod posts;
pub mod status;

use crate::api::error::ApiError;
use crate::hashid;

/// Normalize a post token from a path, rejecting malformed ones.
pub(crate) fn canonical_token(token: &str) -> Result<String, ApiError> {
    hashid::decode(token)
        .and_then(hashid::encode)
        .map_err(|_| ApiError::InvalidLink)
}

/// Check an optional free-text field against a character limit.
pub(crate) fn check_len(field: &str, value: Option<&str>, max: usize) -> Result<(), ApiError> {
    match value {
        Some(v) if v.chars().count() > max => Err(ApiError::Validation(format!(
            "{field} must be at most {max} characters"
        ))),
        _ => Ok(()),
    }
}

/// Trim a field, treating blank as absent.
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
