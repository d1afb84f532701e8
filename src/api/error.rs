//! JSON response envelope and API errors.
//!
//! Every response body is either `{"success":true,"data":...}` or
//! `{"success":false,"error":{"code","title","name","details"}}`.

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::auth::AuthError;
use crate::store::StoreError;

/// Successful response body.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: T,
}

/// Wrap `data` in a success envelope.
pub fn ok<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        success: true,
        data,
    })
}

/// Handler result.
pub type ApiResult<T> = Result<Json<Envelope<T>>, ApiError>;

/// Error details as sent to clients.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub title: &'static str,
    pub name: &'static str,
    pub details: String,
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    success: bool,
    error: ErrorBody,
}

/// API errors.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid post link")]
    InvalidLink,

    #[error("Post not found")]
    PostNotFound,

    #[error("No posts yet")]
    NoPosts,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Incorrect edit code")]
    IncorrectPassword,

    #[error("Post has no edit code")]
    NoEditCode,

    #[error("Edit session expired")]
    SessionExpired,

    #[error("Rate limited, retry in {retry_after}s")]
    RateLimited { retry_after: u64 },

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Username taken")]
    UserExists,

    #[error("Invalid signup code")]
    InvalidCode,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_)
            | ApiError::InvalidLink
            | ApiError::NoEditCode
            | ApiError::SessionExpired
            | ApiError::InvalidCode => StatusCode::BAD_REQUEST,
            ApiError::PostNotFound | ApiError::NoPosts | ApiError::NotFound(_) => {
                StatusCode::NOT_FOUND
            }
            ApiError::IncorrectPassword => StatusCode::UNAUTHORIZED,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::UserExists => StatusCode::CONFLICT,
            ApiError::Auth(e) => match e {
                AuthError::MissingToken | AuthError::InvalidToken | AuthError::InvalidCredentials => {
                    StatusCode::UNAUTHORIZED
                }
                AuthError::Validation(_) => StatusCode::BAD_REQUEST,
                AuthError::NoSecrets | AuthError::Hash(_) | AuthError::Jwt(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> ErrorBody {
        let (code, title, name, details) = match self {
            ApiError::Validation(details) => {
                ("ValidationError", "Invalid Input", "Validation error", details.clone())
            }
            ApiError::InvalidLink => (
                "BadRequest",
                "Invalid link",
                "Bad request",
                "It looks like this post link is incomplete or broken. Please check the URL and try again.".to_string(),
            ),
            ApiError::PostNotFound => (
                "NotFound",
                "Post not found",
                "Not found",
                "The post with the given ID was not found. It may have been deleted or you may have followed a broken link.".to_string(),
            ),
            ApiError::NoPosts => (
                "NotFound",
                "No posts yet",
                "Not found",
                "No posts are available yet. Be the first to create one!".to_string(),
            ),
            ApiError::NotFound(what) => (
                "NotFound",
                "Not found",
                "Not found",
                format!("{what} not found."),
            ),
            ApiError::IncorrectPassword => (
                "BadRequest",
                "Incorrect password",
                "Authentication failed",
                "The password you entered is incorrect. Please double-check and try again.".to_string(),
            ),
            ApiError::NoEditCode => (
                "BadRequest",
                "Not editable",
                "Bad request",
                "This post was created without an edit code and cannot be edited.".to_string(),
            ),
            ApiError::SessionExpired => (
                "BadRequest",
                "Editing session expired",
                "Session error",
                "Your editing session has expired or is invalid. Please try editing again.".to_string(),
            ),
            ApiError::RateLimited { .. } => (
                "Ratelimited",
                "Please Slow Down",
                "Too Many Requests",
                "You're making requests too quickly. Please wait a moment before trying again.".to_string(),
            ),
            ApiError::Auth(AuthError::MissingToken) => (
                "MissingToken",
                "Authentication Required",
                "No token provided",
                "Authentication token is required to access this resource.".to_string(),
            ),
            ApiError::Auth(AuthError::InvalidToken) => (
                "InvalidToken",
                "Invalid Token",
                "Authentication failed",
                "The provided token is invalid or has expired. Please sign in again.".to_string(),
            ),
            ApiError::Auth(AuthError::InvalidCredentials) => (
                "InvalidCredentials",
                "Invalid Credentials",
                "Authentication failed",
                "Invalid username or password.".to_string(),
            ),
            ApiError::Auth(AuthError::Validation(details)) => {
                ("ValidationError", "Invalid Input", "Validation error", details.clone())
            }
            ApiError::UserExists => (
                "UserExists",
                "Username Taken",
                "User already exists",
                "An admin with this username already exists. Please choose a different username.".to_string(),
            ),
            ApiError::InvalidCode => (
                "InvalidCode",
                "Invalid Signup Code",
                "Invalid code",
                "The signup code you provided is invalid or has expired.".to_string(),
            ),
            ApiError::Auth(_) | ApiError::Internal(_) => (
                "InternalError",
                "Something went wrong",
                "Error",
                "An unexpected error occurred.".to_string(),
            ),
        };

        ErrorBody {
            code,
            title,
            name,
            details,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }

        let mut response = (
            status,
            Json(ErrorEnvelope {
                success: false,
                error: self.body(),
            }),
        )
            .into_response();

        if let ApiError::RateLimited { retry_after } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
        }

        response
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::InvalidToken(_) => ApiError::InvalidLink,
            StoreError::PostNotFound(_) => ApiError::PostNotFound,
            StoreError::CommentNotFound(_) => ApiError::NotFound("Comment"),
            StoreError::EditionNotFound(_) => ApiError::NotFound("Edition"),
            StoreError::AdminExists(_) => ApiError::UserExists,
            StoreError::InvalidState(msg) => ApiError::Validation(msg),
            e @ (StoreError::Sqlite(_) | StoreError::Json(_)) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_error_envelope() {
        let response = ApiError::PostNotFound.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["code"], "NotFound");
        assert_eq!(json["error"]["title"], "Post not found");
    }

    #[tokio::test]
    async fn test_rate_limited_sets_retry_after() {
        let response = ApiError::RateLimited { retry_after: 12 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "12");
        assert_eq!(body_json(response).await["error"]["code"], "Ratelimited");
    }

    #[test]
    fn test_store_error_mapping() {
        let invalid = crate::hashid::decode("xyz").unwrap_err();
        assert!(matches!(
            ApiError::from(StoreError::InvalidToken(invalid)),
            ApiError::InvalidLink
        ));
        assert_eq!(
            ApiError::from(StoreError::AdminExists("a".into())).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(AuthError::MissingToken).status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn test_internal_errors_hide_details() {
        let response = ApiError::Internal("disk on fire".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert_eq!(json["error"]["details"], "An unexpected error occurred.");
    }
}
