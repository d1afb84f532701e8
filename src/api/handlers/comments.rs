//! Comment handlers.

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    Json,
};
use serde::Deserialize;
use tracing::debug;

use super::{canonical_token, check_len, non_blank};
use crate::api::error::{ok, ApiError, ApiResult};
use crate::api::ApiState;
use crate::store::Comment;

/// Maximum comment length in characters.
pub const MAX_COMMENT_LEN: usize = 5_000;

/// Add comment request.
#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    pub content: String,

    #[serde(alias = "nickname")]
    pub author: Option<String>,
}

/// Comments on a post, newest first.
pub async fn list_comments(
    State(state): State<Arc<ApiState>>,
    id: Result<Path<String>, PathRejection>,
) -> ApiResult<Vec<Comment>> {
    let Path(id) = id?;
    let token = canonical_token(&id)?;

    let comments = state
        .db(move |store| {
            if store.post_by_token(&token)?.is_none() {
                return Err(ApiError::PostNotFound);
            }
            Ok(store.comments_for_post(&token)?)
        })
        .await?;

    Ok(ok(comments))
}

/// Comment on a post.
pub async fn create_comment(
    State(state): State<Arc<ApiState>>,
    id: Result<Path<String>, PathRejection>,
    body: Result<Json<CreateCommentRequest>, JsonRejection>,
) -> ApiResult<Comment> {
    let Path(id) = id?;
    let Json(request) = body?;
    let token = canonical_token(&id)?;

    let content = request.content.trim().to_string();
    if content.is_empty() {
        return Err(ApiError::Validation("comment must not be empty".to_string()));
    }
    check_len("comment", Some(&content), MAX_COMMENT_LEN)?;

    let author = non_blank(request.author);
    check_len("author", author.as_deref(), super::posts::MAX_FIELD_LEN)?;

    let post = token.clone();
    let comment = state
        .db(move |store| Ok(store.create_comment(&post, &content, author.as_deref())?))
        .await?;

    debug!(post = %token, comment = %comment.id, "Comment added");

    Ok(ok(comment))
}
