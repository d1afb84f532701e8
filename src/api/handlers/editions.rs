//! Edition handlers.

use std::sync::Arc;

use axum::extract::{
    rejection::{PathRejection, QueryRejection},
    Path, Query, State,
};
use serde::Serialize;

use super::posts::ListParams;
use crate::api::error::{ok, ApiError, ApiResult};
use crate::api::ApiState;
use crate::store::{Edition, PostPage, PostQuery};

/// An edition and a page of its posts.
#[derive(Debug, Serialize)]
pub struct EditionResponse {
    pub edition: Edition,

    #[serde(flatten)]
    pub posts: PostPage,
}

/// Editions that have not been deleted.
pub async fn list_editions(State(state): State<Arc<ApiState>>) -> ApiResult<Vec<Edition>> {
    let editions = state.db(|store| Ok(store.list_editions(false)?)).await?;
    Ok(ok(editions))
}

/// One edition and its posts. Accepts the same query as the post listing.
pub async fn get_edition(
    State(state): State<Arc<ApiState>>,
    id: Result<Path<i64>, PathRejection>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> ApiResult<EditionResponse> {
    let Path(id) = id?;
    let Query(params) = params?;

    let response = state
        .db(move |store| {
            let edition = store
                .edition(id)?
                .filter(|e| !e.deleted)
                .ok_or(ApiError::NotFound("Edition"))?;

            let query = PostQuery {
                edition: Some(edition.id),
                ..PostQuery::from(params)
            };
            let posts = store.list_posts(&query)?;

            Ok(EditionResponse { edition, posts })
        })
        .await?;

    Ok(ok(response))
}
