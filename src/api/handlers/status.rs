//! Status and health check handlers.

use std::sync::Arc;

use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::api::error::{ok, ApiResult};
use crate::api::ApiState;

/// Health response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,

    /// Crate version.
    pub version: String,

    /// Seconds since the server started.
    pub uptime_secs: u64,

    /// Number of live posts.
    pub posts: i64,

    /// Id of the current edition.
    pub current_edition: i64,

    /// Number of open edit sessions.
    pub edit_sessions: usize,
}

/// Health check endpoint.
pub async fn health(State(state): State<Arc<ApiState>>) -> ApiResult<HealthResponse> {
    let (posts, current_edition) = state
        .db(|store| Ok((store.post_count()?, store.current_edition()?)))
        .await?;

    Ok(ok(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.started.elapsed().as_secs(),
        posts,
        current_edition,
        edit_sessions: state.sessions.active().await,
    }))
}
