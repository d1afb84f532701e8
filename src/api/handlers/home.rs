//! Home page handler.

use std::sync::Arc;

use axum::extract::State;
use rand::{rngs::StdRng, SeedableRng};
use serde::Serialize;

use crate::api::error::{ok, ApiResult};
use crate::api::ApiState;
use crate::feed::HomeFeeds;
use crate::store::{Edition, NO_EDITION};

/// Site-wide counters.
#[derive(Debug, Serialize)]
pub struct Stats {
    /// Live posts.
    pub posts: i64,

    /// Views over every post ever made.
    pub views: i64,
}

/// Home page data.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HomeResponse {
    #[serde(flatten)]
    pub feeds: HomeFeeds,

    /// The running edition, if any.
    pub edition_info: Option<Edition>,

    pub stats: Stats,
}

/// Feeds, stats and the current edition.
pub async fn home(State(state): State<Arc<ApiState>>) -> ApiResult<HomeResponse> {
    let feeds = state
        .feed_cache
        .get_or_refresh(|| {
            state.db(|store| {
                let mut rng = StdRng::from_entropy();
                Ok(store.home_feeds(&mut rng)?)
            })
        })
        .await?;

    let current_edition = feeds.current_edition;
    let (edition_info, stats) = state
        .db(move |store| {
            let edition_info = match current_edition {
                NO_EDITION => None,
                id => store.edition(id)?,
            };
            let stats = Stats {
                posts: store.post_count()?,
                views: store.view_count()?,
            };
            Ok((edition_info, stats))
        })
        .await?;

    Ok(ok(HomeResponse {
        feeds: (*feeds).clone(),
        edition_info,
        stats,
    }))
}
