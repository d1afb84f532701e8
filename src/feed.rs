//! Home page feeds.
//!
//! The home page shows four small feeds drawn from four candidate pools:
//! the current edition, posts that were "slept on" (few views or few
//! comments), the latest posts and the most viewed posts. Pools are
//! fetched in that order and every pick is excluded from the later pools,
//! so no post appears twice on the page.
//!
//! Composition is cheap but random, so the result is cached for a few
//! minutes to keep the page stable between reloads.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::store::{self, PostSummary, NO_EDITION};

/// Posts shown per feed.
pub const FEED_SIZE: usize = 5;

/// Candidates fetched for the current edition feed.
pub const EDITION_POOL: u32 = 10;

/// Candidates fetched per slept-on attempt.
pub const SLEPT_ON_POOL: u32 = 15;

/// Candidates fetched for the latest and most viewed feeds.
pub const RANKED_POOL: u32 = 20;

/// `(max views, max comments)` pairs tried in order until one yields a
/// full feed of slept-on candidates.
pub const SLEPT_ON_THRESHOLDS: [(i64, i64); 4] = [(20, 3), (50, 5), (100, 10), (200, 20)];

/// Where feed candidates come from.
///
/// Every pool excludes deleted posts.
pub trait FeedSource {
    /// Random posts tagged with `edition`.
    fn edition_pool(&self, edition: i64, limit: u32) -> store::Result<Vec<PostSummary>>;

    /// Random posts with at most `max_views` views or at most
    /// `max_comments` comments.
    fn slept_on_pool(
        &self,
        max_views: i64,
        max_comments: i64,
        limit: u32,
    ) -> store::Result<Vec<PostSummary>>;

    /// Most recently updated posts.
    fn latest_pool(&self, limit: u32) -> store::Result<Vec<PostSummary>>;

    /// Most viewed posts.
    fn most_viewed_pool(&self, limit: u32) -> store::Result<Vec<PostSummary>>;
}

/// The composed home page feeds.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HomeFeeds {
    pub current_edition: i64,
    pub edition: Vec<PostSummary>,
    pub slept_on: Vec<PostSummary>,
    pub latest: Vec<PostSummary>,
    pub most_viewed: Vec<PostSummary>,
}

fn sample<R: Rng + ?Sized>(pool: &[PostSummary], rng: &mut R) -> Vec<PostSummary> {
    pool.choose_multiple(rng, FEED_SIZE).cloned().collect()
}

fn without(pool: Vec<PostSummary>, taken: &HashSet<i64>) -> Vec<PostSummary> {
    pool.into_iter()
        .filter(|p| !taken.contains(&p.row_id))
        .collect()
}

/// Compose the four feeds for `current_edition`.
///
/// With no edition running the edition feed is empty.
pub fn compose<S, R>(source: &S, current_edition: i64, rng: &mut R) -> store::Result<HomeFeeds>
where
    S: FeedSource + ?Sized,
    R: Rng + ?Sized,
{
    let edition_pool = if current_edition == NO_EDITION {
        Vec::new()
    } else {
        source.edition_pool(current_edition, EDITION_POOL)?
    };
    // The whole pool is excluded, not only the posts shown.
    let mut taken: HashSet<i64> = edition_pool.iter().map(|p| p.row_id).collect();
    let edition = sample(&edition_pool, rng);

    let mut slept_on_pool = Vec::new();
    for (views, comments) in SLEPT_ON_THRESHOLDS {
        slept_on_pool = without(source.slept_on_pool(views, comments, SLEPT_ON_POOL)?, &taken);
        if slept_on_pool.len() >= FEED_SIZE {
            break;
        }
        debug!(views, comments, found = slept_on_pool.len(), "Widening slept-on thresholds");
    }
    let slept_on = sample(&slept_on_pool, rng);
    taken.extend(slept_on.iter().map(|p| p.row_id));

    let latest = sample(&without(source.latest_pool(RANKED_POOL)?, &taken), rng);
    taken.extend(latest.iter().map(|p| p.row_id));

    let most_viewed = sample(&without(source.most_viewed_pool(RANKED_POOL)?, &taken), rng);

    Ok(HomeFeeds {
        current_edition,
        edition,
        slept_on,
        latest,
        most_viewed,
    })
}

/// Caches the last composed [`HomeFeeds`] for a fixed time.
pub struct FeedCache {
    ttl: Duration,
    cached: Mutex<Option<(Instant, Arc<HomeFeeds>)>>,
}

impl FeedCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            cached: Mutex::new(None),
        }
    }

    /// Return the cached feeds, composing fresh ones with `refresh` once
    /// the cache is empty or older than the TTL.
    pub async fn get_or_refresh<F, Fut, E>(&self, refresh: F) -> Result<Arc<HomeFeeds>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<HomeFeeds, E>>,
    {
        let mut cached = self.cached.lock().await;

        if let Some((at, feeds)) = cached.as_ref() {
            if at.elapsed() < self.ttl {
                return Ok(feeds.clone());
            }
        }

        let feeds = Arc::new(refresh().await?);
        *cached = Some((Instant::now(), feeds.clone()));
        debug!("Refreshed home feeds");

        Ok(feeds)
    }

    /// Drop the cached feeds, e.g. after a post was removed.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }
}
