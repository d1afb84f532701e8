//! Per-client rate limiting.
//!
//! Each limited route gets its own [`RouteLimiter`]. Clients are keyed by
//! IP address and request path, where the IP comes from the first
//! `X-Forwarded-For` entry when the server sits behind a proxy.

use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    clock::{Clock, DefaultClock},
    DefaultKeyedRateLimiter, Quota, RateLimiter,
};
use tracing::debug;

use super::error::ApiError;

/// Keyed limiter for one route.
pub struct RouteLimiter {
    name: &'static str,
    limiter: DefaultKeyedRateLimiter<String>,
    clock: DefaultClock,
}

impl RouteLimiter {
    /// Allow `max` requests per `window` for each client.
    pub fn new(name: &'static str, max: u32, window: Duration) -> Self {
        let burst = NonZeroU32::new(max).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::with_period(window / burst.get())
            .unwrap_or_else(|| Quota::per_second(burst))
            .allow_burst(burst);

        Self {
            name,
            limiter: RateLimiter::keyed(quota),
            clock: DefaultClock::default(),
        }
    }

    /// Record a request. On refusal, returns the whole seconds to wait.
    pub fn check(&self, key: &str) -> Result<(), u64> {
        self.limiter.check_key(&key.to_string()).map_err(|not_until| {
            let wait = not_until.wait_time_from(self.clock.now());
            wait.as_secs() + u64::from(wait.subsec_nanos() > 0)
        })
    }

    /// Forget clients whose quota has fully replenished.
    pub fn prune(&self) {
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
    }

    pub fn tracked(&self) -> usize {
        self.limiter.len()
    }
}

/// The limiters used by the router.
pub struct Limits {
    pub create_post: Arc<RouteLimiter>,
    pub comment: Arc<RouteLimiter>,
    pub manage: Arc<RouteLimiter>,
    pub signup: Arc<RouteLimiter>,
    pub signin: Arc<RouteLimiter>,
    pub moderation_log: Arc<RouteLimiter>,
}

impl Default for Limits {
    fn default() -> Self {
        let limiter = |name, max, secs| Arc::new(RouteLimiter::new(name, max, Duration::from_secs(secs)));

        Self {
            create_post: limiter("create_post", 1, 15),
            comment: limiter("comment", 1, 15),
            manage: limiter("manage", 5, 60),
            signup: limiter("signup", 1, 15),
            signin: limiter("signin", 1, 5),
            moderation_log: limiter("moderation_log", 10, 5),
        }
    }
}

impl Limits {
    pub fn all(&self) -> [&Arc<RouteLimiter>; 6] {
        [
            &self.create_post,
            &self.comment,
            &self.manage,
            &self.signup,
            &self.signin,
            &self.moderation_log,
        ]
    }

    /// Prune every limiter.
    pub fn prune(&self) {
        for limiter in self.all() {
            limiter.prune();
        }
    }
}

/// Client address for rate limiting.
fn client_ip(request: &Request) -> String {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

/// Middleware refusing requests over the route's quota.
pub async fn rate_limit(
    State(limiter): State<Arc<RouteLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let key = format!("{} {}", client_ip(&request), request.uri().path());

    match limiter.check(&key) {
        Ok(()) => next.run(request).await,
        Err(retry_after) => {
            debug!(route = limiter.name, key = %key, retry_after, "Rate limited");
            ApiError::RateLimited { retry_after }.into_response()
        }
    }
}
