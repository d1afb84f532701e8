//! JSON HTTP API for Writers Jam.
//!
//! Provides endpoints for:
//! - Home feeds and site statistics
//! - Post submission, listing, search and viewing
//! - Comments
//! - Author self-service editing with edit codes
//! - Editions
//! - Admin moderation behind a JWT guard

pub mod error;
pub mod handlers;
pub mod limit;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue},
    middleware::{self, Next},
    response::Response,
    routing::{delete, get, patch, post},
    Router,
};
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::auth::{self, JwtKeys};
use crate::config::AppConfig;
use crate::feed::FeedCache;
use crate::sessions::EditSessions;
use crate::store::Store;

use self::error::ApiError;
use self::limit::{rate_limit, Limits};

/// How often idle rate limiter entries are dropped.
const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// Shared state for API handlers.
pub struct ApiState {
    /// The database. SQLite wants a single writer, so all access is serialized.
    pub store: Arc<Mutex<Store>>,

    pub config: AppConfig,

    /// Admin token keys.
    pub jwt: JwtKeys,

    /// Open post edit sessions.
    pub sessions: EditSessions,

    /// Cached home feeds.
    pub feed_cache: FeedCache,

    /// Per-route rate limiters.
    pub limits: Limits,

    /// When the server started.
    pub started: Instant,
}

impl ApiState {
    /// Create API state around an opened store.
    pub fn new(store: Store, config: AppConfig) -> Result<Self, auth::AuthError> {
        Ok(Self {
            store: Arc::new(Mutex::new(store)),
            jwt: JwtKeys::new(&config.secrets)?,
            sessions: EditSessions::default(),
            feed_cache: FeedCache::new(config.feed_cache_ttl()),
            limits: Limits::default(),
            started: Instant::now(),
            config,
        })
    }

    /// Run a database job on the blocking pool.
    ///
    /// SQLite calls are synchronous and some (search, random pools) scan
    /// the post table, so they never run on a runtime worker.
    pub async fn db<T, F>(&self, job: F) -> Result<T, ApiError>
    where
        F: FnOnce(&Store) -> Result<T, ApiError> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);

        tokio::task::spawn_blocking(move || {
            let guard = store.blocking_lock();
            job(&*guard)
        })
        .await
        .map_err(|e| ApiError::Internal(format!("Task join error: {}", e)))?
    }
}

/// Run CPU-heavy work (argon2) on the blocking pool.
pub async fn blocking<T, F>(job: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| ApiError::Internal(format!("Task join error: {}", e)))?
}

/// Reject requests without a valid admin token and expose the claims to
/// the handler.
pub async fn require_admin(
    State(state): State<Arc<ApiState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let claims = {
        let header = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        state.jwt.verify(auth::bearer_token(header)?)?
    };

    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}

fn cors(config: &AppConfig) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    match config
        .cors_origin
        .as_deref()
        .and_then(|origin| HeaderValue::from_str(origin).ok())
    {
        Some(origin) => cors.allow_origin(origin),
        None => cors.allow_origin(Any),
    }
}

/// Build the API router with all routes.
pub fn router(state: Arc<ApiState>) -> Router {
    use handlers::{admin, comments, editions, home, posts, status};

    let limits = &state.limits;

    let public = Router::new()
        .route("/api/v1/status", get(status::health))
        .route("/api/v1/home", get(home::home))
        .route("/api/v1/posts", get(posts::list_posts))
        .route(
            "/api/v1/post",
            post(posts::create_post)
                .route_layer(middleware::from_fn_with_state(limits.create_post.clone(), rate_limit)),
        )
        // Note: /random must come before /:id
        .route("/api/v1/post/random", get(posts::random_post))
        .route("/api/v1/post/:id", get(posts::get_post))
        .route("/api/v1/post/:id/comments", get(comments::list_comments))
        .route(
            "/api/v1/post/:id/comment",
            post(comments::create_comment)
                .route_layer(middleware::from_fn_with_state(limits.comment.clone(), rate_limit)),
        )
        .route(
            "/api/v1/post/:id/manage",
            post(posts::manage_post)
                .route_layer(middleware::from_fn_with_state(limits.manage.clone(), rate_limit)),
        )
        .route("/api/v1/post/:id/update", post(posts::update_post))
        .route("/api/v1/editions", get(editions::list_editions))
        .route("/api/v1/editions/:id", get(editions::get_edition))
        .route(
            "/api/v1/admin/signup",
            post(admin::signup)
                .route_layer(middleware::from_fn_with_state(limits.signup.clone(), rate_limit)),
        )
        .route(
            "/api/v1/admin/signin",
            post(admin::signin)
                .route_layer(middleware::from_fn_with_state(limits.signin.clone(), rate_limit)),
        );

    let guarded = Router::new()
        .route("/api/v1/admin/whoami", get(admin::whoami))
        .route("/api/v1/admin/codes", post(admin::create_signup_code))
        .route("/api/v1/admin/posts/:id", delete(admin::delete_post))
        .route("/api/v1/admin/posts/:id/nsfw", patch(admin::set_nsfw))
        .route(
            "/api/v1/admin/posts/:id/reset-edit-code",
            post(admin::reset_edit_code),
        )
        .route(
            "/api/v1/admin/comments/:id",
            get(admin::get_comment).delete(admin::delete_comment),
        )
        .route("/api/v1/admin/editions", post(admin::create_edition))
        .route("/api/v1/admin/editions/:id", delete(admin::delete_edition))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    // Rate limited before the token is even looked at.
    let moderation_log = Router::new()
        .route("/api/v1/admin/moderation-log", get(admin::moderation_log))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin))
        .route_layer(middleware::from_fn_with_state(
            limits.moderation_log.clone(),
            rate_limit,
        ));

    public
        .merge(guarded)
        .merge(moderation_log)
        // Middleware
        .layer(cors(&state.config))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "request",
                        method = %request.method(),
                        uri = %request.uri(),
                    )
                })
                // Only log responses that are not a success
                .on_request(())
                .on_response(
                    |response: &axum::http::Response<_>, latency: Duration, _span: &tracing::Span| {
                        let status = response.status();
                        if !status.is_success() && !status.is_redirection() {
                            warn!(
                                status = %status,
                                latency_ms = latency.as_millis(),
                                "request failed"
                            );
                        }
                    },
                ),
        )
        .with_state(state)
}

/// Resolve when the process is asked to stop.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Start the API server and run until shutdown.
pub async fn serve(state: Arc<ApiState>) -> anyhow::Result<()> {
    let bind_addr = state.config.bind_addr();

    let pruner = {
        let state = state.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(PRUNE_INTERVAL);
            loop {
                interval.tick().await;
                state.limits.prune();
            }
        })
    };

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("Writers Jam API listening on {}", bind_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    pruner.abort();
    info!("Server stopped");

    Ok(())
}

#[cfg(test)]
mod tests;
