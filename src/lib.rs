//! Writers Jam - anonymous short fiction and poetry.
//!
//! Writers submit pieces without an account, optionally protected by an
//! edit code. Readers browse, search and comment. Themed editions group
//! submissions, and a small team of admins moderates through a JWT-guarded
//! API with an append-only audit trail.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          API (axum)                          │
//! │  public routes · edit sessions · admin guard · rate limits   │
//! └───────────────┬───────────────────────────────┬──────────────┘
//!                 │                               │
//! ┌───────────────┴──────────────┐  ┌─────────────┴──────────────┐
//! │  feed                        │  │  auth                      │
//! │  home page pools + TTL cache │  │  argon2 + HS256 tokens     │
//! └───────────────┬──────────────┘  └────────────────────────────┘
//!                 │
//! ┌───────────────┴──────────────────────────────────────────────┐
//! │                      store (SQLite)                          │
//! │  posts · comments · editions · admins · moderation log · FTS │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Posts are addressed publicly by 8-character tokens (see [`hashid`]),
//! never by their row ids.

// === Core Modules ===

/// Post token encoding.
pub mod hashid;

/// SQLite persistence.
pub mod store;

/// Home page feed composition.
pub mod feed;

/// Admin authentication and password hashing.
pub mod auth;

/// Post edit sessions.
pub mod sessions;

/// Server configuration.
pub mod config;

/// JSON HTTP API.
pub mod api;

// === Re-exports ===

pub use config::AppConfig;
pub use store::{Store, StoreError};
