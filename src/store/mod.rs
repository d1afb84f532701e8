//! SQLite persistence for Writers Jam.
//!
//! A single database file holds posts, comments, editions, admin accounts,
//! signup codes, the moderation log and the full-text index. Every query is
//! parameterized; the only interpolated SQL fragments are whitelisted sort
//! columns and directions.
//!
//! The store is synchronous. The API layer owns it behind a
//! `tokio::sync::Mutex`, which also serializes writers the way SQLite wants,
//! and only touches it from blocking tasks.

mod admin;
mod comments;
mod editions;
mod feeds;
mod posts;
mod schema;

use std::path::Path;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::hashid::TokenError;

pub use admin::{AdminUser, ModerationAction, ModerationEntry, ModerationPage};
pub use comments::Comment;
pub use editions::{Edition, NO_EDITION};
pub use posts::{
    NewPost, Post, PostPage, PostQuery, PostSummary, PostUpdate, SortField, SortOrder, PAGE_SIZE,
};

/// Errors that can occur in store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid post token: {0}")]
    InvalidToken(#[from] TokenError),

    #[error("Post not found: {0}")]
    PostNotFound(String),

    #[error("Comment not found: {0}")]
    CommentNotFound(String),

    #[error("Edition not found: {0}")]
    EditionNotFound(i64),

    #[error("Admin already exists: {0}")]
    AdminExists(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Structured tags stored as JSON on each post.
///
/// Only the edition is interpreted; unknown keys are preserved across
/// updates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostTags {
    #[serde(default)]
    pub edition: EditionTag,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Edition reference inside [`PostTags`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditionTag {
    pub value: i64,
}

impl PostTags {
    /// Tags for a post in the given edition.
    pub fn for_edition(edition: i64) -> Self {
        Self {
            edition: EditionTag { value: edition },
            extra: serde_json::Map::new(),
        }
    }

    /// Parse the stored column, treating missing or corrupt JSON as empty.
    pub(crate) fn parse(raw: Option<&str>) -> Self {
        raw.and_then(|s| serde_json::from_str(s).ok()).unwrap_or_default()
    }
}

/// Current time in Unix epoch milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// The Writers Jam database.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (creating if needed) the database file at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self::from_connection(conn)?;

        info!(path = %path.display(), "Opened database");

        Ok(store)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        schema::init(&conn)?;
        Ok(Self { conn })
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }
}
