//! Comments on posts.

use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;
use tracing::debug;
use ulid::Ulid;

use super::{now_ms, Result, Store, StoreError};
use crate::hashid;

/// Author shown for comments left without a name.
pub const ANONYMOUS: &str = "Anonymous";

/// A comment.
#[derive(Debug, Clone, Serialize)]
pub struct Comment {
    /// ULID.
    pub id: String,

    /// Token of the post this comment belongs to.
    #[serde(rename = "for")]
    pub post: String,

    pub content: String,

    pub author: String,

    /// Epoch milliseconds.
    pub posted: i64,
}

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<Comment> {
    let post_id: i64 = row.get(4)?;
    let post = u64::try_from(post_id)
        .ok()
        .and_then(|id| hashid::encode(id).ok())
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(4, post_id))?;

    Ok(Comment {
        id: row.get(0)?,
        content: row.get(1)?,
        author: row
            .get::<_, Option<String>>(2)?
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| ANONYMOUS.to_string()),
        posted: row.get(3)?,
        post,
    })
}

impl Store {
    /// Add a comment to a live post.
    pub fn create_comment(
        &self,
        post_token: &str,
        content: &str,
        author: Option<&str>,
    ) -> Result<Comment> {
        let post_id = hashid::decode(post_token)? as i64;

        let exists: bool = self.conn().query_row(
            "SELECT EXISTS(SELECT 1 FROM post WHERE id = ?1 AND deleted = 0)",
            [post_id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(StoreError::PostNotFound(post_token.to_string()));
        }

        let comment = Comment {
            id: Ulid::new().to_string(),
            post: post_token.to_string(),
            content: content.to_string(),
            author: author
                .filter(|a| !a.is_empty())
                .unwrap_or(ANONYMOUS)
                .to_string(),
            posted: now_ms(),
        };

        self.conn().execute(
            r#"INSERT INTO comment (id, "for", content, author, posted)
               VALUES (?1, ?2, ?3, ?4, ?5)"#,
            params![comment.id, post_id, comment.content, author, comment.posted],
        )?;

        debug!(comment = %comment.id, post = %post_token, "Created comment");

        Ok(comment)
    }

    /// Comments on a post, newest first.
    pub fn comments_for_post(&self, post_token: &str) -> Result<Vec<Comment>> {
        let post_id = hashid::decode(post_token)? as i64;

        let mut stmt = self.conn().prepare_cached(
            r#"SELECT id, content, author, posted, "for"
               FROM comment
               WHERE "for" = ?1
               ORDER BY posted DESC, id DESC"#,
        )?;
        let comments = stmt
            .query_map([post_id], comment_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(comments)
    }

    /// Get a comment by its ULID.
    pub fn comment(&self, id: &str) -> Result<Option<Comment>> {
        Ok(self
            .conn()
            .query_row(
                r#"SELECT id, content, author, posted, "for" FROM comment WHERE id = ?1"#,
                [id],
                comment_from_row,
            )
            .optional()?)
    }

    /// Permanently remove a comment.
    pub fn delete_comment(&self, id: &str) -> Result<()> {
        let changed = self
            .conn()
            .execute("DELETE FROM comment WHERE id = ?1", [id])?;

        if changed == 0 {
            return Err(StoreError::CommentNotFound(id.to_string()));
        }
        Ok(())
    }
}
