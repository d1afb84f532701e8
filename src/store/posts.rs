//! Post storage, listing and search.

use std::sync::LazyLock;

use regex::Regex;
use rusqlite::{params, params_from_iter, types::Value, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{now_ms, PostTags, Result, Store, StoreError};
use crate::hashid;

/// Posts per listing page.
pub const PAGE_SIZE: u32 = 10;

pub(super) const SUMMARY_COLUMNS: &str =
    "p.id, p.title, p.nsfw, p.password, p.triggers, p.author, p.updated, p.views, p.tags";

/// Edition of a post as SQL, tolerating legacy rows with no or corrupt tags.
pub(super) const EDITION_EXPR: &str =
    "IFNULL(CASE WHEN json_valid(p.tags) THEN json_extract(p.tags, '$.edition.value') END, 0)";

static LINK_OR_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(?:https://)?writersjam\.shantaram\.xyz/post/)?([0-9a-fA-F]{8})$")
        .expect("valid link regex")
});

static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\w+").expect("valid word regex"));

/// A post as shown in listings (no body).
#[derive(Debug, Clone, Serialize)]
pub struct PostSummary {
    /// SQLite row id. Never leaves the server.
    #[serde(skip)]
    pub row_id: i64,

    /// Public post token.
    pub id: String,

    pub title: Option<String>,

    pub nsfw: bool,

    /// Whether the author set an edit code.
    pub has_edit_code: bool,

    /// Trigger warnings.
    pub triggers: String,

    pub author: Option<String>,

    /// Last update, epoch milliseconds.
    pub updated: i64,

    pub views: i64,

    pub tags: PostTags,
}

impl PostSummary {
    pub fn edition(&self) -> i64 {
        self.tags.edition.value
    }
}

/// A full post.
#[derive(Debug, Clone, Serialize)]
pub struct Post {
    #[serde(flatten)]
    pub summary: PostSummary,

    pub content: String,

    pub reports: i64,
}

pub(super) fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<PostSummary> {
    let row_id: i64 = row.get(0)?;
    let id = u64::try_from(row_id)
        .ok()
        .and_then(|id| hashid::encode(id).ok())
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(0, row_id))?;
    let password: Option<String> = row.get(3)?;
    let tags: Option<String> = row.get(8)?;

    Ok(PostSummary {
        row_id,
        id,
        title: row.get(1)?,
        nsfw: row.get(2)?,
        has_edit_code: password.is_some_and(|p| !p.is_empty()),
        triggers: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        author: row.get(5)?,
        updated: row.get(6)?,
        views: row.get(7)?,
        tags: PostTags::parse(tags.as_deref()),
    })
}

/// A post to be created.
#[derive(Debug, Clone, Default)]
pub struct NewPost {
    pub content: String,
    pub title: Option<String>,
    pub author: Option<String>,
    pub triggers: String,
    pub nsfw: bool,
    /// Argon2 hash of the edit code, if one was chosen.
    pub password_hash: Option<String>,
    pub edition: i64,
}

/// Editable fields of a post.
#[derive(Debug, Clone, Default)]
pub struct PostUpdate {
    pub title: Option<String>,
    pub content: String,
    pub triggers: String,
    pub nsfw: bool,
    pub edition: i64,
}

/// Sort column for listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortField {
    #[default]
    Updated,
    Views,
}

impl SortField {
    fn column(self) -> &'static str {
        match self {
            SortField::Updated => "updated",
            SortField::Views => "views",
        }
    }
}

/// Sort direction for listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    fn keyword(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Listing parameters.
#[derive(Debug, Clone)]
pub struct PostQuery {
    /// 1-based page number.
    pub page: u32,
    pub sort: SortField,
    pub order: SortOrder,
    pub include_nsfw: bool,
    pub search: Option<String>,
    pub edition: Option<i64>,
}

impl Default for PostQuery {
    fn default() -> Self {
        Self {
            page: 1,
            sort: SortField::default(),
            order: SortOrder::default(),
            include_nsfw: false,
            search: None,
            edition: None,
        }
    }
}

/// One page of a listing.
#[derive(Debug, Clone, Serialize)]
pub struct PostPage {
    pub posts: Vec<PostSummary>,
    pub page: u32,
    pub total_pages: u32,
}

/// Extract a post token from a search box that holds a bare token or a post link.
fn token_in_search(search: &str) -> Option<&str> {
    LINK_OR_TOKEN
        .captures(search)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Reduce free text to an FTS5 query of lowercase barewords (implicit AND).
fn fts_query(search: &str) -> Option<String> {
    let words: Vec<String> = WORD
        .find_iter(search)
        .map(|m| m.as_str().to_lowercase())
        .collect();

    if words.is_empty() {
        None
    } else {
        Some(words.join(" "))
    }
}

fn decode_token(token: &str) -> Result<i64> {
    // decode() only yields values below MODULUS, which fit in i64.
    Ok(hashid::decode(token)? as i64)
}

impl Store {
    /// Create a post and return its token.
    pub fn create_post(&self, post: &NewPost) -> Result<String> {
        let tags = serde_json::to_string(&PostTags::for_edition(post.edition))?;

        let row_id: i64 = self.conn().query_row(
            "INSERT INTO post (content, nsfw, password, triggers, title, author, updated, tags)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             RETURNING id",
            params![
                post.content,
                post.nsfw,
                post.password_hash.as_deref().unwrap_or(""),
                post.triggers,
                post.title,
                post.author,
                now_ms(),
                tags,
            ],
            |row| row.get(0),
        )?;

        let token = hashid::encode(row_id as u64)?;
        debug!(post = %token, edition = post.edition, "Created post");

        Ok(token)
    }

    /// Get a live (not deleted) post by token.
    pub fn post_by_token(&self, token: &str) -> Result<Option<Post>> {
        let row_id = decode_token(token)?;

        let post = self
            .conn()
            .prepare_cached(&format!(
                "SELECT {SUMMARY_COLUMNS}, p.content, p.reports
                 FROM post p
                 WHERE p.deleted = 0 AND p.id = ?1"
            ))?
            .query_row([row_id], |row| {
                Ok(Post {
                    summary: summary_from_row(row)?,
                    content: row.get(9)?,
                    reports: row.get(10)?,
                })
            })
            .optional()?;

        Ok(post)
    }

    /// Count a view.
    pub fn add_view(&self, token: &str) -> Result<()> {
        let row_id = decode_token(token)?;
        self.conn().execute(
            "UPDATE post SET views = views + 1 WHERE id = ?1 AND deleted = 0",
            [row_id],
        )?;
        Ok(())
    }

    /// List posts, newest first by default.
    ///
    /// A search that is a bare post token or a post link returns just that
    /// post when it exists. Any other search text goes through the
    /// full-text index.
    pub fn list_posts(&self, query: &PostQuery) -> Result<PostPage> {
        let page = query.page.max(1);
        let search = query.search.as_deref().map(str::trim).unwrap_or("");

        if let Some(token) = token_in_search(search) {
            if let Ok(Some(post)) = self.post_by_token(token) {
                return Ok(PostPage {
                    posts: vec![post.summary],
                    page: 1,
                    total_pages: 1,
                });
            }
        }

        let mut conditions = vec!["p.deleted = 0".to_string()];
        let mut values: Vec<Value> = Vec::new();

        if !query.include_nsfw {
            conditions.push("p.nsfw = 0".to_string());
        }

        if let Some(edition) = query.edition {
            conditions.push(format!("{EDITION_EXPR} = ?"));
            values.push(Value::Integer(edition));
        }

        if let Some(fts) = fts_query(search) {
            conditions.push("p.id IN (SELECT rowid FROM post_fts WHERE post_fts MATCH ?)".to_string());
            values.push(Value::Text(fts));
        }

        let where_clause = conditions.join(" AND ");

        let count: i64 = self.conn().query_row(
            &format!("SELECT COUNT(p.id) FROM post p WHERE {where_clause}"),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;
        let total_pages = (count.max(0) as u64).div_ceil(PAGE_SIZE as u64) as u32;

        let sql = format!(
            "SELECT {SUMMARY_COLUMNS}
             FROM post p
             WHERE {where_clause}
             ORDER BY p.{column} {order}, p.id {order}
             LIMIT ? OFFSET ?",
            column = query.sort.column(),
            order = query.order.keyword(),
        );
        values.push(Value::Integer(PAGE_SIZE as i64));
        values.push(Value::Integer((page as i64 - 1) * PAGE_SIZE as i64));

        let mut stmt = self.conn().prepare(&sql)?;
        let posts = stmt
            .query_map(params_from_iter(values.iter()), summary_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(PostPage {
            posts,
            page,
            total_pages,
        })
    }

    /// Replace the editable fields of a post, keeping unrelated tags.
    pub fn update_post(&self, token: &str, update: &PostUpdate) -> Result<()> {
        let row_id = decode_token(token)?;

        let existing: Option<Option<String>> = self
            .conn()
            .query_row(
                "SELECT tags FROM post WHERE id = ?1 AND deleted = 0",
                [row_id],
                |row| row.get(0),
            )
            .optional()?;
        let existing = existing.ok_or_else(|| StoreError::PostNotFound(token.to_string()))?;

        let mut tags = PostTags::parse(existing.as_deref());
        tags.edition.value = update.edition;

        self.conn().execute(
            "UPDATE post
             SET title = ?1, content = ?2, triggers = ?3, nsfw = ?4, updated = ?5, tags = ?6
             WHERE id = ?7",
            params![
                update.title,
                update.content,
                update.triggers,
                update.nsfw,
                now_ms(),
                serde_json::to_string(&tags)?,
                row_id,
            ],
        )?;

        debug!(post = %token, "Updated post");

        Ok(())
    }

    /// Set or clear (with `None`) the hashed edit code.
    pub fn set_edit_code(&self, token: &str, password_hash: Option<&str>) -> Result<()> {
        let row_id = decode_token(token)?;
        let changed = self.conn().execute(
            "UPDATE post SET password = ?1, updated = ?2 WHERE id = ?3 AND deleted = 0",
            params![password_hash.unwrap_or(""), now_ms(), row_id],
        )?;

        if changed == 0 {
            return Err(StoreError::PostNotFound(token.to_string()));
        }
        Ok(())
    }

    /// The stored edit code hash, `None` when the post has no edit code.
    pub fn edit_code_hash(&self, token: &str) -> Result<Option<String>> {
        let row_id = decode_token(token)?;
        let password: Option<Option<String>> = self
            .conn()
            .query_row(
                "SELECT password FROM post WHERE id = ?1 AND deleted = 0",
                [row_id],
                |row| row.get(0),
            )
            .optional()?;

        match password {
            None => Err(StoreError::PostNotFound(token.to_string())),
            Some(hash) => Ok(hash.filter(|h| !h.is_empty())),
        }
    }

    /// Soft-delete a post. It disappears from listings, feeds and search.
    pub fn delete_post(&self, token: &str) -> Result<()> {
        let row_id = decode_token(token)?;
        let changed = self.conn().execute(
            "UPDATE post SET deleted = 1 WHERE id = ?1 AND deleted = 0",
            [row_id],
        )?;

        if changed == 0 {
            return Err(StoreError::PostNotFound(token.to_string()));
        }

        debug!(post = %token, "Deleted post");
        Ok(())
    }

    /// Set the nsfw flag.
    pub fn set_nsfw(&self, token: &str, nsfw: bool) -> Result<()> {
        let row_id = decode_token(token)?;
        let changed = self.conn().execute(
            "UPDATE post SET nsfw = ?1 WHERE id = ?2 AND deleted = 0",
            params![nsfw, row_id],
        )?;

        if changed == 0 {
            return Err(StoreError::PostNotFound(token.to_string()));
        }
        Ok(())
    }

    /// Token of a uniformly random live post.
    pub fn random_post(&self) -> Result<Option<String>> {
        let row_id: Option<i64> = self
            .conn()
            .query_row(
                "SELECT id FROM post WHERE deleted = 0 ORDER BY RANDOM() LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        row_id
            .map(|id| hashid::encode(id as u64).map_err(StoreError::from))
            .transpose()
    }

    /// Number of live posts.
    pub fn post_count(&self) -> Result<i64> {
        Ok(self.conn().query_row(
            "SELECT COUNT(id) FROM post WHERE deleted = 0",
            [],
            |row| row.get(0),
        )?)
    }

    /// Total views over every post ever made.
    pub fn view_count(&self) -> Result<i64> {
        Ok(self.conn().query_row(
            "SELECT IFNULL(SUM(views), 0) FROM post",
            [],
            |row| row.get(0),
        )?)
    }

    /// Token for a post that was addressed by ULID before ids were hashed.
    pub fn migrated_post_token(&self, ulid: &str) -> Result<Option<String>> {
        let new_id: Option<i64> = self
            .conn()
            .query_row(
                "SELECT new_id FROM post_id_map WHERE ulid = ?1",
                [ulid],
                |row| row.get(0),
            )
            .optional()?;

        new_id
            .map(|id| hashid::encode(id as u64).map_err(StoreError::from))
            .transpose()
    }
}
