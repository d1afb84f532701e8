//! Schema creation and in-place upgrades.
//!
//! Table and column names match databases written by earlier deployments,
//! including the `"for"` column on comments, so an existing
//! `writers-jam.db` opens unchanged.

use rusqlite::Connection;
use tracing::info;

use super::Result;

const TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS post (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    content TEXT NOT NULL,
    nsfw BOOLEAN NOT NULL,
    password TEXT,
    triggers TEXT,
    title TEXT,
    author TEXT,
    views INTEGER NOT NULL DEFAULT 0,
    reports INTEGER NOT NULL DEFAULT 0,
    updated INTEGER NOT NULL,
    deleted BOOLEAN NOT NULL DEFAULT 0,
    tags TEXT
);

CREATE TABLE IF NOT EXISTS comment (
    id TEXT PRIMARY KEY,
    "for" INTEGER NOT NULL,
    content TEXT NOT NULL,
    author TEXT,
    posted INTEGER NOT NULL,
    FOREIGN KEY ("for") REFERENCES post(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS comment_for ON comment ("for");

CREATE TABLE IF NOT EXISTS post_id_map (
    ulid TEXT PRIMARY KEY,
    new_id INTEGER UNIQUE NOT NULL
);

CREATE TABLE IF NOT EXISTS editions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    deleted BOOLEAN NOT NULL DEFAULT 0,
    description TEXT DEFAULT ''
);

INSERT OR IGNORE INTO editions (id, name) VALUES (0, 'No edition');

CREATE TABLE IF NOT EXISTS admin_codes (
    code INTEGER PRIMARY KEY,
    created_at INTEGER
);

CREATE TABLE IF NOT EXISTS admins (
    username TEXT PRIMARY KEY,
    password TEXT NOT NULL,
    created_at INTEGER
);

CREATE TABLE IF NOT EXISTS moderation_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    admin TEXT NOT NULL,
    action TEXT NOT NULL,
    target TEXT NOT NULL,
    details TEXT,
    created_at INTEGER NOT NULL
);

CREATE TRIGGER IF NOT EXISTS moderation_log_no_update BEFORE UPDATE ON moderation_log BEGIN
    SELECT RAISE(ABORT, 'moderation log is append-only');
END;

CREATE TRIGGER IF NOT EXISTS moderation_log_no_delete BEFORE DELETE ON moderation_log BEGIN
    SELECT RAISE(ABORT, 'moderation log is append-only');
END;
"#;

// External-content FTS5 rows must be removed with the 'delete' command and
// the exact values they were indexed with, so deleted posts are only ever
// "deleted" from the index once.
const FTS: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS post_fts USING fts5(
    content,
    title,
    author,
    content='post',
    content_rowid='id',
    tokenize = 'porter unicode61'
);

DROP TRIGGER IF EXISTS post_ai;
DROP TRIGGER IF EXISTS post_au;
DROP TRIGGER IF EXISTS post_ad;

CREATE TRIGGER post_ai AFTER INSERT ON post BEGIN
    INSERT INTO post_fts (rowid, content, title, author)
    SELECT new.id, new.content, new.title, new.author
    WHERE new.deleted = 0;
END;

CREATE TRIGGER post_au AFTER UPDATE OF content, title, author, deleted ON post BEGIN
    INSERT INTO post_fts (post_fts, rowid, content, title, author)
    SELECT 'delete', old.id, old.content, old.title, old.author
    WHERE old.deleted = 0;

    INSERT INTO post_fts (rowid, content, title, author)
    SELECT new.id, new.content, new.title, new.author
    WHERE new.deleted = 0;
END;

CREATE TRIGGER post_ad AFTER DELETE ON post BEGIN
    INSERT INTO post_fts (post_fts, rowid, content, title, author)
    SELECT 'delete', old.id, old.content, old.title, old.author
    WHERE old.deleted = 0;
END;
"#;

/// Create every table, index and trigger that does not exist yet.
pub(super) fn init(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA journal_mode = WAL")?;
    conn.execute_batch("PRAGMA foreign_keys = ON")?;

    conn.execute_batch(TABLES)?;
    add_missing_columns(conn)?;
    conn.execute_batch(FTS)?;

    Ok(())
}

/// Older databases predate the `tags` column.
fn add_missing_columns(conn: &Connection) -> Result<()> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info('post')")?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    if !columns.iter().any(|c| c == "tags") {
        conn.execute_batch("ALTER TABLE post ADD COLUMN tags TEXT")?;
        info!("Added tags column to post table");
    }

    Ok(())
}
