//! Admin accounts, signup codes and the moderation log.

use rand::Rng;
use rusqlite::{params, ErrorCode, OptionalExtension, Row};
use serde::Serialize;
use tracing::{debug, info};

use super::{now_ms, Result, Store, StoreError};
use crate::hashid::{self, MODULUS};

/// Signup codes older than this are purged before any code is checked.
pub const SIGNUP_CODE_TTL_SECS: i64 = 30 * 60;

/// A stored admin account.
#[derive(Debug, Clone)]
pub struct AdminUser {
    pub username: String,
    pub password_hash: String,
}

/// Moderation actions recorded in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationAction {
    DeletePost,
    SetNsfw,
    DeleteComment,
    CreateEdition,
    DeleteEdition,
    ResetEditCode,
    CreateSignupCode,
}

impl ModerationAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ModerationAction::DeletePost => "delete_post",
            ModerationAction::SetNsfw => "set_nsfw",
            ModerationAction::DeleteComment => "delete_comment",
            ModerationAction::CreateEdition => "create_edition",
            ModerationAction::DeleteEdition => "delete_edition",
            ModerationAction::ResetEditCode => "reset_edit_code",
            ModerationAction::CreateSignupCode => "create_signup_code",
        }
    }
}

/// One moderation log entry.
#[derive(Debug, Clone, Serialize)]
pub struct ModerationEntry {
    pub id: i64,
    pub admin: String,
    pub action: String,
    pub target: String,
    pub details: Option<String>,
    /// Epoch milliseconds.
    pub created_at: i64,
}

/// A page of the moderation log.
#[derive(Debug, Clone, Serialize)]
pub struct ModerationPage {
    pub entries: Vec<ModerationEntry>,
    pub total: i64,
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<ModerationEntry> {
    Ok(ModerationEntry {
        id: row.get(0)?,
        admin: row.get(1)?,
        action: row.get(2)?,
        target: row.get(3)?,
        details: row.get(4)?,
        created_at: row.get(5)?,
    })
}

impl Store {
    // === Signup codes ===

    /// Mint a signup code, rendered like a post token.
    pub fn create_signup_code<R: Rng>(&self, rng: &mut R) -> Result<String> {
        loop {
            let code = rng.gen_range(1..MODULUS);
            let inserted = self.conn().execute(
                "INSERT OR IGNORE INTO admin_codes (code, created_at)
                 VALUES (?1, CAST(strftime('%s', 'now') AS INTEGER))",
                [code as i64],
            )?;

            if inserted == 1 {
                debug!("Created signup code");
                return Ok(hashid::encode(code)?);
            }
        }
    }

    /// Use up a signup code. Returns false for unknown, expired or malformed codes.
    pub fn consume_signup_code(&self, code: &str) -> Result<bool> {
        self.conn().execute(
            "DELETE FROM admin_codes
             WHERE CAST(strftime('%s', 'now') AS INTEGER) - created_at > ?1",
            [SIGNUP_CODE_TTL_SECS],
        )?;

        let Ok(code) = hashid::decode(code) else {
            return Ok(false);
        };

        let deleted = self
            .conn()
            .execute("DELETE FROM admin_codes WHERE code = ?1", [code as i64])?;

        Ok(deleted == 1)
    }

    // === Admins ===

    /// Create an admin account with an already hashed password.
    pub fn create_admin(&self, username: &str, password_hash: &str) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO admins (username, password, created_at)
             VALUES (?1, ?2, CAST(strftime('%s', 'now') AS INTEGER))",
            params![username, password_hash],
        );

        match result {
            Ok(_) => {
                info!(username = %username, "Created admin");
                Ok(())
            }
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(StoreError::AdminExists(username.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Look up an admin.
    pub fn admin(&self, username: &str) -> Result<Option<AdminUser>> {
        Ok(self
            .conn()
            .query_row(
                "SELECT username, password FROM admins WHERE username = ?1",
                [username],
                |row| {
                    Ok(AdminUser {
                        username: row.get(0)?,
                        password_hash: row.get(1)?,
                    })
                },
            )
            .optional()?)
    }

    /// Number of admin accounts.
    pub fn admin_count(&self) -> Result<i64> {
        Ok(self
            .conn()
            .query_row("SELECT COUNT(username) FROM admins", [], |row| row.get(0))?)
    }

    // === Moderation log ===

    /// Append an entry to the moderation log.
    pub fn log_action(
        &self,
        admin: &str,
        action: ModerationAction,
        target: &str,
        details: Option<&str>,
    ) -> Result<i64> {
        let id = self.conn().query_row(
            "INSERT INTO moderation_log (admin, action, target, details, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             RETURNING id",
            params![admin, action.as_str(), target, details, now_ms()],
            |row| row.get(0),
        )?;

        info!(
            admin = %admin,
            action = action.as_str(),
            target = %target,
            "Moderation action"
        );

        Ok(id)
    }

    /// A page of the moderation log, newest first.
    pub fn moderation_log(&self, page: u32, limit: u32) -> Result<ModerationPage> {
        let limit = limit.clamp(1, 100) as i64;
        let offset = (page.max(1) as i64 - 1) * limit;

        let mut stmt = self.conn().prepare_cached(
            "SELECT id, admin, action, target, details, created_at
             FROM moderation_log
             ORDER BY id DESC
             LIMIT ?1 OFFSET ?2",
        )?;
        let entries = stmt
            .query_map([limit, offset], entry_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let total = self
            .conn()
            .query_row("SELECT COUNT(*) FROM moderation_log", [], |row| row.get(0))?;

        Ok(ModerationPage { entries, total })
    }
}
