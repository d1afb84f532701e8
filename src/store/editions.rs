//! Editions: themed submission periods.
//!
//! Edition 0 ("No edition") always exists and holds every post submitted
//! outside a themed week. The current edition is the newest one that has
//! not been deleted.

use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;
use tracing::info;

use super::{Result, Store, StoreError};

/// Id of the built-in "No edition" edition.
pub const NO_EDITION: i64 = 0;

/// An edition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Edition {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub deleted: bool,
}

fn edition_from_row(row: &Row<'_>) -> rusqlite::Result<Edition> {
    Ok(Edition {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        deleted: row.get(3)?,
    })
}

impl Store {
    /// All editions: "No edition" first, then newest first.
    pub fn list_editions(&self, include_deleted: bool) -> Result<Vec<Edition>> {
        let mut stmt = self.conn().prepare_cached(
            "SELECT id, name, description, deleted
             FROM editions
             WHERE ?1 OR deleted = 0
             ORDER BY id = 0 DESC, id DESC",
        )?;
        let editions = stmt
            .query_map([include_deleted], edition_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(editions)
    }

    /// Get an edition by id, deleted or not.
    pub fn edition(&self, id: i64) -> Result<Option<Edition>> {
        Ok(self
            .conn()
            .query_row(
                "SELECT id, name, description, deleted FROM editions WHERE id = ?1",
                [id],
                edition_from_row,
            )
            .optional()?)
    }

    /// Id of the current edition, [`NO_EDITION`] when none is running.
    pub fn current_edition(&self) -> Result<i64> {
        let id: Option<i64> = self.conn().query_row(
            "SELECT MAX(id) FROM editions WHERE deleted = 0",
            [],
            |row| row.get(0),
        )?;
        Ok(id.unwrap_or(NO_EDITION))
    }

    /// Start a new edition. It becomes the current one.
    pub fn create_edition(&self, name: &str, description: &str) -> Result<Edition> {
        let edition = self.conn().query_row(
            "INSERT INTO editions (name, description) VALUES (?1, ?2)
             RETURNING id, name, description, deleted",
            params![name, description],
            edition_from_row,
        )?;

        info!(edition = edition.id, name = %edition.name, "Created edition");

        Ok(edition)
    }

    /// Soft-delete an edition. Posts keep their edition tag.
    pub fn delete_edition(&self, id: i64) -> Result<()> {
        if id == NO_EDITION {
            return Err(StoreError::InvalidState(
                "the \"No edition\" edition cannot be deleted".to_string(),
            ));
        }

        let changed = self.conn().execute(
            "UPDATE editions SET deleted = 1 WHERE id = ?1 AND deleted = 0",
            [id],
        )?;

        if changed == 0 {
            return Err(StoreError::EditionNotFound(id));
        }

        info!(edition = id, "Deleted edition");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_edition_seeded() {
        let store = Store::open_in_memory().unwrap();

        let editions = store.list_editions(false).unwrap();
        assert_eq!(editions.len(), 1);
        assert_eq!(editions[0].id, NO_EDITION);
        assert_eq!(editions[0].name, "No edition");
        assert_eq!(store.current_edition().unwrap(), NO_EDITION);
    }

    #[test]
    fn test_ordering_and_current() {
        let store = Store::open_in_memory().unwrap();
        let one = store.create_edition("Week 1", "Rain").unwrap();
        let two = store.create_edition("Week 2", "").unwrap();

        assert_eq!(one.description, "Rain");
        assert!(!one.deleted);

        let ids: Vec<i64> = store.list_editions(false).unwrap().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![NO_EDITION, two.id, one.id]);
        assert_eq!(store.current_edition().unwrap(), two.id);

        store.delete_edition(two.id).unwrap();
        assert_eq!(store.current_edition().unwrap(), one.id);

        let ids: Vec<i64> = store.list_editions(false).unwrap().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![NO_EDITION, one.id]);
        assert_eq!(store.list_editions(true).unwrap().len(), 3);
        assert!(store.edition(two.id).unwrap().unwrap().deleted);
    }

    #[test]
    fn test_delete_rules() {
        let store = Store::open_in_memory().unwrap();

        assert!(matches!(
            store.delete_edition(NO_EDITION),
            Err(StoreError::InvalidState(_))
        ));
        assert!(matches!(
            store.delete_edition(42),
            Err(StoreError::EditionNotFound(42))
        ));

        let edition = store.create_edition("Week 1", "").unwrap();
        store.delete_edition(edition.id).unwrap();
        assert!(matches!(
            store.delete_edition(edition.id),
            Err(StoreError::EditionNotFound(_))
        ));
    }
}
