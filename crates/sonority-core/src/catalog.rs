//! Read-only lookups against the relational song catalog.
//!
//! The catalog is owned by the CRUD service; this side only resolves a
//! file path to the id shared with the vector index.

use rusqlite::{Connection, OpenFlags, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use crate::error::{Error, Result};
use crate::model::EntityId;

/// Resolves catalog file paths to entity ids.
pub trait CatalogLookup: Send + Sync {
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when no catalog row has `path`, and
    /// [`Error::Unavailable`] when the catalog cannot be queried.
    fn id_for_path(&self, path: &str) -> Result<EntityId>;
}

const CATALOG_SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS music_library (
    id INTEGER PRIMARY KEY,
    filename TEXT,
    filepath TEXT UNIQUE,
    title TEXT,
    artist TEXT,
    album TEXT,
    top_5_genres TEXT
);
";

/// [`CatalogLookup`] over the `music_library` table of a SQLite catalog.
#[derive(Debug)]
pub struct SqliteCatalog {
    conn: Mutex<Connection>,
}

impl SqliteCatalog {
    /// Open an existing catalog read-only.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an empty in-memory catalog with the table created (for tests
    /// and local fixtures).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] if SQLite rejects the schema.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(CATALOG_SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Insert a catalog row. Only used to seed fixtures.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] if the insert fails.
    pub fn insert(&self, id: EntityId, path: &str, title: &str, artist: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute(
            "INSERT INTO music_library (id, filepath, title, artist) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![id.get(), path, title, artist],
        )?;
        Ok(())
    }
}

impl CatalogLookup for SqliteCatalog {
    fn id_for_path(&self, path: &str) -> Result<EntityId> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let id: Option<i64> = conn
            .query_row(
                "SELECT id FROM music_library WHERE filepath = ?1",
                [path],
                |row| row.get(0),
            )
            .optional()?;
        id.map(EntityId::new)
            .ok_or_else(|| Error::not_found("catalog entry", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_lookup_by_path() {
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        catalog
            .insert(EntityId::new(7), "Band/Album/song.mp3", "Song", "Band")
            .unwrap();

        let id = catalog.id_for_path("Band/Album/song.mp3").unwrap();
        assert_eq!(id, EntityId::new(7));
    }

    #[test]
    fn test_lookup_missing_path_is_not_found() {
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        let err = catalog.id_for_path("missing.mp3").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_open_file_catalog_read_only() {
        let dir = tempfile::TempDir::new().unwrap();
        let db_path = dir.path().join("music.db");
        {
            let conn = Connection::open(&db_path).unwrap();
            conn.execute_batch(CATALOG_SCHEMA).unwrap();
            conn.execute(
                "INSERT INTO music_library (id, filepath) VALUES (3, 'x.mp3')",
                [],
            )
            .unwrap();
        }

        let catalog = SqliteCatalog::open(&db_path).unwrap();
        assert_eq!(catalog.id_for_path("x.mp3").unwrap(), EntityId::new(3));
        assert!(catalog.insert(EntityId::new(4), "y.mp3", "t", "a").is_err());
    }

    #[test]
    fn test_open_missing_file_is_unavailable() {
        let err = SqliteCatalog::open("/nonexistent/dir/music.db").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unavailable);
    }
}
