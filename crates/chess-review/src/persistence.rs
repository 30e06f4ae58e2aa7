//! SQLite persistence for finished reviews.
//!
//! Records are stored as JSON blobs grouped by collection. [`ReviewArchive`]
//! and [`Journal`](crate::journal::Journal) are typed views over a
//! [`BlobStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::game_record::{GameHeaders, GameRecord};
use crate::stats::GameStats;
use crate::AnalysisStore;

/// Reviews kept in the archive; older ones are dropped on save.
pub const MAX_REVIEWS: usize = 50;

const REVIEWS: &str = "reviews";

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Corrupt record {id}: {reason}")]
    Corrupt { id: String, reason: String },
}

/// A raw stored record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub data: String,
}

/// Keyed JSON storage grouped by collection.
pub trait BlobStore {
    /// Inserts or replaces `id`. A replaced record keeps its place in the
    /// collection order.
    fn save(&self, collection: &str, id: &str, data: &str) -> Result<(), PersistenceError>;

    /// All records of `collection`, most recently inserted first.
    fn load_all(&self, collection: &str) -> Result<Vec<StoredBlob>, PersistenceError>;

    /// The data stored under `id`, if any.
    fn load(&self, collection: &str, id: &str) -> Result<Option<String>, PersistenceError>;

    /// Returns whether a record was removed.
    fn delete(&self, collection: &str, id: &str) -> Result<bool, PersistenceError>;
}

impl<T: BlobStore + ?Sized> BlobStore for &T {
    fn save(&self, collection: &str, id: &str, data: &str) -> Result<(), PersistenceError> {
        (**self).save(collection, id, data)
    }

    fn load_all(&self, collection: &str) -> Result<Vec<StoredBlob>, PersistenceError> {
        (**self).load_all(collection)
    }

    fn load(&self, collection: &str, id: &str) -> Result<Option<String>, PersistenceError> {
        (**self).load(collection, id)
    }

    fn delete(&self, collection: &str, id: &str) -> Result<bool, PersistenceError> {
        (**self).delete(collection, id)
    }
}

/// SQLite-backed [`BlobStore`].
pub struct SqliteBlobStore {
    conn: Connection,
}

impl SqliteBlobStore {
    /// Opens or creates the database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, PersistenceError> {
        let store = Self {
            conn: Connection::open(path)?,
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self, PersistenceError> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), PersistenceError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS blobs (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                data TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (collection, id)
            );
            ",
        )?;
        Ok(())
    }
}

impl BlobStore for SqliteBlobStore {
    fn save(&self, collection: &str, id: &str, data: &str) -> Result<(), PersistenceError> {
        self.conn.execute(
            "INSERT INTO blobs (collection, id, data, created_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(collection, id) DO UPDATE SET data = excluded.data",
            params![collection, id, data, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn load(&self, collection: &str, id: &str) -> Result<Option<String>, PersistenceError> {
        let data = self
            .conn
            .query_row(
                "SELECT data FROM blobs WHERE collection = ?1 AND id = ?2",
                [collection, id],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(data)
    }

    fn load_all(&self, collection: &str) -> Result<Vec<StoredBlob>, PersistenceError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, data, created_at FROM blobs WHERE collection = ?1 ORDER BY rowid DESC",
        )?;
        let rows = stmt
            .query_map([collection], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, data, created_at)| {
                let created_at = DateTime::parse_from_rfc3339(&created_at)
                    .map_err(|e| PersistenceError::Corrupt {
                        id: id.clone(),
                        reason: e.to_string(),
                    })?
                    .with_timezone(&Utc);
                Ok(StoredBlob {
                    id,
                    created_at,
                    data,
                })
            })
            .collect()
    }

    fn delete(&self, collection: &str, id: &str) -> Result<bool, PersistenceError> {
        let removed = self.conn.execute(
            "DELETE FROM blobs WHERE collection = ?1 AND id = ?2",
            [collection, id],
        )?;
        Ok(removed > 0)
    }
}

/// A finished review as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedReview {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub headers: GameHeaders,
    /// Mainline in SAN.
    pub moves: Vec<String>,
    pub analysis: AnalysisStore,
    pub stats: GameStats,
}

impl SavedReview {
    pub fn new(record: &GameRecord, analysis: AnalysisStore) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            headers: record.headers.clone(),
            moves: record.moves.clone(),
            stats: GameStats::from_store(&analysis),
            analysis,
        }
    }

    /// "White vs Black (result)".
    pub fn title(&self) -> String {
        format!(
            "{} vs {} ({})",
            self.headers.white_name(),
            self.headers.black_name(),
            self.headers.result_or_unknown()
        )
    }
}

/// Typed access to stored reviews, newest first.
pub struct ReviewArchive<S: BlobStore> {
    store: S,
}

impl<S: BlobStore> ReviewArchive<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Saves `review` and drops everything beyond the [`MAX_REVIEWS`] newest.
    pub fn save(&self, review: &SavedReview) -> Result<(), PersistenceError> {
        let data = serde_json::to_string(review)?;
        self.store.save(REVIEWS, &review.id, &data)?;

        let stored = self.store.load_all(REVIEWS)?;
        for old in stored.iter().skip(MAX_REVIEWS) {
            tracing::debug!("Dropping review {} from the archive", old.id);
            self.store.delete(REVIEWS, &old.id)?;
        }
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<SavedReview>, PersistenceError> {
        self.store
            .load_all(REVIEWS)?
            .iter()
            .map(|blob| serde_json::from_str(&blob.data).map_err(PersistenceError::from))
            .collect()
    }

    pub fn get(&self, id: &str) -> Result<Option<SavedReview>, PersistenceError> {
        match self.store.load(REVIEWS, id)? {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    pub fn delete(&self, id: &str) -> Result<bool, PersistenceError> {
        self.store.delete(REVIEWS, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn review(white: &str) -> SavedReview {
        let record = GameRecord::parse(&format!("[White \"{}\"]\n\n1. e4 e5 *", white)).unwrap();
        SavedReview::new(&record, AnalysisStore::new(record.position_count()))
    }

    #[test]
    fn blobs_are_newest_first_and_replaced_in_place() {
        let db = SqliteBlobStore::in_memory().unwrap();
        db.save("c", "a", "1").unwrap();
        db.save("c", "b", "2").unwrap();
        db.save("c", "a", "3").unwrap();
        db.save("other", "z", "9").unwrap();

        let all = db.load_all("c").unwrap();
        let ids: Vec<_> = all.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(all[1].data, "3");
        assert_eq!(db.load("c", "a").unwrap().as_deref(), Some("3"));
        assert_eq!(db.load("c", "missing").unwrap(), None);

        assert!(db.delete("c", "a").unwrap());
        assert!(!db.delete("c", "a").unwrap());
        assert_eq!(db.load_all("c").unwrap().len(), 1);
    }

    #[test]
    fn reviews_survive_reopening() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reviews.db");
        let saved = review("Morphy");
        {
            let db = SqliteBlobStore::open(&path).unwrap();
            ReviewArchive::new(&db).save(&saved).unwrap();
        }

        let db = SqliteBlobStore::open(&path).unwrap();
        let archive = ReviewArchive::new(&db);
        let loaded = archive.get(&saved.id).unwrap().unwrap();
        assert_eq!(loaded, saved);
        assert_eq!(loaded.title(), "Morphy vs Black (*)");
    }

    #[test]
    fn archive_keeps_the_newest_reviews() {
        let db = SqliteBlobStore::in_memory().unwrap();
        let archive = ReviewArchive::new(&db);
        let reviews: Vec<_> = (0..MAX_REVIEWS + 2).map(|i| review(&format!("P{}", i))).collect();
        for r in &reviews {
            archive.save(r).unwrap();
        }

        let listed = archive.list().unwrap();
        assert_eq!(listed.len(), MAX_REVIEWS);
        assert_eq!(listed[0].id, reviews[MAX_REVIEWS + 1].id);
        assert!(archive.get(&reviews[0].id).unwrap().is_none());
        assert!(archive.get(&reviews[1].id).unwrap().is_none());
    }

    #[test]
    fn delete_review() {
        let db = SqliteBlobStore::in_memory().unwrap();
        let archive = ReviewArchive::new(&db);
        let saved = review("A");
        archive.save(&saved).unwrap();
        assert!(archive.delete(&saved.id).unwrap());
        assert!(archive.list().unwrap().is_empty());
    }
}
