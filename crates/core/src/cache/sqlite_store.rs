//! SQLite-backed persistent cache.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;
use url::Url;

use crate::manifest::{ManifestDocument, ManifestOptions};
use crate::transport::Validators;

use super::{CacheError, CacheStats, CachedEntry, PersistentCache};

/// Manifest generations kept unless configured otherwise.
pub const DEFAULT_RETAINED_GENERATIONS: usize = 4;

/// SQLite-backed persistent cache.
pub struct SqliteCache {
    conn: Mutex<Connection>,
    retained_generations: usize,
}

impl SqliteCache {
    /// Open (or create) the cache database at `path`.
    pub fn new(path: &Path) -> Result<Self, CacheError> {
        let conn = Connection::open(path).map_err(|e| CacheError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            retained_generations: DEFAULT_RETAINED_GENERATIONS,
        })
    }

    /// Create an in-memory cache (useful for testing).
    pub fn in_memory() -> Result<Self, CacheError> {
        let conn =
            Connection::open_in_memory().map_err(|e| CacheError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            retained_generations: DEFAULT_RETAINED_GENERATIONS,
        })
    }

    /// Keep at most `generations` stored manifests (at least one).
    pub fn with_retained_generations(mut self, generations: usize) -> Self {
        self.retained_generations = generations.max(1);
        self
    }

    fn initialize_schema(conn: &Connection) -> Result<(), CacheError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS manifests (
                generation INTEGER PRIMARY KEY AUTOINCREMENT,
                url TEXT,
                body TEXT NOT NULL,
                strict_schemes INTEGER NOT NULL DEFAULT 0,
                same_origin INTEGER NOT NULL DEFAULT 0,
                stored_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS entries (
                url TEXT PRIMARY KEY,
                body BLOB NOT NULL,
                etag TEXT,
                last_modified TEXT,
                digest TEXT NOT NULL,
                stored_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS master_entries (
                url TEXT PRIMARY KEY,
                position INTEGER NOT NULL,
                pending INTEGER NOT NULL DEFAULT 1
            );

            CREATE INDEX IF NOT EXISTS idx_master_entries_pending ON master_entries(pending, position);
            "#,
        )
        .map_err(|e| CacheError::Database(e.to_string()))
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, CacheError> {
        self.conn
            .lock()
            .map_err(|e| CacheError::Database(format!("connection lock poisoned: {}", e)))
    }

    fn newest_manifest(conn: &Connection) -> Result<Option<ManifestDocument>, CacheError> {
        let row = conn
            .query_row(
                "SELECT url, body, strict_schemes, same_origin FROM manifests ORDER BY generation DESC LIMIT 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, bool>(2)?,
                        row.get::<_, bool>(3)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| CacheError::Database(e.to_string()))?;

        let Some((url, body, strict_schemes, same_origin)) = row else {
            return Ok(None);
        };

        let options = ManifestOptions::new(strict_schemes, same_origin);
        ManifestDocument::parse(url.as_deref(), options, body.as_bytes())
            .map(Some)
            .map_err(|e| CacheError::Serialization(e.to_string()))
    }

    fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<CachedEntry> {
        let stored_at_str: String = row.get(4)?;
        let stored_at = DateTime::parse_from_rfc3339(&stored_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(CachedEntry {
            body: row.get(0)?,
            validators: Validators {
                etag: row.get(1)?,
                last_modified: row.get(2)?,
            },
            digest: row.get(3)?,
            stored_at,
        })
    }
}

impl PersistentCache for SqliteCache {
    fn store_manifest(&self, document: &ManifestDocument) -> Result<(), CacheError> {
        let conn = self.conn()?;
        let options = document.options();
        conn.execute(
            "INSERT INTO manifests (url, body, strict_schemes, same_origin, stored_at) VALUES (?, ?, ?, ?, ?)",
            params![
                document.manifest_url().map(Url::as_str),
                document.serialize(),
                options.strict_schemes,
                options.same_origin,
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| CacheError::Database(e.to_string()))?;
        let generation = conn.last_insert_rowid();

        let pruned = conn
            .execute(
                "DELETE FROM manifests WHERE generation <= ?",
                params![generation - self.retained_generations as i64],
            )
            .map_err(|e| CacheError::Database(e.to_string()))?;

        debug!(
            generation,
            pruned,
            entries = document.master_entries().len(),
            "Stored manifest generation"
        );
        Ok(())
    }

    fn stored_manifest(&self) -> Result<Option<ManifestDocument>, CacheError> {
        let conn = self.conn()?;
        Self::newest_manifest(&conn)
    }

    fn invalidate_manifest(&self, url: &Url, fully: bool) -> Result<(), CacheError> {
        let conn = self.conn()?;
        let sql = if fully {
            "DELETE FROM entries WHERE url = ?"
        } else {
            "UPDATE entries SET etag = NULL, last_modified = NULL WHERE url = ?"
        };
        conn.execute(sql, params![url.as_str()])
            .map_err(|e| CacheError::Database(e.to_string()))?;
        Ok(())
    }

    fn mark_pending_master_entries(&self) -> Result<usize, CacheError> {
        let mut conn = self.conn()?;
        let Some(document) = Self::newest_manifest(&conn)? else {
            return Ok(0);
        };

        let tx = conn
            .transaction()
            .map_err(|e| CacheError::Database(e.to_string()))?;
        tx.execute("DELETE FROM master_entries", [])
            .map_err(|e| CacheError::Database(e.to_string()))?;

        let mut marked = 0;
        for (position, uri) in document.master_entries().iter().enumerate() {
            // Relative references cannot be fetched.
            let Some(url) = uri.as_url() else {
                continue;
            };
            tx.execute(
                "INSERT INTO master_entries (url, position, pending) VALUES (?, ?, 1)",
                params![url.as_str(), position as i64],
            )
            .map_err(|e| CacheError::Database(e.to_string()))?;
            marked += 1;
        }

        tx.commit()
            .map_err(|e| CacheError::Database(e.to_string()))?;
        Ok(marked)
    }

    fn pending_master_entries(&self) -> Result<Vec<Url>, CacheError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT url FROM master_entries WHERE pending = 1 ORDER BY position")
            .map_err(|e| CacheError::Database(e.to_string()))?;

        let urls = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| CacheError::Database(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| CacheError::Database(e.to_string()))?;

        urls.iter()
            .map(|u| Url::parse(u).map_err(|e| CacheError::Serialization(e.to_string())))
            .collect()
    }

    fn get(&self, url: &Url) -> Result<Option<CachedEntry>, CacheError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT body, etag, last_modified, digest, stored_at FROM entries WHERE url = ?",
            params![url.as_str()],
            Self::row_to_entry,
        )
        .optional()
        .map_err(|e| CacheError::Database(e.to_string()))
    }

    fn put(&self, url: &Url, entry: &CachedEntry) -> Result<(), CacheError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO entries (url, body, etag, last_modified, digest, stored_at) VALUES (?, ?, ?, ?, ?, ?)",
            params![
                url.as_str(),
                entry.body,
                entry.validators.etag,
                entry.validators.last_modified,
                entry.digest,
                entry.stored_at.to_rfc3339(),
            ],
        )
        .map_err(|e| CacheError::Database(e.to_string()))?;

        conn.execute(
            "UPDATE master_entries SET pending = 0 WHERE url = ?",
            params![url.as_str()],
        )
        .map_err(|e| CacheError::Database(e.to_string()))?;
        Ok(())
    }

    fn stats(&self) -> Result<CacheStats, CacheError> {
        let conn = self.conn()?;
        let count = |sql: &str| -> Result<u64, CacheError> {
            conn.query_row(sql, [], |row| row.get::<_, i64>(0))
                .map(|n| n as u64)
                .map_err(|e| CacheError::Database(e.to_string()))
        };

        Ok(CacheStats {
            manifest_generations: count("SELECT COUNT(*) FROM manifests")?,
            entries: count("SELECT COUNT(*) FROM entries")?,
            total_bytes: count("SELECT COALESCE(SUM(LENGTH(body)), 0) FROM entries")?,
            pending_entries: count("SELECT COUNT(*) FROM master_entries WHERE pending = 1")?,
        })
    }
}
