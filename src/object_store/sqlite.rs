//! SQLite object store.
//!
//! Many containers can share one database file; every store instance is
//! scoped to one of them.
//!
//! # Schema
//! ```sql
//! CREATE TABLE containers (
//!     name       TEXT PRIMARY KEY,
//!     created_at TEXT NOT NULL          -- ISO 8601 timestamp
//! );
//! CREATE TABLE blobs (
//!     container  TEXT NOT NULL,
//!     name       TEXT NOT NULL,
//!     data       BLOB NOT NULL,
//!     updated_at TEXT NOT NULL,         -- ISO 8601 timestamp
//!     PRIMARY KEY (container, name)
//! );
//! ```

use super::{KeyIter, ObjectStore, StoreResult};
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::info;

struct Inner {
    conn: Connection,
    container_ready: bool,
}

/// Object store backed by a SQLite database.
pub struct SqliteObjectStore {
    inner: Mutex<Inner>,
    container: String,
}

impl SqliteObjectStore {
    /// Opens (or creates) the database at `db_path` and scopes the store to
    /// `container`. The container row itself is created on first use.
    pub fn open<P: AsRef<Path>>(db_path: P, container: &str) -> StoreResult<Self> {
        let conn = Connection::open(db_path)?;
        Self::with_connection(conn, container)
    }

    /// Private in-memory database; mostly useful in tests.
    pub fn in_memory(container: &str) -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?, container)
    }

    fn with_connection(conn: Connection, container: &str) -> StoreResult<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS containers (
                name       TEXT PRIMARY KEY,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS blobs (
                container  TEXT NOT NULL,
                name       TEXT NOT NULL,
                data       BLOB NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (container, name)
            );
            "#,
        )?;

        Ok(Self {
            inner: Mutex::new(Inner {
                conn,
                container_ready: false,
            }),
            container: container.to_string(),
        })
    }

    /// Runs `f` with a connection whose container row is known to exist.
    fn with_container<T>(&self, f: impl FnOnce(&Connection) -> StoreResult<T>) -> StoreResult<T> {
        let mut inner = self.inner.lock();

        if !inner.container_ready {
            let exists: Option<i64> = inner
                .conn
                .query_row(
                    "SELECT 1 FROM containers WHERE name = ?1",
                    params![self.container],
                    |row| row.get(0),
                )
                .optional()?;

            if exists.is_none() {
                inner.conn.execute(
                    "INSERT OR IGNORE INTO containers (name, created_at) VALUES (?1, ?2)",
                    params![self.container, Utc::now().to_rfc3339()],
                )?;
                info!(container = %self.container, "Created object store container");
            }
            inner.container_ready = true;
        }

        f(&inner.conn)
    }
}

impl ObjectStore for SqliteObjectStore {
    fn upload(&self, key: &str, data: &[u8]) -> StoreResult<()> {
        self.with_container(|conn| {
            conn.execute(
                r#"
                INSERT INTO blobs (container, name, data, updated_at)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(container, name) DO UPDATE SET
                    data = excluded.data,
                    updated_at = excluded.updated_at
                "#,
                params![self.container, key, data, Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
    }

    fn download(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.with_container(|conn| {
            let data = conn
                .query_row(
                    "SELECT data FROM blobs WHERE container = ?1 AND name = ?2",
                    params![self.container, key],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(data)
        })
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        self.with_container(|conn| {
            conn.execute(
                "DELETE FROM blobs WHERE container = ?1 AND name = ?2",
                params![self.container, key],
            )?;
            Ok(())
        })
    }

    fn list(&self, prefix: &str) -> StoreResult<KeyIter<'_>> {
        let keys = self.with_container(|conn| {
            let mut stmt = conn.prepare(
                r#"
                SELECT name FROM blobs
                WHERE container = ?1 AND substr(name, 1, length(?2)) = ?2
                "#,
            )?;
            let keys = stmt
                .query_map(params![self.container, prefix], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(keys)
        })?;

        Ok(Box::new(keys.into_iter().map(Ok)))
    }
}
