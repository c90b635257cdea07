//! `SQLite` cursor persistence.

use apptsync_core::{Cursor, CursorStore, StoreError};
use rusqlite::{Connection, OptionalExtension, Result as SqliteResult};
use std::path::Path;
use std::sync::Mutex;

/// `SQLite`-backed cursor store, one row per feed.
pub struct SqliteCursorStore {
    conn: Mutex<Connection>,
}

impl SqliteCursorStore {
    /// Open or create a `SQLite` database.
    ///
    /// # Errors
    ///
    /// Returns error if database cannot be opened or initialized.
    pub fn open(path: &Path) -> SqliteResult<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    /// Create an in-memory database.
    ///
    /// # Errors
    ///
    /// Returns error if database cannot be created.
    #[cfg(test)]
    pub fn in_memory() -> SqliteResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> SqliteResult<Self> {
        conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS feed_cursors (
                feed_id TEXT PRIMARY KEY,
                last_event_id TEXT,
                updated_at INTEGER NOT NULL
            );
            ",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> SqliteResult<T>,
    ) -> Result<T, StoreError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| StoreError("connection lock poisoned".to_string()))?;
        f(&conn).map_err(|e| StoreError(e.to_string()))
    }
}

impl CursorStore for SqliteCursorStore {
    fn load(&self, feed_id: &str) -> Result<Cursor, StoreError> {
        let event_id: Option<Option<String>> = self.with_conn(|conn| {
            conn.query_row(
                "SELECT last_event_id FROM feed_cursors WHERE feed_id = ?1",
                [feed_id],
                |row| row.get(0),
            )
            .optional()
        })?;
        Ok(Cursor::from_event_id(event_id.flatten()))
    }

    fn save(&self, feed_id: &str, cursor: &Cursor) -> Result<(), StoreError> {
        let now = chrono::Utc::now().timestamp();
        self.with_conn(|conn| {
            conn.execute(
                r"
                INSERT INTO feed_cursors (feed_id, last_event_id, updated_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(feed_id) DO UPDATE SET
                    last_event_id = excluded.last_event_id,
                    updated_at = excluded.updated_at
                ",
                (feed_id, cursor.event_id(), now),
            )
        })?;
        Ok(())
    }
}
