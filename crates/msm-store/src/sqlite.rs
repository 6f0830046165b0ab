use std::path::{Path, PathBuf};

use msm_session::{PersistentStore, StoredRow};
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use tracing::{debug, info, warn};

use crate::error::{Result, StoreError};

/// Current schema version, stored in `PRAGMA user_version`.
pub const SCHEMA_VERSION: i32 = 1;

/// Session rows in a SQLite database.
///
/// Thread-safe via an internal mutex around the connection. After
/// [`close`](PersistentStore::close) every call fails with
/// [`StoreError::Closed`].
pub struct SqliteStore {
    conn: Mutex<Option<Connection>>,
    location: String,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("location", &self.location)
            .field("open", &self.conn.lock().is_some())
            .finish()
    }
}

impl SqliteStore {
    /// Open or create the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
        )?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        let store = Self::with_connection(conn, path.display().to_string())?;
        info!(path = %path.display(), "Session store opened");
        Ok(store)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self::with_connection(conn, ":memory:".to_string())?;
        debug!("In-memory session store created");
        Ok(store)
    }

    /// Open the database named by a URL.
    ///
    /// Accepts `sqlite://<path>`, `sqlite:<path>`, a bare filesystem path,
    /// and `:memory:` (optionally prefixed with `sqlite:`).
    pub fn from_url(url: &str) -> Result<Self> {
        match parse_url(url)? {
            None => Self::open_in_memory(),
            Some(path) => Self::open(path),
        }
    }

    fn with_connection(conn: Connection, location: String) -> Result<Self> {
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(Some(conn)),
            location,
        })
    }

    /// Where the database lives, for logging.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Run `f` against the open connection.
    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let guard = self.conn.lock();
        let conn = guard.as_ref().ok_or(StoreError::Closed)?;
        f(conn)
    }

    /// Number of stored rows.
    pub fn count(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM msm_session", [], |row| row.get(0))?;
            Ok(n.max(0) as usize)
        })
    }

    /// Fetch a full row.
    pub fn row(&self, id: &str) -> Result<Option<StoredRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, data, started, updated FROM msm_session WHERE id = ?1",
                    params![id],
                    |row| {
                        Ok(StoredRow {
                            id: row.get(0)?,
                            data: row.get(1)?,
                            created: row.get(2)?,
                            updated: row.get(3)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    fn read_blob(&self, id: &str) -> Result<Option<Vec<u8>>> {
        self.with_conn(|conn| {
            let data = conn
                .query_row(
                    "SELECT data FROM msm_session WHERE id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(data)
        })
    }

    fn insert_row(&self, id: &str, data: &[u8], created: i64, updated: i64) -> Result<()> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO msm_session (id, started, updated, data) VALUES (?1, ?2, ?3, ?4)",
                params![id, created, updated, data],
            )?;
            if inserted > 0 {
                debug!(session_id = %id, "Inserted session row");
            }
            Ok(())
        })
    }

    fn update_row(&self, id: &str, data: &[u8], updated: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let affected = conn.execute(
                "UPDATE msm_session SET data = ?2, updated = ?3 WHERE id = ?1",
                params![id, data, updated],
            )?;
            Ok(affected > 0)
        })
    }

    fn delete_rows_before(&self, cutoff: i64) -> Result<usize> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM msm_session WHERE updated < ?1", params![cutoff])?;
            Ok(deleted)
        })
    }

    fn close_conn(&self) -> Result<()> {
        let Some(conn) = self.conn.lock().take() else {
            return Ok(());
        };
        conn.close().map_err(|(_, e)| StoreError::Database(e))?;
        info!(location = %self.location, "Session store closed");
        Ok(())
    }
}

impl PersistentStore for SqliteStore {
    fn read(&self, id: &str) -> msm_session::Result<Option<Vec<u8>>> {
        Ok(self.read_blob(id)?)
    }

    fn insert_if_absent(
        &self,
        id: &str,
        data: &[u8],
        created: i64,
        updated: i64,
    ) -> msm_session::Result<()> {
        Ok(self.insert_row(id, data, created, updated)?)
    }

    fn update(&self, id: &str, data: &[u8], updated: i64) -> msm_session::Result<bool> {
        Ok(self.update_row(id, data, updated)?)
    }

    fn delete_older_than(&self, cutoff: i64) -> msm_session::Result<usize> {
        Ok(self.delete_rows_before(cutoff)?)
    }

    fn close(&self) -> msm_session::Result<()> {
        Ok(self.close_conn()?)
    }
}

impl Drop for SqliteStore {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.get_mut().take() {
            if let Err((_, e)) = conn.close() {
                warn!(location = %self.location, error = %e, "Failed to close session store");
            }
        }
    }
}

/// Create or upgrade the schema.
fn migrate(conn: &Connection) -> Result<()> {
    let current: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if current >= SCHEMA_VERSION {
        debug!(version = current, "Session schema up to date");
        return Ok(());
    }

    info!(from = current, to = SCHEMA_VERSION, "Migrating session schema");
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS msm_session (
            id TEXT PRIMARY KEY,
            started INTEGER NOT NULL,
            updated INTEGER NOT NULL,
            data BLOB NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_msm_session_updated
            ON msm_session(updated);
        "#,
    )?;
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(())
}

/// Split a database URL into a path, or `None` for an in-memory database.
fn parse_url(url: &str) -> Result<Option<PathBuf>> {
    let url = url.trim();
    let rest = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);

    if rest == ":memory:" {
        return Ok(None);
    }
    if rest.is_empty() {
        return Err(StoreError::InvalidUrl(url.to_string()));
    }
    if rest.contains("://") {
        return Err(StoreError::InvalidUrl(format!(
            "{url} (only sqlite databases are supported)"
        )));
    }
    Ok(Some(PathBuf::from(rest)))
}
