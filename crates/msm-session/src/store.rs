//! Backing-store contract for session rows.
//!
//! The registry never talks to a database directly. It consumes a
//! [`PersistentStore`], which reads and writes one row per session id. Calls
//! are synchronous and failures propagate to the caller without retries.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::error::{Error, Result};

/// A persisted session row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRow {
    /// Session id (primary key).
    pub id: String,

    /// Encoded session data.
    pub data: Vec<u8>,

    /// When the row was first inserted, epoch seconds.
    pub created: i64,

    /// When the row was last written, epoch seconds.
    pub updated: i64,
}

/// Durable storage for session rows.
pub trait PersistentStore: Send + Sync {
    /// Read the data blob for `id`, or `None` when no row exists.
    fn read(&self, id: &str) -> Result<Option<Vec<u8>>>;

    /// Insert a row unless one already exists for `id`.
    fn insert_if_absent(&self, id: &str, data: &[u8], created: i64, updated: i64) -> Result<()>;

    /// Overwrite the data of an existing row.
    ///
    /// Returns `false` when no row exists for `id`.
    fn update(&self, id: &str, data: &[u8], updated: i64) -> Result<bool>;

    /// Delete every row whose `updated` is strictly before `cutoff`.
    ///
    /// Returns the number of rows deleted.
    fn delete_older_than(&self, cutoff: i64) -> Result<usize>;

    /// Release the underlying connection. Called once at shutdown.
    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Map-backed store for tests and database-less runs.
///
/// Counts every write so callers can check how often rows were touched.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    rows: Mutex<HashMap<String, StoredRow>>,
    inserts: AtomicUsize,
    updates: AtomicUsize,
    deletes: AtomicUsize,
    failing: AtomicBool,
    closed: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail until switched back.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Put a row in place directly, bypassing the write counters.
    pub fn seed(&self, row: StoredRow) {
        self.rows.lock().insert(row.id.clone(), row);
    }

    /// Fetch a full row.
    pub fn row(&self, id: &str) -> Option<StoredRow> {
        self.rows.lock().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.lock().is_empty()
    }

    /// Number of rows created through `insert_if_absent`.
    pub fn inserts(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    /// Number of successful `update` calls.
    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    /// Number of rows removed by `delete_older_than`.
    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Persistence("store is closed".to_string()));
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Persistence("store unavailable".to_string()));
        }
        Ok(())
    }
}

impl PersistentStore for InMemoryStore {
    fn read(&self, id: &str) -> Result<Option<Vec<u8>>> {
        self.check()?;
        Ok(self.rows.lock().get(id).map(|row| row.data.clone()))
    }

    fn insert_if_absent(&self, id: &str, data: &[u8], created: i64, updated: i64) -> Result<()> {
        self.check()?;
        let mut rows = self.rows.lock();
        if !rows.contains_key(id) {
            rows.insert(
                id.to_string(),
                StoredRow {
                    id: id.to_string(),
                    data: data.to_vec(),
                    created,
                    updated,
                },
            );
            self.inserts.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn update(&self, id: &str, data: &[u8], updated: i64) -> Result<bool> {
        self.check()?;
        match self.rows.lock().get_mut(id) {
            Some(row) => {
                row.data = data.to_vec();
                row.updated = updated;
                self.updates.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn delete_older_than(&self, cutoff: i64) -> Result<usize> {
        self.check()?;
        let mut rows = self.rows.lock();
        let before = rows.len();
        rows.retain(|_, row| row.updated >= cutoff);
        let deleted = before - rows.len();
        self.deletes.fetch_add(deleted, Ordering::SeqCst);
        Ok(deleted)
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
