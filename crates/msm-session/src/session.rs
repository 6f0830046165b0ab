//! A single client's server-side session.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::warn;

use crate::error::{Error, Result};
use crate::value::{Key, SessionValues, Value};

/// State guarded by the session lock.
#[derive(Debug)]
struct SessionState {
    values: SessionValues,
    last_active: DateTime<Utc>,
    evicted: bool,
}

/// One user's server-side state.
///
/// Data and the last-activity timestamp sit behind the session's own lock.
/// Every accessor takes that lock for the duration of the call, so
/// operations on the same session are serialized while different sessions
/// proceed in parallel.
///
/// Once a flush has persisted the session and dropped it from the cache it
/// is marked evicted. Holders of an old `Arc<Session>` can check
/// [`is_evicted`](Self::is_evicted); writes made after eviction are logged
/// and never reach the store. The next request for the id loads a fresh
/// instance from the persisted row.
#[derive(Debug)]
pub struct Session {
    id: String,
    created_at: DateTime<Utc>,
    state: Mutex<SessionState>,
}

impl Session {
    /// Create an empty session.
    pub fn new(id: impl Into<String>) -> Self {
        Self::restore(id, SessionValues::new())
    }

    /// Wrap data loaded from the backing store.
    pub fn restore(id: impl Into<String>, values: SessionValues) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            created_at: now,
            state: Mutex::new(SessionState {
                values,
                last_active: now,
                evicted: false,
            }),
        }
    }

    /// The session id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// When this in-memory instance was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Last time the session was started by a request.
    pub fn last_active(&self) -> DateTime<Utc> {
        self.state.lock().last_active
    }

    /// Mark the session as active now.
    pub fn touch(&self) {
        self.touch_at(Utc::now());
    }

    /// Mark the session as active at `ts`.
    pub fn touch_at(&self, ts: DateTime<Utc>) {
        self.state.lock().last_active = ts;
    }

    /// Whether a flush has persisted this instance and dropped it from the cache.
    pub fn is_evicted(&self) -> bool {
        self.state.lock().evicted
    }

    /// Run `persist` over the data under the session lock and mark the
    /// session evicted when it succeeds.
    ///
    /// Holding the lock across the write means no update can land between
    /// the snapshot and the eviction mark.
    pub(crate) fn persist_and_evict<F>(&self, persist: F) -> Result<()>
    where
        F: FnOnce(&SessionValues) -> Result<()>,
    {
        let mut state = self.state.lock();
        persist(&state.values)?;
        state.evicted = true;
        Ok(())
    }

    /// Read a value.
    pub fn get(&self, key: impl Into<Key>) -> Result<Option<Value>> {
        let key = checked(key.into())?;
        Ok(self.state.lock().values.get(&key).cloned())
    }

    /// Store a value, replacing any previous one.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<()> {
        let key = checked(key.into())?;
        let value = value.into();
        let mut state = self.state.lock();
        self.warn_if_evicted(&state, "set");
        state.values.insert(key, value);
        Ok(())
    }

    /// Remove a value. Removing a missing key is not an error.
    pub fn delete(&self, key: impl Into<Key>) -> Result<()> {
        let key = checked(key.into())?;
        let mut state = self.state.lock();
        self.warn_if_evicted(&state, "delete");
        state.values.remove(&key);
        Ok(())
    }

    /// Run `f` with exclusive access to the session data.
    ///
    /// The closure runs under the same lock as [`get`](Self::get),
    /// [`set`](Self::set) and [`delete`](Self::delete), so a
    /// read-modify-write inside it is atomic with respect to them.
    pub fn with_lock<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut SessionValues) -> R,
    {
        let mut state = self.state.lock();
        self.warn_if_evicted(&state, "with_lock");
        f(&mut state.values)
    }

    /// Copy of the session data and its last-activity time, taken together.
    pub fn snapshot(&self) -> (SessionValues, DateTime<Utc>) {
        let state = self.state.lock();
        (state.values.clone(), state.last_active)
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        self.state.lock().values.len()
    }

    /// Whether the session holds no values.
    pub fn is_empty(&self) -> bool {
        self.state.lock().values.is_empty()
    }
}

impl Session {
    fn warn_if_evicted(&self, state: &SessionState, op: &str) {
        if state.evicted {
            warn!(session_id = %self.id, op, "Write to an evicted session will not be persisted");
        }
    }
}

fn checked(key: Key) -> Result<Key> {
    if key.is_absent() {
        return Err(Error::Argument("session key must not be empty".to_string()));
    }
    Ok(key)
}
