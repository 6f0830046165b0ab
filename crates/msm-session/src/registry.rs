//! The active-session registry.
//!
//! The registry owns the in-memory working set of sessions, binds inbound
//! requests to sessions, and runs the two background policies: flushing idle
//! sessions to the backing store and deleting stale rows from it.
//!
//! Two lock domains exist. The registry lock guards membership of the active
//! set; each session's own lock guards its data and timestamp. Code that
//! needs both always takes the registry lock first. Backing-store reads in
//! [`SessionRegistry::start`] run with no lock held.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use http::request::Parts;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::codec::Codec;
use crate::config::{RegistryConfig, is_cookie_token, valid_gc_interval_hours};
use crate::error::{Error, Result};
use crate::resolver::{CookieResolver, SessionCookie, generate_sid};
use crate::schedule::RecurringTask;
use crate::session::Session;
use crate::store::PersistentStore;
use crate::value::SessionValues;

/// Outcome of binding a request to a session.
///
/// `session` stays usable for the whole request, but a flush may evict it
/// if the request outlives the cache lifetime. Writes after that point are
/// not persisted; see [`Session::is_evicted`].
#[derive(Debug, Clone)]
pub struct Started {
    /// The bound session.
    pub session: Arc<Session>,

    /// Cookie to send back with the response.
    pub cookie: SessionCookie,

    /// Whether a new row was created in the backing store.
    pub created: bool,
}

/// Result of one flush sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Sessions written to the store and evicted.
    pub persisted: usize,

    /// Sessions still within their cache lifetime.
    pub retained: usize,

    /// Idle sessions whose write failed; they stay cached for the next sweep.
    pub failed: usize,
}

/// Handles to the flush and garbage-collection schedules.
#[derive(Debug)]
pub struct Schedules {
    pub flush: RecurringTask,
    pub gc: RecurringTask,
}

impl Schedules {
    /// Stop both schedules and wait for them to finish.
    pub async fn stop(self) {
        self.flush.stop().await;
        self.gc.stop().await;
    }
}

/// Membership list of active sessions.
///
/// Only ever touched while the registry lock is held.
#[derive(Debug, Default)]
struct ActiveSet {
    sessions: Vec<Arc<Session>>,
}

impl ActiveSet {
    /// Visit sessions in order until `f` returns `false`.
    fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(usize, &Arc<Session>) -> bool,
    {
        for (idx, session) in self.sessions.iter().enumerate() {
            if !f(idx, session) {
                break;
            }
        }
    }

    fn lookup(&self, id: &str) -> Option<usize> {
        let mut found = None;
        self.for_each(|idx, session| {
            if session.id() == id {
                found = Some(idx);
                return false;
            }
            true
        });
        found
    }

    fn get(&self, idx: usize) -> Option<&Arc<Session>> {
        self.sessions.get(idx)
    }

    fn append(&mut self, session: Arc<Session>) {
        self.sessions.push(session);
    }

    fn remove_at(&mut self, idx: usize) -> Option<Arc<Session>> {
        (idx < self.sessions.len()).then(|| self.sessions.remove(idx))
    }

    fn len(&self) -> usize {
        self.sessions.len()
    }
}

/// Settings that can change after construction.
#[derive(Debug, Clone, Copy)]
struct Timing {
    cache_lifetime: Duration,
    gc_interval: Duration,
}

/// Owns the active sessions and keeps them in sync with the backing store.
pub struct SessionRegistry {
    active: Mutex<ActiveSet>,
    timing: RwLock<Timing>,
    config: RegistryConfig,
    resolver: CookieResolver,
    store: Arc<dyn PersistentStore>,
    codec: Arc<Codec>,
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("config", &self.config)
            .field("timing", &*self.timing.read())
            .finish_non_exhaustive()
    }
}

impl SessionRegistry {
    /// Create a registry over a backing store.
    pub fn new(config: RegistryConfig, store: Arc<dyn PersistentStore>) -> Result<Self> {
        if !is_cookie_token(&config.cookie_name) {
            return Err(Error::Config(format!(
                "cookie name '{}' is not a valid cookie token",
                config.cookie_name
            )));
        }
        if config.sid_length == 0 {
            return Err(Error::Config("session id length must be positive".to_string()));
        }

        Ok(Self {
            active: Mutex::new(ActiveSet::default()),
            timing: RwLock::new(Timing {
                cache_lifetime: config.cache_lifetime,
                gc_interval: config.gc_interval,
            }),
            resolver: CookieResolver::new(config.cookie_name.clone()),
            config,
            store,
            codec: Arc::new(Codec::new()),
        })
    }

    /// Use a shared codec, e.g. one with record types already registered.
    pub fn with_codec(mut self, codec: Arc<Codec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn codec(&self) -> &Arc<Codec> {
        &self.codec
    }

    pub fn store(&self) -> &Arc<dyn PersistentStore> {
        &self.store
    }

    pub fn cookie_name(&self) -> &str {
        self.resolver.cookie_name()
    }

    pub fn cache_lifetime(&self) -> Duration {
        self.timing.read().cache_lifetime
    }

    pub fn gc_interval(&self) -> Duration {
        self.timing.read().gc_interval
    }

    /// Bind a request to its session, loading or creating it as needed.
    ///
    /// The session id comes from the request cookie or form; when neither
    /// carries one, a fresh id is minted. The session cookie is added to the
    /// request headers and returned for the response.
    pub async fn start(&self, parts: &mut Parts, form: Option<&[u8]>) -> Result<Started> {
        let sid = match self.resolver.resolve(parts, form)? {
            Some(sid) => sid,
            None => generate_sid(self.config.sid_length),
        };

        let (session, created) = match self.lookup_and_touch(&sid).await {
            Some(session) => {
                debug!(session_id = %sid, "Session cache hit");
                (session, false)
            }
            None => {
                debug!(session_id = %sid, "Session cache miss, loading from store");
                let (loaded, created) = self.load(&sid)?;

                let mut active = self.active.lock().await;
                match active.lookup(&sid).and_then(|idx| active.get(idx)).cloned() {
                    // Another request loaded the same id while we were unlocked.
                    Some(existing) => {
                        existing.touch();
                        (existing, false)
                    }
                    None => {
                        let session = Arc::new(loaded);
                        active.append(session.clone());
                        debug!(
                            session_id = %sid,
                            created,
                            active = active.len(),
                            "Session added to registry"
                        );
                        (session, created)
                    }
                }
            }
        };

        let cookie = SessionCookie::new(
            self.resolver.cookie_name(),
            session.id(),
            self.config.cookie_max_age,
        );
        cookie.mirror_onto(parts)?;

        Ok(Started {
            session,
            cookie,
            created,
        })
    }

    async fn lookup_and_touch(&self, sid: &str) -> Option<Arc<Session>> {
        let active = self.active.lock().await;
        let session = active.lookup(sid).and_then(|idx| active.get(idx))?;
        session.touch();
        Some(session.clone())
    }

    /// Read a session row, inserting an empty one when it does not exist.
    fn load(&self, sid: &str) -> Result<(Session, bool)> {
        match self.store.read(sid)? {
            Some(blob) => {
                let values = self.codec.decode(&blob)?;
                Ok((Session::restore(sid, values), false))
            }
            None => {
                let blob = self.codec.encode(&SessionValues::new())?;
                let now = Utc::now().timestamp();
                self.store.insert_if_absent(sid, &blob, now, now)?;
                Ok((Session::new(sid), true))
            }
        }
    }

    /// Write a session's data to the backing store.
    ///
    /// A row removed by garbage collection while the session was cached is
    /// recreated rather than silently dropped.
    fn persist(&self, session: &Session, now: DateTime<Utc>) -> Result<()> {
        session.persist_and_evict(|values| {
            let blob = self.codec.encode(values)?;
            let updated = now.timestamp();

            if !self.store.update(session.id(), &blob, updated)? {
                debug!(session_id = %session.id(), "Session row missing, reinserting");
                self.store.insert_if_absent(
                    session.id(),
                    &blob,
                    session.created_at().timestamp(),
                    updated,
                )?;
            }
            Ok(())
        })
    }

    /// Persist and evict sessions idle for longer than the cache lifetime.
    pub async fn flush(&self) -> FlushReport {
        self.flush_at(Utc::now()).await
    }

    /// [`flush`](Self::flush) with an explicit current time.
    pub async fn flush_at(&self, now: DateTime<Utc>) -> FlushReport {
        let cutoff = before(now, self.cache_lifetime());
        self.sweep(now, |session| session.last_active() < cutoff)
            .await
    }

    /// Persist and evict every active session. Used at shutdown.
    pub async fn flush_all(&self) -> FlushReport {
        self.sweep(Utc::now(), |_| true).await
    }

    async fn sweep<F>(&self, now: DateTime<Utc>, is_idle: F) -> FlushReport
    where
        F: Fn(&Session) -> bool,
    {
        let mut active = self.active.lock().await;
        let mut report = FlushReport::default();

        let mut idle = Vec::new();
        active.for_each(|idx, session| {
            if is_idle(session.as_ref()) {
                idle.push(idx);
            } else {
                report.retained += 1;
            }
            true
        });

        // Highest index first so earlier indices stay valid.
        for idx in idle.into_iter().rev() {
            let Some(session) = active.get(idx).cloned() else {
                continue;
            };
            match self.persist(&session, now) {
                Ok(()) => {
                    active.remove_at(idx);
                    report.persisted += 1;
                    debug!(session_id = %session.id(), "Session flushed and evicted");
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        session_id = %session.id(),
                        error = %e,
                        "Failed to persist session, keeping it cached"
                    );
                }
            }
        }

        if report.persisted > 0 || report.failed > 0 {
            info!(
                persisted = report.persisted,
                retained = report.retained,
                failed = report.failed,
                "Session flush complete"
            );
        }
        report
    }

    /// Delete persisted rows not written within the maximum age.
    ///
    /// Runs against the store only; cached sessions are not consulted.
    pub fn garbage_collect(&self) -> Result<usize> {
        self.garbage_collect_at(Utc::now())
    }

    /// [`garbage_collect`](Self::garbage_collect) with an explicit current time.
    pub fn garbage_collect_at(&self, now: DateTime<Utc>) -> Result<usize> {
        let cutoff = before(now, self.config.max_age).timestamp();
        let deleted = self.store.delete_older_than(cutoff)?;
        if deleted > 0 {
            info!(deleted, cutoff, "Expired session rows deleted");
        }
        Ok(deleted)
    }

    /// Apply schedule settings and start the flush and GC schedules.
    ///
    /// `cache_seconds` is applied when positive; `gc_interval_hours` when it
    /// lies strictly between 0 and 720. Other values leave the previous
    /// setting in place. Each call starts a new pair of schedules; stop the
    /// previous pair first when reconfiguring.
    pub fn configure_gc(self: &Arc<Self>, cache_seconds: i64, gc_interval_hours: i64) -> Schedules {
        {
            let mut timing = self.timing.write();
            if cache_seconds > 0 {
                timing.cache_lifetime = Duration::from_secs(cache_seconds.unsigned_abs());
            } else {
                debug!(cache_seconds, "Ignoring non-positive cache lifetime");
            }
            if valid_gc_interval_hours(gc_interval_hours) {
                timing.gc_interval = Duration::from_secs(gc_interval_hours.unsigned_abs() * 3600);
            } else {
                debug!(gc_interval_hours, "Ignoring out-of-range GC interval");
            }
        }

        let period_registry = self.clone();
        let tick_registry = self.clone();
        let flush = RecurringTask::spawn(
            "session-flush",
            move || period_registry.cache_lifetime(),
            move || {
                let registry = tick_registry.clone();
                async move {
                    registry.flush().await;
                }
            },
        );

        let period_registry = self.clone();
        let tick_registry = self.clone();
        let gc = RecurringTask::spawn(
            "session-gc",
            move || period_registry.gc_interval(),
            move || {
                let registry = tick_registry.clone();
                async move {
                    if let Err(e) = registry.garbage_collect() {
                        warn!(error = %e, "Session garbage collection failed");
                    }
                }
            },
        );

        Schedules { flush, gc }
    }

    /// Find an active session without refreshing it.
    pub async fn lookup(&self, id: &str) -> Option<Arc<Session>> {
        let active = self.active.lock().await;
        active.lookup(id).and_then(|idx| active.get(idx)).cloned()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.active.lock().await.lookup(id).is_some()
    }

    /// Number of active sessions.
    pub async fn len(&self) -> usize {
        self.active.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Ids of all active sessions, in insertion order.
    pub async fn active_ids(&self) -> Vec<String> {
        let active = self.active.lock().await;
        let mut ids = Vec::with_capacity(active.len());
        active.for_each(|_, session| {
            ids.push(session.id().to_string());
            true
        });
        ids
    }
}

/// `now - d`, saturating at the earliest representable time.
fn before(now: DateTime<Utc>, d: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(d)
        .ok()
        .and_then(|d| now.checked_sub_signed(d))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
