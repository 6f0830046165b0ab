//! Server-side session cache backed by a durable store.
//!
//! This crate keeps the working set of HTTP sessions in memory and provides:
//! - Cookie-based session resolution with a form-field fallback
//! - Per-session locking so concurrent requests on one session never lose updates
//! - Periodic flushing of idle sessions to a [`PersistentStore`]
//! - Age-based garbage collection of persisted rows
//!
//! # Example
//!
//! ```rust,ignore
//! use msm_session::{InMemoryStore, RegistryConfig, SessionRegistry};
//!
//! let registry = Arc::new(SessionRegistry::new(
//!     RegistryConfig::for_app("shop"),
//!     Arc::new(InMemoryStore::new()),
//! )?);
//! let schedules = registry.configure_gc(120, 1);
//!
//! let started = registry.start(&mut parts, None).await?;
//! started.session.with_lock(|values| {
//!     let visits = values.get(&Key::from("visits")).and_then(Value::as_int).unwrap_or(0);
//!     values.insert(Key::from("visits"), Value::Int(visits + 1));
//! });
//! ```

mod codec;
mod config;
mod error;
mod registry;
mod resolver;
mod schedule;
mod session;
mod store;
mod value;

pub use codec::{Codec, CodecError};
pub use config::{
    DEFAULT_CACHE_LIFETIME, DEFAULT_GC_INTERVAL, DEFAULT_MAX_AGE, DEFAULT_SID_LENGTH,
    MAX_GC_INTERVAL_HOURS, RegistryConfig, is_cookie_token, valid_gc_interval_hours,
};
pub use error::{Error, Result};
pub use registry::{FlushReport, Schedules, SessionRegistry, Started};
pub use resolver::{CookieResolver, SessionCookie, generate_sid};
pub use schedule::RecurringTask;
pub use session::Session;
pub use store::{InMemoryStore, PersistentStore, StoredRow};
pub use value::{Key, Record, SessionValues, Value};
