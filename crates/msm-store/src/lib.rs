//! SQLite implementation of the session backing store.
//!
//! Sessions live in a single `msm_session` table keyed by session id. The
//! `updated` column drives garbage collection and is indexed.

mod error;
mod sqlite;

pub use error::{Result, StoreError};
pub use sqlite::{SCHEMA_VERSION, SqliteStore};
