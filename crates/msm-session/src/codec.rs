//! Codec for session data.
//!
//! Blobs are JSON written through serde: a format version plus the map as a
//! sequence of `[key, value]` pairs, so integer keys keep their type. Keys
//! and values are externally tagged (`{"Int": 3}`, `{"Str": "a"}`), which
//! keeps every blob self-describing. Entries are written in key order, so
//! equal maps always produce equal blobs.
//!
//! Every concrete value type has to be registered with the codec before it
//! can be encoded or decoded. Built-in kinds are registered when the codec is
//! created; record types are registered by name with
//! [`Codec::register_record`]. Values are checked against the registry
//! before encoding and again after decoding.

use std::collections::HashSet;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::value::{Key, SessionValues, Value};

/// Current blob format version.
const FORMAT_VERSION: u8 = 1;

/// Maximum nesting of lists, maps and records.
///
/// Kept well inside serde_json's own recursion limit so anything that
/// encodes also decodes.
const MAX_DEPTH: usize = 32;

/// Kinds registered on every new codec.
const BUILTIN_KINDS: &[&str] = &[
    "nil", "bool", "int", "float", "string", "bytes", "list", "map",
];

/// Errors raised while encoding or decoding session data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// A value type was used before being registered with the codec.
    #[error("type '{0}' is not registered with the codec")]
    Unregistered(String),

    /// The blob was written by an unsupported format version.
    #[error("unsupported format version {0}")]
    UnsupportedVersion(u8),

    /// Values were nested deeper than the codec accepts.
    #[error("nesting deeper than {} levels", MAX_DEPTH)]
    TooDeep,

    /// The blob is truncated or is not session data.
    #[error("malformed session data: {0}")]
    Malformed(String),
}

type CodecResult<T> = std::result::Result<T, CodecError>;

#[derive(Serialize)]
struct BlobRef<'a> {
    version: u8,
    entries: Vec<(&'a Key, &'a Value)>,
}

#[derive(Deserialize)]
struct Blob {
    version: u8,
    entries: Vec<(Key, Value)>,
}

/// Encoder/decoder for [`SessionValues`] with a type registry.
#[derive(Debug)]
pub struct Codec {
    registered: RwLock<HashSet<String>>,
}

impl Default for Codec {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec {
    /// Create a codec with the built-in kinds registered.
    pub fn new() -> Self {
        let registered = BUILTIN_KINDS.iter().map(|k| k.to_string()).collect();
        Self {
            registered: RwLock::new(registered),
        }
    }

    /// Register a record type so that values of it can be persisted.
    ///
    /// Registering the same name twice is harmless.
    pub fn register_record(&self, type_name: impl Into<String>) {
        self.registered.write().insert(type_name.into());
    }

    /// Whether a type name is known to this codec.
    pub fn is_registered(&self, type_name: &str) -> bool {
        self.registered.read().contains(type_name)
    }

    /// Serialize session data into a blob.
    pub fn encode(&self, data: &SessionValues) -> CodecResult<Vec<u8>> {
        let mut entries: Vec<(&Key, &Value)> = data.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));

        {
            let registered = self.registered.read();
            for (_, value) in &entries {
                check(value, 0, &registered)?;
            }
        }

        serde_json::to_vec(&BlobRef {
            version: FORMAT_VERSION,
            entries,
        })
        .map_err(|e| CodecError::Malformed(e.to_string()))
    }

    /// Deserialize a blob produced by [`Codec::encode`].
    ///
    /// An empty blob decodes to an empty map.
    pub fn decode(&self, blob: &[u8]) -> CodecResult<SessionValues> {
        if blob.is_empty() {
            return Ok(SessionValues::new());
        }

        let blob: Blob =
            serde_json::from_slice(blob).map_err(|e| CodecError::Malformed(e.to_string()))?;
        if blob.version != FORMAT_VERSION {
            return Err(CodecError::UnsupportedVersion(blob.version));
        }

        let registered = self.registered.read();
        for (_, value) in &blob.entries {
            check(value, 0, &registered)?;
        }
        Ok(blob.entries.into_iter().collect())
    }
}

/// Walk `value`, rejecting unregistered kinds and excessive nesting.
fn check(value: &Value, depth: usize, registered: &HashSet<String>) -> CodecResult<()> {
    if depth > MAX_DEPTH {
        return Err(CodecError::TooDeep);
    }
    if !registered.contains(value.kind()) {
        return Err(CodecError::Unregistered(value.kind().to_string()));
    }

    match value {
        Value::List(items) => items
            .iter()
            .try_for_each(|item| check(item, depth + 1, registered)),
        Value::Map(map) => map
            .values()
            .try_for_each(|item| check(item, depth + 1, registered)),
        Value::Record(record) => record
            .fields
            .values()
            .try_for_each(|item| check(item, depth + 1, registered)),
        _ => Ok(()),
    }
}
