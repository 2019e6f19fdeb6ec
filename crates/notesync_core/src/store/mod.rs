//! Remote document store contract and bundled backends.
//!
//! # Responsibility
//! - Define the path-addressed document operations the repository builds on.
//! - Deliver live query results through cancellable subscriptions.
//!
//! # Invariants
//! - Collections are flat maps from generated id to one JSON document.
//! - Subscription events always carry the complete matching set, never a diff.
//! - Transport failures reach listeners as error events instead of silence.
//! - Snapshots list records in ascending key order.

mod hub;
pub mod memory;
pub mod sqlite;

use crate::config::StoreEndpoint;
use crate::db::DbError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

pub use hub::Subscription;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

static PATH_SEGMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("valid path segment regex"));

pub type StoreResult<T> = Result<T, StoreError>;

/// One event delivered to a subscription.
pub type SnapshotEvent = StoreResult<Vec<StoreRecord>>;

/// Store-layer error. `Clone` so one failure can fan out to every listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Store is unreachable or the connection dropped.
    Transport(String),
    /// Collection or field name is not a valid path segment.
    InvalidPath(String),
    /// Document could not be encoded or decoded.
    Serialization(String),
    /// Backend-specific failure (e.g. SQLite).
    Backend(String),
    /// Endpoint scheme has no bundled backend.
    UnsupportedEndpoint(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(message) => write!(f, "store unreachable: {message}"),
            Self::InvalidPath(path) => write!(f, "invalid store path segment `{path}`"),
            Self::Serialization(message) => write!(f, "document serialization failed: {message}"),
            Self::Backend(message) => write!(f, "store backend error: {message}"),
            Self::UnsupportedEndpoint(endpoint) => {
                write!(f, "no store backend for endpoint `{endpoint}`")
            }
        }
    }
}

impl Error for StoreError {}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Backend(value.to_string())
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Backend(value.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value.to_string())
    }
}

/// A stored document together with its key.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreRecord {
    pub id: String,
    pub body: Value,
}

/// Record selection for reads and subscriptions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Query {
    /// Records whose top-level string `field` equals `value`.
    Equals { field: String, value: String },
    /// The single record stored under this id (zero or one result).
    Record(String),
}

impl Query {
    pub fn equals(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Equals {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn record(id: impl Into<String>) -> Self {
        Self::Record(id.into())
    }

    /// Whether a document stored at `id` belongs to this query's result.
    pub fn matches(&self, id: &str, body: &Value) -> bool {
        match self {
            Self::Equals { field, value } => {
                body.get(field.as_str()).and_then(Value::as_str) == Some(value.as_str())
            }
            Self::Record(record_id) => record_id == id,
        }
    }

    /// Whether a mutation replacing `before` by `after` at `id` can change
    /// this query's result.
    pub(crate) fn touched_by(&self, id: &str, before: Option<&Value>, after: Option<&Value>) -> bool {
        match self {
            Self::Record(record_id) => record_id == id,
            Self::Equals { .. } => {
                before.is_some_and(|body| self.matches(id, body))
                    || after.is_some_and(|body| self.matches(id, body))
            }
        }
    }

    fn validate(&self) -> StoreResult<()> {
        match self {
            Self::Equals { field, .. } => validate_segment(field),
            Self::Record(id) => validate_segment(id),
        }
    }
}

/// Minimal interface over a remote document collection store.
///
/// Implementations must serialize each mutation with the notifications it
/// triggers, so a listener never receives an older snapshot after a newer one.
pub trait RemoteStore: Send + Sync {
    /// Produces a unique, time-ordered key without writing anything.
    fn generate_id(&self, collection: &str) -> StoreResult<String>;
    /// Upserts the whole document at `id`.
    fn write(&self, collection: &str, id: &str, body: Value) -> StoreResult<()>;
    /// Deletes the document at `id`; absent ids are not an error.
    fn remove(&self, collection: &str, id: &str) -> StoreResult<()>;
    /// Returns the current matching records once.
    fn read_once(&self, collection: &str, query: &Query) -> StoreResult<Vec<StoreRecord>>;
    /// Registers a live listener; the first event is the current matching set.
    fn subscribe(&self, collection: &str, query: &Query) -> StoreResult<Subscription>;
}

/// Opens the backend selected by a configured endpoint.
pub fn open_store(endpoint: &StoreEndpoint) -> StoreResult<Arc<dyn RemoteStore>> {
    match endpoint {
        StoreEndpoint::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreEndpoint::SqliteMemory => Ok(Arc::new(SqliteStore::open_in_memory()?)),
        StoreEndpoint::SqliteFile(path) => Ok(Arc::new(SqliteStore::open(path)?)),
        StoreEndpoint::Remote(url) => Err(StoreError::UnsupportedEndpoint(url.clone())),
    }
}

pub(crate) fn validate_segment(segment: &str) -> StoreResult<()> {
    if PATH_SEGMENT_RE.is_match(segment) {
        Ok(())
    } else {
        Err(StoreError::InvalidPath(segment.to_string()))
    }
}

pub(crate) fn validate_request(collection: &str, query: &Query) -> StoreResult<()> {
    validate_segment(collection)?;
    query.validate()
}

pub(crate) fn new_record_id() -> String {
    uuid::Uuid::now_v7().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::{validate_segment, Query, StoreError};
    use serde_json::json;

    #[test]
    fn equals_query_matches_only_string_field_values() {
        let query = Query::equals("userId", "u1");
        assert!(query.matches("a", &json!({"userId": "u1"})));
        assert!(!query.matches("a", &json!({"userId": "u2"})));
        assert!(!query.matches("a", &json!({"userId": 1})));
        assert!(!query.matches("a", &json!({})));
    }

    #[test]
    fn equals_query_is_touched_when_record_leaves_the_set() {
        let query = Query::equals("userId", "u1");
        let before = json!({"userId": "u1"});
        let after = json!({"userId": "u2"});
        assert!(query.touched_by("a", Some(&before), Some(&after)));
        assert!(query.touched_by("a", Some(&before), None));
        assert!(!query.touched_by("a", Some(&after), Some(&after)));
    }

    #[test]
    fn path_segments_reject_nesting_and_empty_values() {
        assert!(validate_segment("notes").is_ok());
        assert_eq!(
            validate_segment("notes/abc"),
            Err(StoreError::InvalidPath("notes/abc".to_string()))
        );
        assert!(validate_segment("").is_err());
    }
}
