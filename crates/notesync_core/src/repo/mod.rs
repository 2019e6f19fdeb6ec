//! Repository layer over the remote document store.
//!
//! # Responsibility
//! - Translate user/note use cases into store operations.
//! - Keep the store wire format (JSON documents, collection names) internal.
//!
//! # Invariants
//! - Every write validates its record before touching the store.
//! - Record keys are the source of truth for ids, whatever the body says.
//! - Not-found is an absent value, never an error.

pub mod live;
pub mod note_repo;
pub mod user_repo;

use crate::model::ValidationError;
use crate::store::{RemoteStore, StoreError, StoreRecord};
use log::warn;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

pub const USERS_COLLECTION: &str = "users";
pub const NOTES_COLLECTION: &str = "notes";

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for user and note use cases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoError {
    Validation(ValidationError),
    Store(StoreError),
    /// Registration refused because the username is already in use.
    UsernameTaken(String),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
            Self::UsernameTaken(username) => write!(f, "username already taken: {username}"),
            Self::InvalidData(message) => write!(f, "invalid stored document: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Store(err) => Some(err),
            Self::UsernameTaken(_) | Self::InvalidData(_) => None,
        }
    }
}

impl From<ValidationError> for RepoError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<StoreError> for RepoError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Repository backed by any [`RemoteStore`].
///
/// Owns the `users` and `notes` collections; implements both
/// [`user_repo::UserRepository`] and [`note_repo::NoteRepository`].
#[derive(Clone)]
pub struct StoreRepository {
    store: Arc<dyn RemoteStore>,
}

impl StoreRepository {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn RemoteStore> {
        &self.store
    }
}

/// Records that carry their store key inside the document body.
pub(crate) trait Keyed {
    fn set_key(&mut self, key: &str);
}

pub(crate) fn encode<T: Serialize>(value: &T) -> RepoResult<Value> {
    serde_json::to_value(value).map_err(|err| RepoError::Store(err.into()))
}

pub(crate) fn decode<T: DeserializeOwned + Keyed>(record: &StoreRecord) -> RepoResult<T> {
    let mut value: T = serde_json::from_value(record.body.clone())
        .map_err(|err| RepoError::InvalidData(format!("record `{}`: {err}", record.id)))?;
    value.set_key(&record.id);
    Ok(value)
}

/// Decodes a snapshot, skipping documents that do not parse.
pub(crate) fn decode_all<T: DeserializeOwned + Keyed>(
    collection: &str,
    records: &[StoreRecord],
) -> Vec<T> {
    records
        .iter()
        .filter_map(|record| match decode(record) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(
                    "event=decode_skip module=repo status=error collection={collection} error={err}"
                );
                None
            }
        })
        .collect()
}
