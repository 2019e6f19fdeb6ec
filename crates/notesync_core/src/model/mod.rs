//! Domain records owned by the note-taking core.
//!
//! # Responsibility
//! - Define the user and note records exchanged with UI callers.
//! - Provide core-side validation applied before every store write.
//!
//! # Invariants
//! - A note always belongs to exactly one `user_id`.
//! - Ids are assigned by the store and never change afterwards.
//! - Records carry no store wire details beyond their serde field names.

pub mod note;
pub mod user;

use std::error::Error;
use std::fmt::{Display, Formatter};

/// Validation failure for a domain record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required text field is empty.
    EmptyField(&'static str),
    /// Operation needs a store-assigned id but the record has none.
    MissingId,
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyField(field) => write!(f, "field `{field}` must not be empty"),
            Self::MissingId => write!(f, "record has no store-assigned id"),
        }
    }
}

impl Error for ValidationError {}

pub(crate) fn require_non_empty(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::EmptyField(field));
    }
    Ok(())
}
