//! Note record.
//!
//! # Invariants
//! - `id` is empty before creation and immutable once the store assigns it.
//! - Updates are full overwrites, so callers always pass the complete record.
//! - Wire field names (`noteTitle`, `noteDesc`, `userId`) are shared with other
//!   clients of the same store and must not change.

use super::{require_non_empty, ValidationError};
use serde::{Deserialize, Serialize};

/// Wire name of the owner field, used for store-side filtering.
pub const NOTE_OWNER_FIELD: &str = "userId";

/// One personal text note.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    pub note_title: String,
    pub note_desc: String,
    pub user_id: String,
}

impl Note {
    /// Builds a note that has not been stored yet.
    pub fn new(
        note_title: impl Into<String>,
        note_desc: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            id: String::new(),
            note_title: note_title.into(),
            note_desc: note_desc.into(),
            user_id: user_id.into(),
        }
    }

    /// Returns a copy carrying the store-assigned id.
    pub fn with_id(&self, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..self.clone()
        }
    }

    /// Checks the fields every stored note must carry.
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty("noteTitle", &self.note_title)?;
        require_non_empty("noteDesc", &self.note_desc)?;
        require_non_empty(NOTE_OWNER_FIELD, &self.user_id)
    }

    /// Like [`Note::validate`], and also requires an assigned id.
    pub fn validate_persisted(&self) -> Result<(), ValidationError> {
        self.require_id()?;
        self.validate()
    }

    pub fn require_id(&self) -> Result<(), ValidationError> {
        if self.id.is_empty() {
            return Err(ValidationError::MissingId);
        }
        Ok(())
    }

    /// Case-insensitive substring match over title and description.
    pub fn matches_text(&self, query: &str) -> bool {
        let needle = query.to_lowercase();
        self.note_title.to_lowercase().contains(&needle)
            || self.note_desc.to_lowercase().contains(&needle)
    }
}
