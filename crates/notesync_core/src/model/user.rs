//! User account record.
//!
//! Usernames are unique only on a best-effort basis; see
//! `UserRepository::register_user_unique`. Passwords are stored as given.

use super::{require_non_empty, ValidationError};
use serde::{Deserialize, Serialize};

/// Registered account. `id` is empty until the store assigns one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    pub id: String,
    pub username: String,
    pub password: String,
}

impl User {
    /// Builds an unregistered user (empty id).
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            username: username.into(),
            password: password.into(),
        }
    }

    /// Returns a copy carrying the store-assigned id.
    pub fn with_id(&self, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..self.clone()
        }
    }

    /// Checks required credential fields.
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty("username", &self.username)?;
        require_non_empty("password", &self.password)
    }

    /// Exact, case-sensitive credential comparison.
    pub fn password_matches(&self, password: &str) -> bool {
        self.password == password
    }
}
