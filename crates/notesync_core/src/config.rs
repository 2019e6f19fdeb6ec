//! Core configuration passed in by the host shell.
//!
//! # Responsibility
//! - Carry the store endpoint and logging settings chosen at startup.
//! - Parse endpoint strings into a typed `StoreEndpoint`.
//!
//! # Invariants
//! - No endpoint is compiled in; the default is the in-process store.

use crate::logging::default_log_level;
use serde::Deserialize;
use std::env;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

/// Environment variable names read by [`CoreConfig::from_env`].
pub mod env_vars {
    pub const STORE_URL: &str = "NOTESYNC_STORE_URL";
    pub const LOG_LEVEL: &str = "NOTESYNC_LOG_LEVEL";
    pub const LOG_DIR: &str = "NOTESYNC_LOG_DIR";
    pub const UNIQUE_USERNAMES: &str = "NOTESYNC_UNIQUE_USERNAMES";
}

pub const DEFAULT_STORE_URL: &str = "memory://";

/// Configuration loading error.
#[derive(Debug)]
pub enum ConfigError {
    /// Endpoint string has an empty or malformed shape.
    InvalidEndpoint(String),
    /// A boolean setting is neither true/false/1/0.
    InvalidFlag { name: &'static str, value: String },
    /// JSON config could not be parsed.
    Json(serde_json::Error),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidEndpoint(value) => write!(f, "invalid store endpoint `{value}`"),
            Self::InvalidFlag { name, value } => {
                write!(f, "invalid value `{value}` for {name}; expected true|false")
            }
            Self::Json(err) => write!(f, "invalid config json: {err}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

/// Where the document store lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEndpoint {
    /// `memory://` in-process store.
    Memory,
    /// `sqlite::memory:` private SQLite database.
    SqliteMemory,
    /// `sqlite://<path>` SQLite database file.
    SqliteFile(PathBuf),
    /// `http(s)://…` hosted realtime database (no bundled backend).
    Remote(String),
}

impl StoreEndpoint {
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        let trimmed = value.trim();
        if trimmed == "memory://" {
            return Ok(Self::Memory);
        }
        if trimmed == "sqlite::memory:" {
            return Ok(Self::SqliteMemory);
        }
        if let Some(path) = trimmed.strip_prefix("sqlite://") {
            if path.is_empty() {
                return Err(ConfigError::InvalidEndpoint(trimmed.to_string()));
            }
            return Ok(Self::SqliteFile(PathBuf::from(path)));
        }
        if trimmed.starts_with("https://") || trimmed.starts_with("http://") {
            return Ok(Self::Remote(trimmed.to_string()));
        }
        Err(ConfigError::InvalidEndpoint(trimmed.to_string()))
    }
}

/// Startup configuration for the core.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Store endpoint string, see [`StoreEndpoint::parse`].
    pub store_url: String,
    /// One of `trace|debug|info|warn|error`.
    pub log_level: String,
    /// Absolute log directory; logging stays off when unset.
    pub log_dir: Option<String>,
    /// Reject registrations whose username already exists.
    pub enforce_unique_usernames: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            store_url: DEFAULT_STORE_URL.to_string(),
            log_level: default_log_level().to_string(),
            log_dir: None,
            enforce_unique_usernames: true,
        }
    }
}

impl CoreConfig {
    /// Parses a JSON config document; missing keys take defaults.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Builds config from `NOTESYNC_*` environment variables over defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(url) = lookup(env_vars::STORE_URL) {
            config.store_url = url;
        }
        if let Some(level) = lookup(env_vars::LOG_LEVEL) {
            config.log_level = level;
        }
        if let Some(dir) = lookup(env_vars::LOG_DIR).filter(|dir| !dir.trim().is_empty()) {
            config.log_dir = Some(dir);
        }
        if let Some(flag) = lookup(env_vars::UNIQUE_USERNAMES) {
            config.enforce_unique_usernames = parse_flag(env_vars::UNIQUE_USERNAMES, &flag)?;
        }
        Ok(config)
    }

    /// Parsed form of `store_url`.
    pub fn endpoint(&self) -> Result<StoreEndpoint, ConfigError> {
        StoreEndpoint::parse(&self.store_url)
    }
}

fn parse_flag(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidFlag {
            name,
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::{env_vars, ConfigError, CoreConfig, StoreEndpoint};
    use std::collections::HashMap;
    use std::path::PathBuf;

    #[test]
    fn parse_endpoint_recognizes_supported_schemes() {
        assert_eq!(StoreEndpoint::parse("memory://").unwrap(), StoreEndpoint::Memory);
        assert_eq!(
            StoreEndpoint::parse("sqlite::memory:").unwrap(),
            StoreEndpoint::SqliteMemory
        );
        assert_eq!(
            StoreEndpoint::parse(" sqlite:///tmp/notes.db ").unwrap(),
            StoreEndpoint::SqliteFile(PathBuf::from("/tmp/notes.db"))
        );
        assert!(matches!(
            StoreEndpoint::parse("https://example.firebaseio.com/").unwrap(),
            StoreEndpoint::Remote(_)
        ));
        assert!(matches!(
            StoreEndpoint::parse("sqlite://"),
            Err(ConfigError::InvalidEndpoint(_))
        ));
        assert!(StoreEndpoint::parse("ftp://x").is_err());
    }

    #[test]
    fn json_config_fills_missing_keys_with_defaults() {
        let config = CoreConfig::from_json_str(r#"{"store_url":"sqlite::memory:"}"#).unwrap();
        assert_eq!(config.endpoint().unwrap(), StoreEndpoint::SqliteMemory);
        assert!(config.enforce_unique_usernames);
        assert!(config.log_dir.is_none());
    }

    #[test]
    fn lookup_overrides_defaults_and_rejects_bad_flags() {
        let vars = HashMap::from([
            (env_vars::STORE_URL, "sqlite::memory:".to_string()),
            (env_vars::UNIQUE_USERNAMES, "false".to_string()),
        ]);
        let config = CoreConfig::from_lookup(|name| vars.get(name).cloned()).unwrap();
        assert_eq!(config.store_url, "sqlite::memory:");
        assert!(!config.enforce_unique_usernames);

        let bad = HashMap::from([(env_vars::UNIQUE_USERNAMES, "maybe".to_string())]);
        let err = CoreConfig::from_lookup(|name| bad.get(name).cloned()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidFlag { .. }));
    }
}
