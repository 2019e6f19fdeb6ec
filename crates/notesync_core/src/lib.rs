//! Core data-synchronization layer for the notes app.
//! UI shells talk to [`NoteViewModel`]; everything below it is replaceable.

pub mod bootstrap;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod store;
pub mod viewmodel;

pub use bootstrap::{open_session, BootstrapError};
pub use config::{ConfigError, CoreConfig, StoreEndpoint};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::note::Note;
pub use model::user::User;
pub use model::ValidationError;
pub use repo::live::LiveQuery;
pub use repo::note_repo::NoteRepository;
pub use repo::user_repo::UserRepository;
pub use repo::{RepoError, RepoResult, StoreRepository};
pub use store::{
    open_store, MemoryStore, Query, RemoteStore, SqliteStore, StoreError, StoreRecord,
    StoreResult, Subscription,
};
pub use viewmodel::live::LiveValue;
pub use viewmodel::{NoteViewModel, PendingWrite, ViewModelError, ViewModelOptions};

/// Minimal health-check API for shell integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
