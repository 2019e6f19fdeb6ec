//! One-call startup for host shells.

use crate::config::{ConfigError, CoreConfig};
use crate::logging::{init_logging, LoggingError};
use crate::repo::StoreRepository;
use crate::store::{open_store, StoreError};
use crate::viewmodel::{NoteViewModel, ViewModelOptions};
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use tokio::runtime::Handle;

#[derive(Debug)]
pub enum BootstrapError {
    Config(ConfigError),
    Logging(LoggingError),
    Store(StoreError),
}

impl Display for BootstrapError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(err) => write!(f, "{err}"),
            Self::Logging(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for BootstrapError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Logging(err) => Some(err),
            Self::Store(err) => Some(err),
        }
    }
}

impl From<ConfigError> for BootstrapError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<LoggingError> for BootstrapError {
    fn from(value: LoggingError) -> Self {
        Self::Logging(value)
    }
}

impl From<StoreError> for BootstrapError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Starts logging (when `log_dir` is set), opens the configured store and
/// returns a ready view-model running on `runtime`.
pub fn open_session(
    config: &CoreConfig,
    runtime: Handle,
) -> Result<NoteViewModel<StoreRepository>, BootstrapError> {
    if let Some(log_dir) = config.log_dir.as_deref() {
        init_logging(&config.log_level, log_dir)?;
    }
    let endpoint = config.endpoint()?;
    let store = open_store(&endpoint)?;
    info!("event=session_open module=core status=ok endpoint_kind={}", endpoint_kind(&config.store_url));

    Ok(NoteViewModel::new(
        Arc::new(StoreRepository::new(store)),
        runtime,
        ViewModelOptions::from(config),
    ))
}

fn endpoint_kind(url: &str) -> &str {
    url.split(':').next().unwrap_or("unknown")
}
