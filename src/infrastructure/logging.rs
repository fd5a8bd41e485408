use crate::infrastructure::error::InfraError;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub const CLIENT_LOG: &str = "client.log";

/// `RUST_LOG` wins over the configured level; an unparseable level falls
/// back to `info`.
pub fn env_filter(configured_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(configured_level.trim()))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

pub fn log_path(logs_dir: &Path) -> PathBuf {
    logs_dir.join(CLIENT_LOG)
}

/// Installs the global subscriber: readable lines on stderr plus JSON lines
/// appended to `logs/client.log`.
pub fn init_logging(logs_dir: &Path, configured_level: &str) -> Result<(), InfraError> {
    fs::create_dir_all(logs_dir)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path(logs_dir))?;

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_current_span(false)
        .with_writer(Mutex::new(file));

    tracing_subscriber::registry()
        .with(env_filter(configured_level))
        .with(stderr_layer)
        .with(json_layer)
        .try_init()
        .map_err(|error| InfraError::InvalidConfig(format!("logging already initialised: {error}")))
}
