//! Shared helper functions used across CLI subcommands.
//!
//! Includes tracing initialization, configuration loading and wiring of the
//! auth session.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use leave_portal_auth::{
    AuthClient, AuthConfig, AuthSession, HttpProfileClient, LogNavigator, SessionStore,
};
use leave_portal_store::SqliteStore;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Configuration file picked up from the working directory when `--config`
/// is not given.
pub const DEFAULT_CONFIG_FILE: &str = "leave-portal.toml";

/// Session database file name inside the data directory.
pub const SESSION_DB_FILE: &str = "session.db";

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Initialize the tracing subscriber with the given default log level.
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Load the auth configuration: file, then `LEAVE_PORTAL_*` overrides, then
/// validation.
pub fn load_config(explicit: Option<&Path>) -> Result<AuthConfig> {
    let mut config = read_config_file(explicit, Path::new(DEFAULT_CONFIG_FILE))?;
    config.apply_env_overrides();
    config.validate().context("invalid auth configuration")?;
    Ok(config)
}

/// An explicit path must exist; the fallback path is optional.
fn read_config_file(explicit: Option<&Path>, fallback: &Path) -> Result<AuthConfig> {
    match explicit {
        Some(path) => AuthConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None if fallback.exists() => AuthConfig::from_file(fallback)
            .with_context(|| format!("failed to load config from {}", fallback.display())),
        None => {
            info!("no config file found, using defaults");
            Ok(AuthConfig::default())
        }
    }
}

// ---------------------------------------------------------------------------
// Session wiring
// ---------------------------------------------------------------------------

pub fn session_db_path(data_dir: &Path) -> PathBuf {
    data_dir.join(SESSION_DB_FILE)
}

/// Open the on-disk session store, creating the data directory if needed.
pub fn open_session_store(data_dir: &Path) -> Result<SessionStore> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;
    let path = session_db_path(data_dir);
    let store = SqliteStore::open(&path)
        .with_context(|| format!("failed to open session database {}", path.display()))?;
    Ok(SessionStore::new(Arc::new(store)))
}

/// Build the auth session used by every subcommand.
pub fn build_session(config: AuthConfig, store: SessionStore) -> Result<AuthSession> {
    let client = AuthClient::with_http_exchanger(config, store)
        .context("failed to create auth client")?;
    let profile = HttpProfileClient::new(client.endpoints().user_contexts.clone());
    Ok(AuthSession::new(
        Arc::new(client),
        Arc::new(profile),
        Arc::new(LogNavigator),
    ))
}
