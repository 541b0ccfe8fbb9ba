//! # Sync Configuration
//!
//! Configuration for the sync layer: where the local database lives and how
//! to reach the remote API.
//!
//! ## Sources (later wins)
//! 1. Built-in defaults (a localhost server, clerk `1`)
//! 2. TOML config file (`sync.toml` in the platform config dir)
//! 3. Environment variables (`SARI_API_URL`, `SARI_CLERK_ID`, ...)
//!
//! ## Example Config File
//! ```toml
//! database_path = "/var/lib/sari-pos/sari_pos.db"
//!
//! [api]
//! base_url = "https://pos.example.ph/api"
//! clerk_id = "7"
//! timeout_secs = 10
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Default Values
// =============================================================================

fn default_database_path() -> PathBuf {
    PathBuf::from("sari_pos.db")
}

fn default_base_url() -> String {
    "http://localhost:3000/api".to_string()
}

fn default_clerk_id() -> String {
    "1".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

// =============================================================================
// Configuration Structures
// =============================================================================

/// Top-level sync configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncConfig {
    /// Path to the local SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Remote API settings.
    #[serde(default)]
    pub api: ApiSettings,
}

/// Settings for the remote POS API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiSettings {
    /// Base URL of the API, e.g. `http://localhost:3000/api`.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Clerk identifier sent with every request.
    ///
    /// The server reads it from the `X-User-ID` header to attribute
    /// transactions to the person behind the counter.
    #[serde(default = "default_clerk_id")]
    pub clerk_id: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            api: ApiSettings::default(),
        }
    }
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            clerk_id: default_clerk_id(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

// =============================================================================
// Loading and Saving
// =============================================================================

impl SyncConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration: defaults, then the TOML file (if present), then
    /// environment overrides, then validation.
    ///
    /// With `path: None` the platform config dir is used
    /// (`sync.toml` under the OS-specific location, overridable via
    /// `SARI_CONFIG_PATH`). A missing file is not an error.
    pub fn load(path: Option<PathBuf>) -> SyncResult<Self> {
        let config_path = match path {
            Some(p) => p,
            None => Self::default_config_path()?,
        };

        let mut config = if config_path.exists() {
            debug!(path = %config_path.display(), "Loading sync config");
            Self::from_file(&config_path)?
        } else {
            debug!(path = %config_path.display(), "No config file, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration, falling back to defaults on any failure.
    pub fn load_or_default(path: Option<PathBuf>) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("Failed to load sync config, using defaults: {}", e);
                Self::default()
            }
        }
    }

    /// Reads and parses a TOML config file. No env overrides are applied.
    pub fn from_file(path: &Path) -> SyncResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Saves the configuration as pretty TOML.
    ///
    /// With `path: None` the platform config dir is used; parent directories
    /// are created as needed.
    pub fn save(&self, path: Option<PathBuf>) -> SyncResult<()> {
        let config_path = match path {
            Some(p) => p,
            None => Self::default_config_path()?,
        };

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, contents)
            .map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;
        debug!(path = %config_path.display(), "Saved sync config");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.api.base_url.trim().is_empty() {
            return Err(SyncError::Config("api.base_url must not be empty".into()));
        }
        let url = Url::parse(&self.api.base_url)?;
        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(SyncError::Config(format!(
                    "api.base_url scheme must be http or https, got '{}'",
                    other
                )));
            }
        }
        if self.api.timeout_secs == 0 {
            return Err(SyncError::Config(
                "api.timeout_secs must be at least 1".into(),
            ));
        }
        if self.api.clerk_id.trim().is_empty() {
            return Err(SyncError::Config("api.clerk_id must not be empty".into()));
        }
        if self.database_path.as_os_str().is_empty() {
            return Err(SyncError::Config("database_path must not be empty".into()));
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("SARI_API_URL") {
            self.api.base_url = url;
        }
        if let Ok(clerk) = std::env::var("SARI_CLERK_ID") {
            self.api.clerk_id = clerk;
        }
        if let Ok(timeout) = std::env::var("SARI_API_TIMEOUT_SECS") {
            match timeout.parse() {
                Ok(secs) => self.api.timeout_secs = secs,
                Err(_) => warn!(
                    value = %timeout,
                    "Ignoring unparseable SARI_API_TIMEOUT_SECS"
                ),
            }
        }
        if let Ok(db) = std::env::var("SARI_DB_PATH") {
            self.database_path = PathBuf::from(db);
        }
    }

    fn default_config_path() -> SyncResult<PathBuf> {
        if let Ok(path) = std::env::var("SARI_CONFIG_PATH") {
            return Ok(PathBuf::from(path));
        }
        let dirs = directories::ProjectDirs::from("ph", "sari", "pos").ok_or_else(|| {
            SyncError::ConfigLoadFailed("Could not determine config directory".into())
        })?;
        Ok(dirs.config_dir().join("sync.toml"))
    }
}

// =============================================================================
// Accessors
// =============================================================================

impl ApiSettings {
    /// Parses the configured base URL.
    pub fn base_url(&self) -> SyncResult<Url> {
        Ok(Url::parse(&self.base_url)?)
    }

    /// Per-request timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
