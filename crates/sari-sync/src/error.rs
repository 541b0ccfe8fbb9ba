//! # Sync Error Types
//!
//! Error types for remote sync operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │   Transport     │  │   Remote API    │  │     Configuration       │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Http           │  │  Api{status,..} │  │  Config                 │ │
//! │  │  (DNS, connect, │  │  (non-2xx       │  │  InvalidUrl             │ │
//! │  │   TLS, timeout) │  │   responses)    │  │  ConfigLoad/SaveFailed  │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐                              │
//! │  │      Data       │  │     Storage     │                              │
//! │  │                 │  │                 │                              │
//! │  │  Serialization  │  │  Db (DbError)   │                              │
//! │  └─────────────────┘  └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The split that matters to callers is [`SyncError::is_retryable`]:
//! retryable failures leave the queue item pending for the next drain,
//! everything else needs a config or code fix before retrying helps.

use thiserror::Error;

use sari_db::DbError;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering all possible remote sync failures.
///
/// ## Design Principles
/// - Each variant includes enough context for debugging
/// - Errors are categorized for different handling strategies
/// - All errors are `Send + Sync` for async compatibility
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// The HTTP request never got a response: DNS, connect, TLS, timeout.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    // =========================================================================
    // Remote API Errors
    // =========================================================================
    /// The server answered with a non-success status.
    #[error("API error {status}: {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body, kept for the log line.
        body: String,
    },

    // =========================================================================
    // Data Errors
    // =========================================================================
    /// JSON (de)serialization of a wire body failed.
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    Config(String),

    /// The API base URL does not parse.
    #[error("Invalid API URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Failed to load the config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save the config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Storage Errors
    // =========================================================================
    /// Local store failure while reading or updating sync state.
    #[error("Local store error: {0}")]
    Db(#[from] DbError),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl SyncError {
    /// Builds an [`SyncError::Api`] from a response status and body.
    pub fn api(status: reqwest::StatusCode, body: impl Into<String>) -> Self {
        SyncError::Api {
            status: status.as_u16(),
            body: body.into(),
        }
    }

    /// Returns true if retrying the same call later can reasonably succeed.
    ///
    /// ## Retryable Errors
    /// - Transport failures (network down, server unreachable, timeout)
    /// - Server-side statuses: 5xx, 408 (request timeout), 429 (throttled)
    ///
    /// ## Non-Retryable Errors
    /// - Client-side API statuses (4xx): the payload or route is wrong
    /// - Configuration and serialization errors
    /// - Local store failures
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Http(_) => true,
            SyncError::Api { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            _ => false,
        }
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::Config(_)
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }
}
