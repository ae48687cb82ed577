//! Error types for the offline cache.
//!
//! A single error enum covers storage, network and configuration failures so
//! that the proxy can decide per variant whether a failure reaches the client.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the offline cache library.
#[derive(Debug, Error)]
pub enum OfflineError {
    // Network errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        /// Optional cause description
        cause: Option<String>,
    },

    // Database errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid URL {url}: {message}")]
    InvalidUrl { url: String, message: String },

    // Lifecycle errors
    #[error("Seeding cache {cache} failed at {url}: {message}")]
    SeedFailed {
        cache: String,
        url: String,
        message: String,
    },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for offline cache operations.
pub type Result<T> = std::result::Result<T, OfflineError>;

impl From<std::io::Error> for OfflineError {
    fn from(err: std::io::Error) -> Self {
        OfflineError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for OfflineError {
    fn from(err: serde_json::Error) -> Self {
        OfflineError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for OfflineError {
    fn from(err: rusqlite::Error) -> Self {
        OfflineError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for OfflineError {
    fn from(err: reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            "request timed out".to_string()
        } else if err.is_connect() {
            "connection failed".to_string()
        } else {
            "request failed".to_string()
        };
        OfflineError::Network {
            message,
            cause: Some(err.to_string()),
        }
    }
}

impl From<url::ParseError> for OfflineError {
    fn from(err: url::ParseError) -> Self {
        OfflineError::InvalidUrl {
            url: String::new(),
            message: err.to_string(),
        }
    }
}

impl OfflineError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        OfflineError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Create a network error from a plain message.
    pub fn network(message: impl Into<String>) -> Self {
        OfflineError::Network {
            message: message.into(),
            cause: None,
        }
    }

    /// Prefix a network error's cause with what was being attempted.
    pub fn with_context(self, context: impl std::fmt::Display) -> Self {
        match self {
            OfflineError::Network { message, cause } => OfflineError::Network {
                message,
                cause: Some(match cause {
                    Some(cause) => format!("{}: {}", context, cause),
                    None => context.to_string(),
                }),
            },
            other => other,
        }
    }

    /// Whether this error came from the network rather than from local state.
    pub fn is_network(&self) -> bool {
        matches!(self, OfflineError::Network { .. })
    }
}
