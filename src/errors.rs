//! Error types for the fetch cache
//!
//! This module defines the error taxonomy shared by the cache engine, the
//! transport layer, configuration loading and the CLI. Fetch errors are
//! `Clone` because a single fetch outcome is shared by every caller that
//! joined the same in-flight request.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while fetching and decoding an endpoint
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Network failure or non-2xx status
    #[error("{message}")]
    Transport {
        status: Option<u16>,
        message: String,
    },

    /// Response body was not valid JSON
    #[error("Failed to decode response body: {message}")]
    Decode { message: String },

    /// A fallible transform rejected the decoded payload
    #[error("Transform '{tag}' failed: {message}")]
    Transform { tag: String, message: String },

    /// The in-flight fetch was torn down before it settled
    #[error("Fetch was cancelled before it completed")]
    Cancelled,
}

impl FetchError {
    /// Transport error for a response that arrived with a non-2xx status
    pub fn http_status(status: u16) -> Self {
        Self::Transport {
            status: Some(status),
            message: format!("HTTP error! status: {}", status),
        }
    }

    /// Transport error for a request that never produced a response
    pub fn network(message: impl Into<String>) -> Self {
        Self::Transport {
            status: None,
            message: message.into(),
        }
    }

    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Transport { status, .. } => *status,
            _ => None,
        }
    }

    /// Whether the failure happened on the wire rather than while decoding
    pub fn is_transport(&self) -> bool {
        matches!(self, FetchError::Transport { .. })
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            FetchError::Transport { .. } => "transport",
            FetchError::Decode { .. } => "decode",
            FetchError::Transform { .. } => "transform",
            FetchError::Cancelled => "cancelled",
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(error: reqwest::Error) -> Self {
        FetchError::Transport {
            status: error.status().map(|s| s.as_u16()),
            message: error.to_string(),
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(error: serde_json::Error) -> Self {
        FetchError::Decode {
            message: error.to_string(),
        }
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    NotFound { path: PathBuf },

    /// Configuration file could not be read or written
    #[error("Failed to access configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration format
    #[error("Invalid configuration format in {path}: {source}")]
    InvalidFormat {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Configuration could not be rendered as TOML
    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    /// No user configuration directory on this platform
    #[error("Could not determine user config directory")]
    NoConfigDir,
}

/// Top-level application error that can represent any error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Fetch error
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Generic I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Generic application error with context
    #[error("Application error: {message}")]
    Generic { message: String },
}

impl AppError {
    /// Create a generic application error with a message
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// Get error category for logging and metrics
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Fetch(e) => e.category(),
            AppError::Config(_) => "config",
            AppError::Io(_) => "io",
            AppError::Generic { .. } => "generic",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

/// Fetch result type alias
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Configuration result type alias
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
