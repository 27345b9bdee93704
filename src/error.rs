//! Error handling for camhub.

use std::time::Duration;

use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum HubError {
    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parsing errors
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Streamability probe errors
    #[error("Probe error: {0}")]
    Probe(#[from] ProbeError),

    /// Mount table errors
    #[error("Mount error: {0}")]
    Mount(#[from] MountError),

    /// Generic application errors
    #[error("Application error: {0}")]
    App(String),
}

/// Application result type
pub type HubResult<T> = std::result::Result<T, HubError>;

/// Outcome of a failed streamability probe. Neither variant is fatal: the
/// device is simply not streamable for this pass.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("no frame from {device_path} within {timeout:?}")]
    Timeout {
        device_path: String,
        timeout: Duration,
    },
    #[error("{device_path} failed to stream: {reason}")]
    Failed { device_path: String, reason: String },
}

/// Hardware identity could not be read for a slot. Callers fall back to
/// positional naming.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("identity lookup failed for {device_path}: {reason}")]
pub struct IdentityLookupFailure {
    pub device_path: String,
    pub reason: String,
}

/// Errors raised by the stream lifecycle manager.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MountError {
    /// A mount for this name already exists.
    #[error("mount /{name} already exists")]
    Duplicate { name: String },

    /// The pipeline factory could not build or start a pipeline.
    #[error("failed to create mount /{name}: {reason}")]
    Creation { name: String, reason: String },

    /// No mount exists for this name.
    #[error("no mount for /{name}")]
    Unknown { name: String },
}

impl MountError {
    /// Duplicate adds and unknown removes mean the registry and the mount
    /// table have diverged.
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Self::Duplicate { .. } | Self::Unknown { .. })
    }
}
