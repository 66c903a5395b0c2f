use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a run. Everything per-file is reported through
/// [`RequestError`] and converted into a degraded result instead.
#[derive(Error, Debug)]
pub enum RecastError {
    #[error("Configuration error: {0}")]
    FatalConfig(String),

    #[error("Failed to resolve source '{source_ref}': {reason}")]
    Resolution { source_ref: String, reason: String },

    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to load configuration: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Server error on {addr}: {reason}")]
    Server { addr: String, reason: String },
}

impl RecastError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RecastError::Io { path: path.into(), source }
    }

    pub fn resolution(source_ref: impl Into<String>, reason: impl Into<String>) -> Self {
        RecastError::Resolution {
            source_ref: source_ref.into(),
            reason: reason.into(),
        }
    }
}

/// Classified outcome of a call through the rate-limited client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("rate limit still exceeded after {attempts} attempts")]
    RateLimitExceeded { attempts: u32 },

    #[error("model '{model}' is unavailable: {detail}")]
    ModelUnavailable { model: String, detail: String },

    #[error("request failed after {attempts} attempts: {detail}")]
    RequestFailed { attempts: u32, detail: String },
}

/// Failure classes reported by an inference backend for a single attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("request rejected: {0}")]
    Rejected(String),
}

pub type Result<T> = std::result::Result<T, RecastError>;
