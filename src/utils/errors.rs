use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for azcc
#[derive(Error, Debug)]
pub enum AzccError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Rate limited: {message}")]
    RateLimit {
        message: String,
        /// Server-suggested wait before the next attempt
        retry_after: Option<Duration>,
    },

    #[error("Request rejected: {0}")]
    InvalidRequest(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Response stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Path error: {path}: {reason}")]
    Path { path: PathBuf, reason: String },

    #[error("IO error: {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AzccError {
    pub fn path(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Path {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the retry policy may attempt the request again
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Backend(_) | Self::RateLimit { .. })
    }

    /// Process exit code reported by the CLI for this error kind
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Auth(_) | Self::Config(_) => 2,
            Self::Backend(_)
            | Self::RateLimit { .. }
            | Self::InvalidRequest(_)
            | Self::StreamInterrupted(_) => 3,
            Self::Timeout(_) => 4,
            Self::Path { .. } | Self::Io { .. } => 5,
            Self::Serialization(_) => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, AzccError>;

/// Exit code for an error that reached `main`. The first `AzccError` in the
/// cause chain decides; anything else exits with 1.
pub fn exit_code_for(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<AzccError>())
        .map_or(1, AzccError::exit_code)
}
