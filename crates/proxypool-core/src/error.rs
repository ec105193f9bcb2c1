//! Error types for the proxy pool
//!
//! The variants follow the failure classes the pool distinguishes at runtime:
//! transport failures and upstream rejections (both end one fetch or bind
//! attempt), persistence failures (end one descriptor of a batch) and
//! configuration failures (stop one provider from starting).

use thiserror::Error;

/// Result type alias for proxy pool operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the proxy pool
#[derive(Error, Debug)]
pub enum Error {
    /// A fetch or bind call could not complete
    #[error("Transport error ({source_name}): {message}")]
    Transport {
        /// Provider source name
        source_name: String,
        /// Error message
        message: String,
    },

    /// A well-formed upstream response carried a non-success status
    #[error("Upstream rejected request ({source_name}): {message}")]
    UpstreamRejection {
        /// Provider source name
        source_name: String,
        /// Message returned by the upstream
        message: String,
    },

    /// A store upsert or delete failed
    #[error("Persistence error ({store}): {message}")]
    Persistence {
        /// Store that failed ("record_store" or "expiry_index")
        store: &'static str,
        /// Error message
        message: String,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a transport error
    pub fn transport(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Create an upstream rejection error
    pub fn upstream_rejection(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UpstreamRejection {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Create a persistence error
    pub fn persistence(store: &'static str, message: impl Into<String>) -> Self {
        Self::Persistence {
            store,
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Whether this error ended a fetch or bind attempt (as opposed to a store
    /// or configuration problem)
    pub fn is_upstream(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::UpstreamRejection { .. })
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
