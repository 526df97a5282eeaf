//! Error types for the routesync system
//!
//! Every failure a reconciliation cycle can hit is normalized into this
//! taxonomy so the engine can decide between backoff (transient) and
//! surfacing to the operator (permanent).

use thiserror::Error;

/// Result type alias for routesync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Whether a failure is worth retrying
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Retry eligible: network glitches, 5xx responses, disk pressure
    Transient,
    /// Not retried without operator intervention: bad credentials,
    /// malformed registry data, schema rejected by the proxy
    Permanent,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Transient => write!(f, "transient"),
            FailureKind::Permanent => write!(f, "permanent"),
        }
    }
}

/// Core error type for the routesync system
#[derive(Error, Debug)]
pub enum Error {
    /// Target discovery failed (registry unreachable, unauthorized, ...)
    #[error("discovery error ({kind}): {message}")]
    Discovery {
        /// Transient or permanent
        kind: FailureKind,
        /// Error message
        message: String,
    },

    /// The discovered route set cannot be rendered into a valid document
    #[error("validation error: {0}")]
    Validation(String),

    /// Applying the rendered document to the proxy failed
    #[error("write error ({kind}): {message}")]
    Write {
        /// Transient or permanent
        kind: FailureKind,
        /// Error message
        message: String,
    },

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a transient discovery error
    pub fn discovery_transient(msg: impl Into<String>) -> Self {
        Self::Discovery {
            kind: FailureKind::Transient,
            message: msg.into(),
        }
    }

    /// Create a permanent discovery error
    pub fn discovery_permanent(msg: impl Into<String>) -> Self {
        Self::Discovery {
            kind: FailureKind::Permanent,
            message: msg.into(),
        }
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a transient write error
    pub fn write_transient(msg: impl Into<String>) -> Self {
        Self::Write {
            kind: FailureKind::Transient,
            message: msg.into(),
        }
    }

    /// Create a permanent write error
    pub fn write_permanent(msg: impl Into<String>) -> Self {
        Self::Write {
            kind: FailureKind::Permanent,
            message: msg.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the loop should enter backoff and retry this failure.
    ///
    /// Validation errors count as transient: the registry state that
    /// produced the bad route set may self-correct on the next poll.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Discovery {
                kind: FailureKind::Transient,
                ..
            } | Error::Write {
                kind: FailureKind::Transient,
                ..
            } | Error::Validation(_)
        )
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(Error::discovery_transient("registry down").is_transient());
        assert!(Error::write_transient("disk full").is_transient());
        assert!(Error::validation("duplicate id").is_transient());

        assert!(!Error::discovery_permanent("bad token").is_transient());
        assert!(!Error::write_permanent("schema rejected").is_transient());
        assert!(!Error::config("missing endpoint").is_transient());
    }
}
