//! Error taxonomy for the replication pipeline.

use std::time::Duration;

/// Errors raised while assembling a [`crate::config::ReplicaConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required configuration value: {0}")]
    Missing(&'static str),

    #[error("invalid repository slug '{0}': expected owner/name")]
    InvalidRepoSlug(String),

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Errors returned by a [`crate::forge::Forge`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum ForgeError {
    #[error("unauthorized (401): {0}")]
    Unauthorized(String),

    #[error("forbidden (403): {0}")]
    Forbidden(String),

    #[error("not found (404): {0}")]
    NotFound(String),

    #[error("rate limited ({status}): {message}")]
    RateLimited { status: u16, message: String },

    #[error("unexpected HTTP status {status}: {message}")]
    Http { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl ForgeError {
    /// Classify a non-success HTTP status. `rate_limited` is set when the
    /// service signalled an exhausted quota alongside a 403/429.
    pub fn from_status(status: u16, message: impl Into<String>, rate_limited: bool) -> Self {
        let message = message.into();
        match status {
            401 => ForgeError::Unauthorized(message),
            403 if rate_limited => ForgeError::RateLimited { status, message },
            429 => ForgeError::RateLimited { status, message },
            403 => ForgeError::Forbidden(message),
            404 => ForgeError::NotFound(message),
            _ => ForgeError::Http { status, message },
        }
    }

    /// HTTP status carried by this error, when there is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ForgeError::Unauthorized(_) => Some(401),
            ForgeError::Forbidden(_) => Some(403),
            ForgeError::NotFound(_) => Some(404),
            ForgeError::RateLimited { status, .. } | ForgeError::Http { status, .. } => {
                Some(*status)
            }
            ForgeError::Transport(_) | ForgeError::Decode(_) => None,
        }
    }
}

/// Errors from invoking the version-control (or archive) executable.
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {}: {stderr}", .code.map_or_else(|| "signal".to_string(), |c| format!("code {c}")))]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("`{command}` timed out after {}s", .timeout.as_secs())]
    TimedOut { command: String, timeout: Duration },

    #[error("unexpected output from `{command}`: {detail}")]
    UnexpectedOutput { command: String, detail: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl GitError {
    /// Whether the remote refused a push because the destination moved on
    /// (non-fast-forward and friends).
    pub fn is_push_rejection(&self) -> bool {
        match self {
            GitError::Failed { stderr, .. } => {
                let stderr = stderr.to_ascii_lowercase();
                stderr.contains("non-fast-forward")
                    || stderr.contains("[rejected]")
                    || stderr.contains("fetch first")
                    || stderr.contains("updates were rejected")
            }
            _ => false,
        }
    }
}

/// Top-level pipeline errors.
#[derive(Debug, thiserror::Error)]
pub enum ReplicaError {
    #[error("forge error while {context}: {source}")]
    Forge {
        context: String,
        #[source]
        source: ForgeError,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ReplicaError {
    pub fn forge(context: impl Into<String>, source: ForgeError) -> Self {
        ReplicaError::Forge {
            context: context.into(),
            source,
        }
    }
}

/// Result type for forge calls.
pub type ForgeResult<T> = std::result::Result<T, ForgeError>;

/// Result type for git invocations.
pub type GitResult<T> = std::result::Result<T, GitError>;

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, ReplicaError>;
