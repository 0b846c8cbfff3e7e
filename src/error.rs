use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Stable classification surfaced to callers regardless of the HTTP status
/// that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    MissingCredential,
    AuthError,
    Forbidden,
    NotFound,
    RateLimited,
    NetworkUnreachable,
    UpstreamServerError,
    ValidationError,
    PartialSuccess,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::MissingCredential => "MISSING_CREDENTIAL",
            ErrorKind::AuthError => "AUTH_ERROR",
            ErrorKind::Forbidden => "FORBIDDEN",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::RateLimited => "RATE_LIMITED",
            ErrorKind::NetworkUnreachable => "NETWORK_UNREACHABLE",
            ErrorKind::UpstreamServerError => "UPSTREAM_SERVER_ERROR",
            ErrorKind::ValidationError => "VALIDATION_ERROR",
            ErrorKind::PartialSuccess => "PARTIAL_SUCCESS",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced by the integration layer.
///
/// Upstream failures are classified once, in the transport client, and carry
/// the upstream message text verbatim when one was provided.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("missing credential: {0}")]
    MissingCredential(&'static str),

    #[error("authentication failed: {message}")]
    Auth { status: u16, message: String },

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("network unreachable: {0}")]
    Network(String),

    #[error("upstream server error ({status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("validation error: {0}")]
    Validation(String),
}

impl SyncError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Classify a non-success HTTP status and the upstream message.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            // 203 is the sign-in page served to an unauthenticated PAT.
            203 | 401 => Self::Auth { status, message },
            403 => Self::Forbidden(message),
            404 => Self::NotFound(message),
            429 => Self::RateLimited(message),
            500..=599 => Self::Upstream { status, message },
            _ => Self::Validation(message),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::MissingCredential(_) => ErrorKind::MissingCredential,
            SyncError::Auth { .. } => ErrorKind::AuthError,
            SyncError::Forbidden(_) => ErrorKind::Forbidden,
            SyncError::NotFound(_) => ErrorKind::NotFound,
            SyncError::RateLimited(_) => ErrorKind::RateLimited,
            SyncError::Network(_) => ErrorKind::NetworkUnreachable,
            SyncError::Upstream { .. } => ErrorKind::UpstreamServerError,
            SyncError::Validation(_) => ErrorKind::ValidationError,
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
