//! Error types for the changes-feed client.

use thiserror::Error;

/// Error for invalid HTTP header configuration.
#[derive(Debug, Clone, Error)]
pub enum InvalidHeaderError {
    #[error("invalid header name: {0}")]
    InvalidName(String),
    #[error("invalid header value: {0}")]
    InvalidValue(String),
}

/// Error for invalid feed configuration.
///
/// Surfaced synchronously from [`configure`](crate::ChangesFeed::configure);
/// the loop never starts with an invalid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("batch size must be at least 1")]
    ZeroBatchSize,

    #[error("max changes must be at least 1 when set")]
    ZeroMaxChanges,

    #[error("feed is running; stop it before reconfiguring")]
    Running,
}

/// Main error type for feed operations.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("bad request: {reason}")]
    BadRequest { reason: String },

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("not found: {path}")]
    NotFound { path: String },

    #[error("rate limited")]
    RateLimited,

    #[error("server error: {status} - {reason}")]
    ServerError { status: u16, reason: String },

    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),

    #[error("timeout")]
    Timeout,

    #[error("undecodable response body: {0}")]
    Json(String),
}

impl FeedError {
    /// Create error from a non-success HTTP status code.
    ///
    /// `reason` is the server-supplied reason string, when one could be
    /// decoded from the response body.
    pub fn from_status(status: u16, path: &str, reason: Option<String>) -> Self {
        match status {
            400 => FeedError::BadRequest {
                reason: reason.unwrap_or_else(|| "bad request".to_string()),
            },
            401 => FeedError::Unauthorized,
            403 => FeedError::Forbidden,
            404 => FeedError::NotFound {
                path: path.to_string(),
            },
            429 => FeedError::RateLimited,
            _ => FeedError::ServerError {
                status,
                reason: reason.unwrap_or_else(|| format!("status {}", status)),
            },
        }
    }

    /// HTTP status code if the failure came from the server
    pub fn status_code(&self) -> Option<u16> {
        match self {
            FeedError::BadRequest { .. } => Some(400),
            FeedError::Unauthorized => Some(401),
            FeedError::Forbidden => Some(403),
            FeedError::NotFound { .. } => Some(404),
            FeedError::RateLimited => Some(429),
            FeedError::ServerError { status, .. } => Some(*status),
            FeedError::Network(_) | FeedError::Timeout | FeedError::Json(_) => None,
        }
    }

    /// Whether the loop keeps polling after this failure.
    ///
    /// Transient: status 429, any status >= 500, or no status at all
    /// (network, timeout, undecodable body). Everything else in [400, 500)
    /// is fatal - the position cannot become valid by retrying.
    pub fn is_transient(&self) -> bool {
        match self.status_code() {
            Some(429) => true,
            Some(status) if (400..500).contains(&status) => false,
            _ => true,
        }
    }
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FeedError::Timeout
        } else if err.is_decode() {
            FeedError::Json(err.to_string())
        } else {
            FeedError::Network(err)
        }
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::Json(err.to_string())
    }
}

/// Failure detail carried by an `error` event.
///
/// A cloneable snapshot of a [`FeedError`]: the status code when the failure
/// came from the server, and a human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedFailure {
    /// HTTP status code, absent for network/parse-level failures
    pub status: Option<u16>,
    /// Server-supplied or client-derived reason string
    pub reason: Option<String>,
}

impl From<&FeedError> for FeedFailure {
    fn from(err: &FeedError) -> Self {
        FeedFailure {
            status: err.status_code(),
            reason: Some(err.to_string()),
        }
    }
}
