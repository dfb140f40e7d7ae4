//! Network-related error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum NetworkError {
    #[error("connection timeout to {url}")]
    Timeout { url: String },

    #[error("connection to {url} failed: {message}")]
    ConnectionFailed { url: String, message: String },

    #[error("HTTP error {status} from {url}")]
    HttpError { status: u16, url: String },

    #[error("not found: {url}")]
    NotFound { url: String },

    #[error("forbidden: {url}")]
    Forbidden { url: String },

    #[error("unauthorized: {url}")]
    Unauthorized { url: String },

    #[error("rate limited by {url}")]
    RateLimited { url: String },

    #[error("malformed response from {url}: {message}")]
    MalformedResponse { url: String, message: String },

    #[error("checksum mismatch for {url}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        url: String,
        expected: String,
        actual: String,
    },

    #[error("invalid remote configuration: {message}")]
    InvalidRemote { message: String },

    #[error("{} download(s) failed: {}", .failures.len(), .failures.join("; "))]
    BatchFailed { failures: Vec<String> },
}

impl NetworkError {
    /// Classify an HTTP status code into an error for `url`
    #[must_use]
    pub fn from_status(status: u16, url: impl Into<String>) -> Self {
        let url = url.into();
        match status {
            401 => Self::Unauthorized { url },
            403 => Self::Forbidden { url },
            404 => Self::NotFound { url },
            429 => Self::RateLimited { url },
            _ => Self::HttpError { status, url },
        }
    }
}

impl UserFacingError for NetworkError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::Timeout { .. } | Self::ConnectionFailed { .. } => {
                Some("Check your network connection and remote URL, then retry.")
            }
            Self::NotFound { .. } => Some("The remote does not have this artifact."),
            Self::Forbidden { .. } | Self::Unauthorized { .. } => {
                Some("Check the permissions configured for this remote.")
            }
            Self::ChecksumMismatch { .. } => {
                Some("Remove the cached entry and download it again.")
            }
            Self::BatchFailed { .. } => {
                Some("Downloads are idempotent; re-run the command to fetch the remaining packages.")
            }
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::ConnectionFailed { .. } | Self::RateLimited { .. } => {
                true
            }
            Self::HttpError { status, .. } => *status >= 500,
            _ => false,
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::Timeout { .. } => "network.timeout",
            Self::ConnectionFailed { .. } => "network.connection_failed",
            Self::HttpError { .. } => "network.http_error",
            Self::NotFound { .. } => "network.not_found",
            Self::Forbidden { .. } => "network.forbidden",
            Self::Unauthorized { .. } => "network.unauthorized",
            Self::RateLimited { .. } => "network.rate_limited",
            Self::MalformedResponse { .. } => "network.malformed_response",
            Self::ChecksumMismatch { .. } => "network.checksum_mismatch",
            Self::InvalidRemote { .. } => "network.invalid_remote",
            Self::BatchFailed { .. } => "network.batch_failed",
        };
        Some(code)
    }
}
