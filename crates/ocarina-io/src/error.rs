#![forbid(unsafe_code)]

use thiserror::Error;

/// Centralized error type for ocarina-io.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Unsupported protocol: {0}")]
    ProtocolNotSupported(String),

    #[error("Timeout")]
    Timeout,

    #[error("Interrupted")]
    Interrupted,

    #[error("HTTP {status} for URL: {url}")]
    HttpStatus { status: u16, url: String },

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid range: {0}")]
    InvalidRange(String),
}

impl SourceError {
    /// Creates an HTTP status error.
    pub fn http_status(status: u16, url: String) -> Self {
        Self::HttpStatus { status, url }
    }

    /// Creates an HTTP error from a reqwest error, preserving timeouts.
    pub fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else {
            Self::Http(error.to_string())
        }
    }

    /// Checks if this error is considered retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            SourceError::Timeout => true,
            SourceError::HttpStatus { status, .. } => {
                // Retry on 5xx server errors, 429 Too Many Requests, 408 Request Timeout
                *status >= 500 || *status == 429 || *status == 408
            }
            SourceError::Http(msg) => {
                msg.contains("timeout") || msg.contains("connection") || msg.contains("network")
            }
            SourceError::ProtocolNotSupported(_)
            | SourceError::Interrupted
            | SourceError::Io(_)
            | SourceError::InvalidRange(_) => false,
        }
    }

    /// Checks if this error indicates a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, SourceError::Timeout)
    }

    /// Checks if this error indicates cooperative cancellation.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, SourceError::Interrupted)
    }

    /// Gets the HTTP status code if this is an HTTP status error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            SourceError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(error: reqwest::Error) -> Self {
        Self::from_reqwest(error)
    }
}

pub type SourceResult<T> = Result<T, SourceError>;
