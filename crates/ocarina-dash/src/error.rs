#![forbid(unsafe_code)]

use ocarina_io::SourceError;
use thiserror::Error;

/// Adaptive-core errors.
#[derive(Debug, Error)]
pub enum DashError {
    /// No segment at the requested position. Not fatal; the caller should
    /// wait for the next reload or more data.
    #[error("Not available")]
    NotAvailable,

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Timeout")]
    Timeout,

    #[error("Interrupted")]
    Interrupted,

    #[error("Unsupported protocol: {0}")]
    ProtocolNotSupported(String),

    #[error("Source error: {0}")]
    Source(SourceError),
}

impl DashError {
    pub fn is_interrupted(&self) -> bool {
        matches!(self, DashError::Interrupted)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, DashError::Timeout)
    }
}

impl From<SourceError> for DashError {
    fn from(error: SourceError) -> Self {
        // Cancellation and deadline failures keep their identity across the
        // layer boundary; everything else is a transport error.
        match error {
            SourceError::Timeout => DashError::Timeout,
            SourceError::Interrupted => DashError::Interrupted,
            SourceError::ProtocolNotSupported(scheme) => DashError::ProtocolNotSupported(scheme),
            other => DashError::Source(other),
        }
    }
}

pub type DashResult<T> = Result<T, DashError>;
