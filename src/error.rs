use thiserror::Error;

/// Failures that stop a scan or ping before (or instead of) producing a report.
///
/// Per-port connection failures are not errors: they are closed `ProbeOutcome`s.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("could not resolve host '{host}': {reason}")]
    HostResolution { host: String, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl ScanError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ScanError::Cancelled)
    }

    /// Stable code for log fields.
    pub fn code(&self) -> &'static str {
        match self {
            ScanError::HostResolution { .. } => "HOST_RESOLUTION",
            ScanError::InvalidConfiguration(_) => "INVALID_CONFIGURATION",
            ScanError::Cancelled => "CANCELLED",
        }
    }
}
