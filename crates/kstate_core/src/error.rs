//! Core error types for kstate.

use std::fmt;

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// State model initialization failed
    StateInit {
        /// What was missing or malformed
        reason: String,
    },

    /// Trace not found in the experiment
    TraceNotFound {
        /// Id that failed to resolve
        trace_id: u32,
    },

    /// The underlying trace read broke mid-stream
    SourceFailure {
        /// Source-reported reason
        reason: String,
    },

    /// Internal error (for unexpected conditions)
    Internal {
        /// Error message
        message: String,
    },
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StateInit { reason } => write!(f, "State initialization failed: {}", reason),
            Self::TraceNotFound { trace_id } => write!(f, "Trace not found: {}", trace_id),
            Self::SourceFailure { reason } => write!(f, "Trace source failure: {}", reason),
            Self::Internal { message } => write!(f, "Internal error: {}", message),
        }
    }
}

impl std::error::Error for CoreError {}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal {
            message: err.to_string(),
        }
    }
}
