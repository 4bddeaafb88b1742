use std::fmt::{self, Display};

use crate::conversation::ConversationError;
use crate::harness::HarnessError;
use crate::model_client::GatewayError;
use crate::retrieval::RetrievalError;

/// The kind of fatal session error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A required input is missing or empty.
    InvalidInput,
    /// The sandbox or the test runner is broken. Never a failing test.
    Infrastructure,
    /// The model provider call failed.
    Provider,
    /// A feedback reply has no code block.
    Extraction,
    /// No best-practice excerpt could be retrieved.
    BestPractices,
    /// The session was cancelled between attempts.
    Cancelled,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::InvalidInput => write!(f, "Invalid input"),
            ErrorKind::Infrastructure => write!(f, "Test harness error"),
            ErrorKind::Provider => write!(f, "Model provider error"),
            ErrorKind::Extraction => write!(f, "No code in the model reply"),
            ErrorKind::BestPractices => {
                write!(f, "Failed to fetch best practices")
            }
            ErrorKind::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Describes why a session stopped without a verdict.
#[derive(Clone, Debug, PartialEq, Eq, Hash, thiserror::Error)]
#[error("{kind}: {reason}")]
pub struct Error {
    kind: ErrorKind,
    reason: String,
}

impl Error {
    /// Creates a new error with the `InvalidInput` kind.
    #[inline]
    pub fn invalid_input<S: Into<String>>(reason: S) -> Self {
        Self::new(ErrorKind::InvalidInput, reason)
    }

    /// Creates a new error with the `Extraction` kind.
    #[inline]
    pub fn extraction<S: Into<String>>(reason: S) -> Self {
        Self::new(ErrorKind::Extraction, reason)
    }

    /// Creates a new error with the `Cancelled` kind.
    #[inline]
    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "the session was cancelled")
    }

    #[inline]
    fn new<S: Into<String>>(kind: ErrorKind, reason: S) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }

    /// Returns the kind of the error.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the reason for the error.
    #[inline]
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl From<ConversationError> for Error {
    fn from(err: ConversationError) -> Self {
        Self::new(ErrorKind::InvalidInput, err.to_string())
    }
}

impl From<GatewayError> for Error {
    fn from(err: GatewayError) -> Self {
        Self::new(ErrorKind::Provider, err.to_string())
    }
}

impl From<HarnessError> for Error {
    fn from(err: HarnessError) -> Self {
        Self::new(ErrorKind::Infrastructure, err.to_string())
    }
}

impl From<RetrievalError> for Error {
    fn from(err: RetrievalError) -> Self {
        Self::new(ErrorKind::BestPractices, err.to_string())
    }
}
