use std::fmt::{self, Display};

/// The kind of error that occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The provider answered with a non-success status.
    Status,
    /// The response body is not valid JSON, or misses expected fields.
    MalformedBody,
    /// The request never got a response (connection, TLS, DNS...).
    Transport,
    /// The model provider is rate limited.
    RateLimitExceeded,
    /// Any other errors.
    Other,
}

impl ErrorKind {
    /// Maps a non-success HTTP status to an error kind.
    #[inline]
    pub fn from_status(status: u16) -> Self {
        if status == 429 {
            ErrorKind::RateLimitExceeded
        } else {
            ErrorKind::Status
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Status => write!(f, "Bad status"),
            ErrorKind::MalformedBody => write!(f, "Malformed body"),
            ErrorKind::Transport => write!(f, "Transport error"),
            ErrorKind::RateLimitExceeded => write!(f, "Rate limit exceeded"),
            ErrorKind::Other => write!(f, "Provider error"),
        }
    }
}
