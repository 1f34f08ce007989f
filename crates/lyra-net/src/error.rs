use thiserror::Error;

/// What kind of bytes failed to parse.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParserErrorKind {
    MalformedContainer,
    MalformedManifest,
    UnsupportedContainer,
    UnsupportedManifest,
}

/// Failure of one load attempt.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("HTTP {status} for URL: {url}")]
    InvalidResponseCode { status: u16, url: String },
    #[error("parser error ({kind:?}): {message}")]
    Parser {
        kind: ParserErrorKind,
        message: String,
    },
    #[error("I/O error: {0}")]
    Io(String),
    #[error("Timeout")]
    Timeout,
    #[error("file not found")]
    FileNotFound,
    #[error("cleartext traffic not permitted")]
    CleartextNotPermitted,
    #[error("requested position is out of range")]
    PositionOutOfRange,
    #[error("unexpected loader error: {0}")]
    UnexpectedLoader(String),
}

impl LoadError {
    /// Creates an HTTP status error
    pub fn invalid_response_code(status: u16, url: impl Into<String>) -> Self {
        Self::InvalidResponseCode {
            status,
            url: url.into(),
        }
    }

    pub fn io<S: Into<String>>(msg: S) -> Self {
        Self::Io(msg.into())
    }

    pub fn malformed_container<S: Into<String>>(msg: S) -> Self {
        Self::Parser {
            kind: ParserErrorKind::MalformedContainer,
            message: msg.into(),
        }
    }

    /// Gets the HTTP status code if this is an HTTP status error
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::InvalidResponseCode { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_parse_error(&self) -> bool {
        matches!(self, Self::Parser { .. })
    }

    /// Whether repeating the same request can succeed.
    ///
    /// Parse errors recur on the same bytes and the other listed kinds are
    /// configuration or programming faults.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::Parser { .. }
                | Self::FileNotFound
                | Self::CleartextNotPermitted
                | Self::PositionOutOfRange
                | Self::UnexpectedLoader(_)
        )
    }
}

pub type LoadResult<T> = Result<T, LoadError>;
