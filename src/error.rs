use std::io;

/// Request handling error.
#[derive(Debug)]
pub enum Error {
    /// Response header is already sent.
    HeaderSent,
    /// Body is written before the response header.
    HeaderNotSent,
    /// Body is written after the final chunk.
    BodyFinished,
    /// Request is already finalized.
    Finalized,
    /// Request is already torn down.
    TornDown,
    /// Stream is configured with zero chunks.
    ZeroChunks,
    /// Invalid configuration value.
    InvalidConfig(&'static str),
    /// Transport error.
    Io(io::Error),
}

impl From<io::Error> for Error {
    #[inline]
    fn from(v: io::Error) -> Self {
        Self::Io(v)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HeaderSent => f.write_str("response header already sent"),
            Self::HeaderNotSent => f.write_str("response header not yet sent"),
            Self::BodyFinished => f.write_str("response body already finished"),
            Self::Finalized => f.write_str("request already finalized"),
            Self::TornDown => f.write_str("request already torn down"),
            Self::ZeroChunks => f.write_str("chunk count must be at least one"),
            Self::InvalidConfig(key) => write!(f, "invalid configuration value for `{key}`"),
            Self::Io(err) => err.fmt(f),
        }
    }
}
