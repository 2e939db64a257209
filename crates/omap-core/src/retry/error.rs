//! Tile fetch error type for retry classification.

use std::fmt;

/// Error returned by a single tile fetch attempt.
/// Kept separate from anyhow so we can classify and decide retries.
#[derive(Debug)]
pub enum FetchError {
    /// Curl reported an error (timeout, connection, etc.).
    Curl(curl::Error),
    /// HTTP response had a non-2xx status.
    Http(u32),
    /// The per-tile deadline elapsed before the source answered.
    Timeout,
    /// Transport-level failure reported by a non-curl source.
    Connection(String),
    /// 2xx response without a body; never a valid tile.
    EmptyBody,
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Curl(e) => write!(f, "{}", e),
            FetchError::Http(code) => write!(f, "HTTP {}", code),
            FetchError::Timeout => write!(f, "tile fetch timed out"),
            FetchError::Connection(msg) => write!(f, "connection error: {}", msg),
            FetchError::EmptyBody => write!(f, "empty response body"),
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetchError::Curl(e) => Some(e),
            FetchError::Http(_)
            | FetchError::Timeout
            | FetchError::Connection(_)
            | FetchError::EmptyBody => None,
        }
    }
}

impl From<curl::Error> for FetchError {
    fn from(e: curl::Error) -> Self {
        FetchError::Curl(e)
    }
}
