//! Error types for the capture pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while capturing, composing or persisting a page
#[derive(Error, Debug)]
pub enum Error {
    /// Page-control attach or command round trip failed
    #[error("Page control connection failed: {0}")]
    Connection(String),

    /// Page height could not be determined
    #[error("Page measurement failed: {0}")]
    Measurement(String),

    /// A slice capture failed; no partial slice set is kept
    #[error("Slice capture failed: {0}")]
    Capture(String),

    /// Raster or document encoding failed
    #[error("Encoding failed: {0}")]
    Encoding(String),

    /// Writing an artifact to the sink failed or was interrupted
    #[error("Persistence failed: {0}")]
    Persistence(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

#[cfg(feature = "cdp")]
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Connection(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Persistence(err.to_string())
    }
}
