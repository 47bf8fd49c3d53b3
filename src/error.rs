//! Error types for the put scanner

use thiserror::Error;

use crate::provider::ProviderError;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the put scanner
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid ticker symbol: {0}")]
    InvalidSymbol(String),

    // Upstream errors
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Failed to load market snapshot: {0}")]
    SnapshotLoad(String),

    // Cache errors
    #[error("Regime cache persistence failed: {0}")]
    CachePersistence(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Provider(e) => e.is_transient(),
            Error::Io(_) => true,
            _ => false,
        }
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
