//! Error types for the offline-cache library.

use thiserror::Error;

/// Errors that can occur while installing, activating or serving requests.
#[derive(Error, Debug)]
pub enum Error {
    /// The network could not produce a response.
    #[error("Network error: {0}")]
    Network(String),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O error during cache store operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The cache store rejected an operation.
    #[error("Cache storage error: {0}")]
    Storage(String),

    /// A core asset could not be precached, so the install was rolled back.
    #[error("Install failed for {url}: {reason}")]
    Install {
        /// URL of the asset that failed.
        url: String,
        /// Why the asset could not be cached.
        reason: String,
    },

    /// A lifecycle transition was requested from the wrong state.
    #[error("Invalid worker state: expected {expected}, found {found}")]
    InvalidState {
        /// State the transition requires.
        expected: &'static str,
        /// State the worker was actually in.
        found: String,
    },

    /// Configuration could not be parsed or is invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A stored entry could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A specialized `Result` type for offline-cache operations.
pub type Result<T> = std::result::Result<T, Error>;
