//! Error types for Wiretap

use std::io;
use thiserror::Error;

/// Result type for Wiretap operations
pub type Result<T> = std::result::Result<T, WiretapError>;

/// Errors that can occur in Wiretap
#[derive(Debug, Error)]
pub enum WiretapError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Request or response could not be constructed
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::http::Error),

    /// Connection or body error from hyper
    #[error("Connection error: {0}")]
    Hyper(#[from] hyper::Error),

    /// Outbound request failed in the client
    #[error("Request failed: {0}")]
    Request(#[from] hyper_util::client::legacy::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Body too large to render
    #[error("Data too large: {size} bytes exceeds limit of {limit} bytes")]
    DataTooLarge {
        /// Actual size
        size: usize,
        /// Size limit
        limit: usize,
    },

    /// Request or response could not be rendered
    #[error("Render error: {0}")]
    Render(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}
