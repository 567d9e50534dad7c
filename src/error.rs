//! Error types for the coalesce gateway

use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the coalesce gateway
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Inbound fragment rejected before reaching the buffer
    #[error("invalid fragment: {0}")]
    InvalidFragment(String),

    /// Response generator collaborator failed
    #[error("generator error: {0}")]
    Generator(String),

    /// Outbound notifier collaborator failed
    #[error("notifier error: {0}")]
    Notifier(String),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
