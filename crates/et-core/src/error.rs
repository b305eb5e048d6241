//! Core error types for exec-term

use std::path::PathBuf;
use thiserror::Error;

/// Transport-level errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Endpoint cannot be used by this transport
    #[error("Unsupported endpoint: {0}")]
    UnsupportedEndpoint(String),

    /// Connection refused or handshake failed
    #[error("Connection failed: {0}")]
    ConnectFailed(String),

    /// Writing a frame failed
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Reading a frame failed
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// Gateway URL cannot be parsed
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Errors from fitting the terminal to its surface
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FitError {
    /// Surface has not been laid out yet
    #[error("Terminal surface has zero size")]
    ZeroSize,

    /// Emulator rejected the fit
    #[error("Fit failed: {0}")]
    Failed(String),
}
