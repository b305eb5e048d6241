//! et-core: Core abstractions and configuration for exec-term
//!
//! This crate provides the session identity types, the error taxonomy, the
//! client configuration, and the traits that separate the session layer from
//! concrete transports and terminal emulators.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use error::{ConfigError, FitError, TransportError};
pub use types::{ConnectionStatus, Endpoint, FaultReason, SessionKey};
