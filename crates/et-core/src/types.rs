//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Identity of one logical interactive shell.
///
/// Two keys are the same session when all fields are equal; keys are
/// compared by value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    /// Environment name (e.g. "dev")
    pub environment: String,
    /// Service name (e.g. "api")
    pub service: String,
    /// Running instance, typically an ECS task ARN or task ID
    pub target_id: String,
    /// Container inside the task; `None` lets the gateway pick the default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
}

impl SessionKey {
    /// Create a new session key
    pub fn new(
        environment: impl Into<String>,
        service: impl Into<String>,
        target_id: impl Into<String>,
    ) -> Self {
        Self {
            environment: environment.into(),
            service: service.into(),
            target_id: target_id.into(),
            container: None,
        }
    }

    /// Set the container name
    pub fn with_container(mut self, container: impl Into<String>) -> Self {
        self.container = Some(container.into());
        self
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.environment, self.service, self.target_id)?;
        if let Some(container) = &self.container {
            write!(f, ":{}", container)?;
        }
        Ok(())
    }
}

/// Where a session's transport connects to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    url: Url,
}

impl Endpoint {
    /// Create an endpoint from a full URL
    pub fn new(url: Url) -> Self {
        Self { url }
    }

    /// Build the session endpoint for a key.
    ///
    /// The session parameters travel out-of-band as query parameters:
    /// `env`, `service`, `taskArn`, and `container` when one is set.
    pub fn for_session(base: &Url, path: &str, key: &SessionKey) -> Result<Self, url::ParseError> {
        let mut url = base.join(path)?;
        {
            let mut query = url.query_pairs_mut();
            query.clear();
            query.append_pair("env", &key.environment);
            query.append_pair("service", &key.service);
            query.append_pair("taskArn", &key.target_id);
            if let Some(container) = &key.container {
                query.append_pair("container", container);
            }
        }
        Ok(Self { url })
    }

    /// Full URL
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// URL as a string
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

/// Connection status for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Transport opening or waiting for the gateway handshake
    Connecting,
    /// Shell attached, input accepted
    Connected,
    /// Remote side ended the session
    Disconnected,
    /// Session failed
    Error,
}

impl ConnectionStatus {
    /// Terminal statuses never transition again
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionStatus::Disconnected | ConnectionStatus::Error)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Connecting => write!(f, "connecting"),
            ConnectionStatus::Connected => write!(f, "connected"),
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
            ConnectionStatus::Error => write!(f, "error"),
        }
    }
}

/// Why a session entered the `Error` status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultReason {
    /// No handshake within the connection timeout
    Timeout,
    /// Gateway sent an `error` message
    Gateway(String),
    /// Transport failed to open or broke
    Transport(String),
}

impl fmt::Display for FaultReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultReason::Timeout => write!(f, "timeout"),
            FaultReason::Gateway(message) if message.is_empty() => write!(f, "gateway error"),
            FaultReason::Gateway(message) => write!(f, "{}", message),
            FaultReason::Transport(message) => write!(f, "connection lost: {}", message),
        }
    }
}
