//! Execute-command capability probe
//!
//! Before opening a shell the gateway can be asked whether the target task
//! accepts interactive commands at all. A task without execute-command
//! enabled would otherwise fail only after the handshake.

use serde::Deserialize;
use thiserror::Error;

use et_core::config::ClientConfig;
use et_core::{ConfigError, SessionKey};

/// Whether a task can accept an interactive shell
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Capability {
    /// Execute-command is enabled on the task
    pub enabled: bool,
    /// Why it is not, when the gateway says
    #[serde(default)]
    pub reason: Option<String>,
}

/// Errors from the capability probe
#[derive(Error, Debug)]
pub enum CapabilityError {
    /// Probe URL could not be built
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Request failed or response was not JSON
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Gateway answered with a non-success status
    #[error("Gateway returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body
        body: String,
    },
}

/// HTTP client for the capability endpoint
pub struct CapabilityClient {
    http: reqwest::Client,
    config: ClientConfig,
}

impl CapabilityClient {
    /// Create a client for the configured gateway
    pub fn new(config: ClientConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Ask the gateway whether `key`'s task accepts a shell
    pub async fn check(&self, key: &SessionKey) -> Result<Capability, CapabilityError> {
        let url = self.config.capability_url(key)?;
        tracing::debug!(session = %key, "Checking capability at {}", url);

        let response = self
            .http
            .get(url)
            .timeout(self.config.connect_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CapabilityError::Status {
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }

        Ok(response.json::<Capability>().await?)
    }
}
