//! Client configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use super::serde_utils::{duration_millis, duration_secs};
use crate::error::ConfigError;
use crate::types::{Endpoint, SessionKey};

/// Longest connect timeout accepted from configuration
pub const MAX_CONNECT_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Configuration for the session client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the remote-exec gateway (`ws://` or `wss://`)
    pub gateway_url: String,

    /// Routing path of the interactive session endpoint
    pub session_path: String,

    /// Routing path of the execute-command capability probe
    pub capability_path: String,

    /// How long a session may stay `connecting` before it fails
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// Maximum number of fit retries before giving up
    pub fit_max_attempts: u32,

    /// Send `resize` frames to the gateway after a successful fit
    pub forward_resize: bool,

    /// Backoff between fit attempts while the terminal surface has no size
    pub fit_retry: BackoffConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            gateway_url: "ws://localhost:8080".to_string(),
            session_path: "/ws/ssh".to_string(),
            capability_path: "/api/ssh/capability".to_string(),
            connect_timeout: Duration::from_secs(10),
            fit_max_attempts: 20,
            forward_resize: false,
            fit_retry: BackoffConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Reject values the session layer cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connect_timeout.is_zero() || self.connect_timeout > MAX_CONNECT_TIMEOUT {
            return Err(ConfigError::Invalid(format!(
                "connect_timeout must be between 1 and {} seconds, got {}",
                MAX_CONNECT_TIMEOUT.as_secs(),
                self.connect_timeout.as_secs()
            )));
        }
        self.fit_retry.validate()
    }

    /// Parsed gateway base URL
    pub fn gateway(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.gateway_url)?;
        match url.scheme() {
            "ws" | "wss" => Ok(url),
            other => Err(ConfigError::Invalid(format!(
                "gateway_url must use ws:// or wss://, got {}://",
                other
            ))),
        }
    }

    /// WebSocket endpoint for a session
    pub fn session_endpoint(&self, key: &SessionKey) -> Result<Endpoint, ConfigError> {
        Ok(Endpoint::for_session(&self.gateway()?, &self.session_path, key)?)
    }

    /// HTTP URL of the capability probe for a session target
    pub fn capability_url(&self, key: &SessionKey) -> Result<Url, ConfigError> {
        let mut base = self.gateway()?;
        let scheme = if base.scheme() == "wss" { "https" } else { "http" };
        base.set_scheme(scheme)
            .map_err(|_| ConfigError::Invalid(format!("cannot derive {} URL", scheme)))?;

        let mut url = base.join(&self.capability_path)?;
        url.query_pairs_mut()
            .clear()
            .append_pair("env", &key.environment)
            .append_pair("service", &key.service)
            .append_pair("taskArn", &key.target_id);
        Ok(url)
    }
}

/// Exponential backoff configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Initial delay
    #[serde(with = "duration_millis")]
    pub initial: Duration,

    /// Maximum delay
    #[serde(with = "duration_millis")]
    pub max: Duration,

    /// Multiplier for each retry
    pub multiplier: f64,

    /// Jitter factor (0.0 to 1.0)
    pub jitter: f64,
}

impl BackoffConfig {
    /// Multiplier must be finite and at least 1, jitter within `0.0..=1.0`
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "fit_retry.multiplier must be a finite number >= 1, got {}",
                self.multiplier
            )));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(ConfigError::Invalid(format!(
                "fit_retry.jitter must be between 0 and 1, got {}",
                self.jitter
            )));
        }
        if self.initial > self.max {
            return Err(ConfigError::Invalid(format!(
                "fit_retry.initial ({:?}) exceeds fit_retry.max ({:?})",
                self.initial, self.max
            )));
        }
        Ok(())
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(50),
            max: Duration::from_secs(1),
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}
