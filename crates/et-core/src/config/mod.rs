//! Configuration management for exec-term

mod client;
pub mod serde_utils;

pub use client::{BackoffConfig, ClientConfig, MAX_CONNECT_TIMEOUT};

use crate::error::ConfigError;
use std::path::{Path, PathBuf};

/// Get the default configuration directory
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("exec-term")
}

/// Get the default configuration file path
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.toml")
}

/// Load configuration from a file
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read config: {}", e)))?;

    let config: T = toml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to a file
pub fn save_config<T: serde::Serialize>(path: &Path, config: &T) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ConfigError::Invalid(format!("Failed to create config dir: {}", e)))?;
    }

    std::fs::write(path, content)
        .map_err(|e| ConfigError::Invalid(format!("Failed to write config: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_load_missing_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        let err = load_config::<ClientConfig>(&path).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(p) if p == path));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = ClientConfig {
            gateway_url: "wss://gateway.internal:9443".to_string(),
            connect_timeout: Duration::from_secs(20),
            forward_resize: true,
            ..ClientConfig::default()
        };
        save_config(&path, &config).unwrap();

        let loaded: ClientConfig = load_config(&path).unwrap();
        assert_eq!(loaded.gateway_url, "wss://gateway.internal:9443");
        assert_eq!(loaded.connect_timeout, Duration::from_secs(20));
        assert!(loaded.forward_resize);
        assert_eq!(loaded.fit_retry.initial, config.fit_retry.initial);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "connect_timeout = 3\n").unwrap();

        let loaded: ClientConfig = load_config(&path).unwrap();
        assert_eq!(loaded.connect_timeout, Duration::from_secs(3));
        assert_eq!(loaded.session_path, "/ws/ssh");
    }

    #[test]
    fn test_loaded_extremes_fail_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let content = r#"
connect_timeout = 9223372036854775807

[fit_retry]
initial = 50
max = 1000
multiplier = inf
jitter = 0.1
"#;
        std::fs::write(&path, content).unwrap();

        // Parsing accepts them; validation is what keeps them out
        let loaded: ClientConfig = load_config(&path).unwrap();
        assert!(loaded.fit_retry.multiplier.is_infinite());
        assert!(matches!(loaded.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "connect_timeout = \"soon\"\n").unwrap();
        assert!(matches!(
            load_config::<ClientConfig>(&path).unwrap_err(),
            ConfigError::Parse(_)
        ));
    }
}
