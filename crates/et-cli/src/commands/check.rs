//! Check command implementation

use anyhow::{Context, Result};

use et_core::config::ClientConfig;
use et_session::CapabilityClient;

use super::Target;
use crate::output::{format_capability, print_success, print_warning};

/// Ask the gateway whether the target accepts an interactive shell.
///
/// Returns whether it does.
pub async fn check_command(config: ClientConfig, target: &Target) -> Result<bool> {
    config.validate().context("Invalid configuration")?;
    let key = target.view_params().session_key();
    let capability = CapabilityClient::new(config)
        .check(&key)
        .await
        .with_context(|| format!("Capability check failed for {}", key))?;

    let line = format_capability(&key, &capability);
    if capability.enabled {
        print_success(&line);
    } else {
        print_warning(&line);
    }
    Ok(capability.enabled)
}
