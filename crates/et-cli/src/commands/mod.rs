//! CLI command implementations

mod check;
mod config;
mod connect;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

use et_core::config::{self as core_config, ClientConfig};
use et_session::ViewParams;

pub use check::check_command;
pub use config::{config_init, config_path, config_show};
pub use connect::connect_command;

/// Which task shell to open
#[derive(Args, Debug, Clone)]
pub struct Target {
    /// Environment name (e.g. dev)
    #[arg(short, long = "env", value_name = "ENV")]
    pub environment: String,

    /// Service name
    #[arg(short, long)]
    pub service: String,

    /// Task ARN or ID
    #[arg(short, long)]
    pub task: String,

    /// Container name (defaults to the task's first container)
    #[arg(long)]
    pub container: Option<String>,
}

impl Target {
    /// View parameters for the session coordinator
    pub fn view_params(&self) -> ViewParams {
        ViewParams {
            environment: self.environment.clone(),
            service: self.service.clone(),
            task_id: self.task.clone(),
            container: self.container.clone(),
        }
    }
}

/// Load the client configuration.
///
/// An explicit path must exist; the default path is optional.
pub fn load_client_config(path: Option<&Path>) -> Result<ClientConfig> {
    match path {
        Some(path) => core_config::load_config(path)
            .with_context(|| format!("Failed to load config from {:?}", path)),
        None => {
            let default_path = core_config::default_config_path();
            if !default_path.exists() {
                tracing::debug!("No config at {:?}, using defaults", default_path);
                return Ok(ClientConfig::default());
            }
            core_config::load_config(&default_path)
                .with_context(|| format!("Failed to load config from {:?}", default_path))
        }
    }
}
