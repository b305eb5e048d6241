//! exec-term CLI
//!
//! Interactive shells into running ECS tasks through a remote-exec gateway:
//! - connect: open a shell and attach the local terminal
//! - check: ask whether a task accepts interactive commands
//! - config: manage the client configuration

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use exec_term::commands::{self, Target};
use exec_term::output::print_error;

#[derive(Parser)]
#[command(name = "exec-term")]
#[command(author, version, about = "Interactive shells into running ECS tasks")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, env = "EXEC_TERM_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open an interactive shell in a task
    /// Alias: exec
    #[command(alias = "exec")]
    Connect {
        #[command(flatten)]
        target: Target,
        /// Gateway base URL (overrides config)
        #[arg(short, long)]
        gateway: Option<String>,
        /// Seconds to wait for the shell to attach (overrides config)
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
        /// Check that the task accepts interactive commands first
        #[arg(long)]
        check: bool,
    },

    /// Check whether a task accepts interactive commands
    Check {
        #[command(flatten)]
        target: Target,
        /// Gateway base URL (overrides config)
        #[arg(short, long)]
        gateway: Option<String>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Show the config file path
    Path,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so they never interleave with the remote shell
    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Connect {
            target,
            gateway,
            timeout,
            check,
        } => {
            let mut config = commands::load_client_config(config_path)?;
            if let Some(gateway) = gateway {
                config.gateway_url = gateway;
            }
            if let Some(secs) = timeout {
                config.connect_timeout = Duration::from_secs(secs);
            }
            if let Err(e) = commands::connect_command(config, &target, check).await {
                print_error(&format!("{:#}", e));
                std::process::exit(1);
            }
        }

        Commands::Check { target, gateway } => {
            let mut config = commands::load_client_config(config_path)?;
            if let Some(gateway) = gateway {
                config.gateway_url = gateway;
            }
            match commands::check_command(config, &target).await {
                Ok(true) => {}
                Ok(false) => std::process::exit(2),
                Err(e) => {
                    print_error(&format!("{:#}", e));
                    std::process::exit(1);
                }
            }
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_show(config_path)?,
            ConfigAction::Path => commands::config_path(config_path),
            ConfigAction::Init { force } => commands::config_init(config_path, force)?,
        },
    }

    Ok(())
}
