//! Connect command implementation

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio_util::sync::CancellationToken;

use et_core::config::ClientConfig;
use et_session::{
    CapabilityClient, SessionConfig, SessionCoordinator, SessionOutcome, SessionRegistry,
    WsConnector,
};

use super::Target;
use crate::output::{format_capability, print_info, print_success, print_warning};
use crate::terminal::{spawn_input_reader, CrosstermTerminal, RawModeGuard};

/// Open an interactive shell in the target and attach the local terminal.
///
/// Ctrl+] closes the session.
pub async fn connect_command(
    config: ClientConfig,
    target: &Target,
    check_first: bool,
) -> Result<()> {
    config.validate().context("Invalid configuration")?;
    let params = target.view_params();
    let key = params.session_key();

    if check_first {
        let capability = CapabilityClient::new(config.clone())
            .check(&key)
            .await
            .with_context(|| format!("Capability check failed for {}", key))?;
        if !capability.enabled {
            bail!("{}", format_capability(&key, &capability));
        }
    }

    let registry = Arc::new(SessionRegistry::new(
        Arc::new(WsConnector::new()),
        SessionConfig::from(&config),
    ));
    let mut coordinator = SessionCoordinator::new(Arc::clone(&registry), config);
    coordinator
        .activate(&params)
        .with_context(|| format!("Failed to open session for {}", key))?;

    print_info(&format!("Connecting to {}... (Press Ctrl+] to close)", key));

    let outcome = {
        let _raw = RawModeGuard::enable().context("Failed to enable raw mode")?;
        let stop = CancellationToken::new();
        let mut input = spawn_input_reader(stop.clone());
        let mut bridge = coordinator.bridge(CrosstermTerminal::new());

        let outcome = coordinator.run(&mut bridge, &mut input).await;
        stop.cancel();
        outcome
    };

    registry.shutdown();

    match outcome? {
        SessionOutcome::Closed => print_success("Session closed"),
        SessionOutcome::Detached => print_info("Detached from session"),
        SessionOutcome::Ended(status) => print_warning(&format!("Session ended ({})", status)),
    }
    Ok(())
}
