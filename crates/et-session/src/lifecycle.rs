//! Session lifecycle coordinator
//!
//! One coordinator backs one terminal view. It derives the session key from
//! the view's parameters, holds at most one subscription, and decides what a
//! view going away means: an explicit close tears the session down, a passive
//! detach leaves it running for the next view.

use std::sync::Arc;

use futures::Stream;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use et_core::config::ClientConfig;
use et_core::traits::{EmulatorEvent, TerminalEmulator};
use et_core::{ConfigError, ConnectionStatus, SessionKey};

use crate::bridge::{BridgeConfig, BridgeExit, TerminalBridge};
use crate::connection::ConnectionHandle;
use crate::registry::SessionRegistry;

/// Parameters a terminal view is opened with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewParams {
    /// Environment name
    pub environment: String,
    /// Service name
    pub service: String,
    /// Task ARN or ID
    pub task_id: String,
    /// Container name, if not the task's default
    pub container: Option<String>,
}

impl ViewParams {
    /// Session key for these parameters
    pub fn session_key(&self) -> SessionKey {
        let key = SessionKey::new(&self.environment, &self.service, &self.task_id);
        match &self.container {
            Some(container) => key.with_container(container),
            None => key,
        }
    }
}

/// How a coordinator's run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The session was closed, by this view or elsewhere
    Closed,
    /// The view went away; the session keeps running
    Detached,
    /// The session reached a terminal status and was discarded
    Ended(ConnectionStatus),
}

/// Coordinator errors
#[derive(Error, Debug)]
pub enum CoordinatorError {
    /// `run` was called before `activate`
    #[error("No active session")]
    NotActive,

    /// Endpoint could not be derived from the configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Ties one terminal view to the registry
pub struct SessionCoordinator {
    registry: Arc<SessionRegistry>,
    config: ClientConfig,
    key: Option<SessionKey>,
    active: Option<ConnectionHandle>,
    dismissed: CancellationToken,
}

impl SessionCoordinator {
    /// Create an inactive coordinator
    pub fn new(registry: Arc<SessionRegistry>, config: ClientConfig) -> Self {
        Self {
            registry,
            config,
            key: None,
            active: None,
            dismissed: CancellationToken::new(),
        }
    }

    /// Attach to the session for `params`.
    ///
    /// Activating again for the same live session does nothing. Activating
    /// for a different key detaches from the previous one first.
    pub fn activate(&mut self, params: &ViewParams) -> Result<(), CoordinatorError> {
        let key = params.session_key();

        if let Some(handle) = &self.active {
            if handle.key() == &key && !handle.is_closed() && !handle.status().is_terminal() {
                tracing::debug!(session = %key, "Already attached");
                return Ok(());
            }
        }
        self.deactivate();

        let endpoint = self.config.session_endpoint(&key)?;
        let handle = self.registry.get_or_create(&key, &endpoint);
        tracing::debug!(session = %key, generation = handle.generation(), "Attached to session");

        self.key = Some(key);
        self.active = Some(handle);
        Ok(())
    }

    /// Build a bridge for an emulator using this coordinator's settings
    pub fn bridge<E: TerminalEmulator>(&self, emulator: E) -> TerminalBridge<E> {
        TerminalBridge::new(emulator, BridgeConfig::from(&self.config))
    }

    /// Drive the bridge for the active session.
    ///
    /// Returns when the view closes or detaches, or when the session ends.
    /// A close request from the emulator closes the session explicitly.
    pub async fn run<E, S>(
        &mut self,
        bridge: &mut TerminalBridge<E>,
        input: &mut S,
    ) -> Result<SessionOutcome, CoordinatorError>
    where
        E: TerminalEmulator,
        S: Stream<Item = EmulatorEvent> + Unpin,
    {
        let handle = self.active.as_mut().ok_or(CoordinatorError::NotActive)?;
        let exit = bridge.run(handle, input).await;

        let outcome = match exit {
            BridgeExit::CloseRequested => {
                self.close();
                SessionOutcome::Closed
            }
            BridgeExit::ViewDetached => {
                self.deactivate();
                SessionOutcome::Detached
            }
            BridgeExit::Closed => {
                self.active = None;
                self.dismissed.cancel();
                SessionOutcome::Closed
            }
            BridgeExit::SessionEnded(status) => {
                if let Some(handle) = self.active.take() {
                    self.registry.discard(&handle);
                }
                self.dismissed.cancel();
                SessionOutcome::Ended(status)
            }
        };
        Ok(outcome)
    }

    /// Explicit user close.
    ///
    /// Closes the session in the registry whether or not this coordinator
    /// still holds a handle, then dismisses the view.
    pub fn close(&mut self) {
        if let Some(key) = self.key.as_ref() {
            tracing::info!(session = %key, "Closing session");
            self.registry.close(key);
        }
        self.active = None;
        self.dismissed.cancel();
    }

    /// Passive detach: drop this view's subscription, keep the session
    pub fn deactivate(&mut self) {
        if let Some(handle) = self.active.take() {
            tracing::debug!(session = %handle.key(), "Detached from session");
        }
    }

    /// Fired when the hosting view should remove itself
    pub fn dismissed(&self) -> CancellationToken {
        self.dismissed.clone()
    }

    /// Key of the last activated session
    pub fn key(&self) -> Option<&SessionKey> {
        self.key.as_ref()
    }

    /// Status of the attached session
    pub fn status(&self) -> Option<ConnectionStatus> {
        self.active.as_ref().map(|h| h.status())
    }

    /// Handle of the attached session
    pub fn handle(&self) -> Option<&ConnectionHandle> {
        self.active.as_ref()
    }
}
