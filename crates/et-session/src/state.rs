//! Session state machine
//!
//! ```text
//! connecting ──connected──▶ connected
//!     │                         │
//!     ├──error/timeout/transport error──▶ error         (terminal)
//!     └──disconnected/graceful close────▶ disconnected  (terminal)
//! ```
//!
//! The machine is pure: the connection driver feeds it protocol messages,
//! transport outcomes, and the timeout, and publishes whatever change it
//! reports. Terminal statuses absorb every further input.

use et_core::{ConnectionStatus, FaultReason, TransportError};
use et_protocol::Message;

/// A status change produced by the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusChange {
    /// Handshake completed
    Connected {
        /// Banner from the gateway, if any
        banner: Option<String>,
    },
    /// Session ended by the remote side
    Disconnected {
        /// Reason from the gateway, if any
        reason: Option<String>,
    },
    /// Session failed
    Failed(FaultReason),
}

impl StatusChange {
    /// Status entered by this change
    pub fn status(&self) -> ConnectionStatus {
        match self {
            StatusChange::Connected { .. } => ConnectionStatus::Connected,
            StatusChange::Disconnected { .. } => ConnectionStatus::Disconnected,
            StatusChange::Failed(_) => ConnectionStatus::Error,
        }
    }
}

/// Per-connection status tracker
#[derive(Debug)]
pub struct SessionStateMachine {
    status: ConnectionStatus,
}

impl SessionStateMachine {
    /// Create a machine in `Connecting`
    pub fn new() -> Self {
        Self {
            status: ConnectionStatus::Connecting,
        }
    }

    /// Current status
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Whether the connection timeout still applies
    pub fn awaiting_handshake(&self) -> bool {
        self.status == ConnectionStatus::Connecting
    }

    /// Feed a decoded gateway message.
    ///
    /// Only `connected`, `error`, and `disconnected` change the status.
    pub fn on_message(&mut self, message: &Message) -> Option<StatusChange> {
        let change = match message {
            Message::Connected { banner } if self.status == ConnectionStatus::Connecting => {
                StatusChange::Connected {
                    banner: banner.clone(),
                }
            }
            Message::Error { message } => {
                StatusChange::Failed(FaultReason::Gateway(message.clone()))
            }
            Message::Disconnected { reason } => StatusChange::Disconnected {
                reason: reason.clone(),
            },
            _ => return None,
        };
        self.apply(change)
    }

    /// The transport ended without an error
    pub fn on_transport_closed(&mut self) -> Option<StatusChange> {
        self.apply(StatusChange::Disconnected { reason: None })
    }

    /// The transport failed to open or broke
    pub fn on_transport_error(&mut self, error: &TransportError) -> Option<StatusChange> {
        self.apply(StatusChange::Failed(FaultReason::Transport(error.to_string())))
    }

    /// The connection timeout fired
    pub fn on_timeout(&mut self) -> Option<StatusChange> {
        if !self.awaiting_handshake() {
            return None;
        }
        self.apply(StatusChange::Failed(FaultReason::Timeout))
    }

    fn apply(&mut self, change: StatusChange) -> Option<StatusChange> {
        if self.status.is_terminal() {
            return None;
        }
        self.status = change.status();
        Some(change)
    }
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
