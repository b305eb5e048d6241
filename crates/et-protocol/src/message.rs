//! Message types for the exec-term protocol
//!
//! Messages are exchanged between the client and the remote-exec gateway as
//! self-describing `{"type": ..., "data": ...}` objects, one per WebSocket
//! frame or per line. The wire carries no sequence numbers: ordering comes
//! from the transport's in-order delivery.
//!
//! # Message Flow
//!
//! Typical message sequence for a session:
//!
//! 1. Client opens the transport with the session parameters in the URL
//! 2. Gateway sends `connected` once the shell is attached
//! 3. Terminal I/O: `output` flows to the client, `input` to the gateway
//! 4. Window resize: `resize` from the client (optional, gateways may ignore it)
//! 5. Session end: gateway sends `disconnected` or `error`

use serde::{Deserialize, Serialize};
use std::fmt;

/// Terminal dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalSize {
    /// Number of rows
    pub rows: u16,
    /// Number of columns
    pub cols: u16,
}

impl TerminalSize {
    /// Create a new terminal size
    pub fn new(rows: u16, cols: u16) -> Self {
        Self { rows, cols }
    }

    /// Default terminal size (24x80)
    pub fn default_size() -> Self {
        Self { rows: 24, cols: 80 }
    }

    /// True when either dimension is zero (surface not laid out yet)
    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }
}

impl Default for TerminalSize {
    fn default() -> Self {
        Self::default_size()
    }
}

impl fmt::Display for TerminalSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.cols, self.rows)
    }
}

/// Which side of the connection originates a message type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Gateway -> client
    ToClient,
    /// Client -> gateway
    ToGateway,
}

/// Message type tag as it appears in the `type` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Handshake complete, shell attached
    Connected,
    /// Terminal output to render
    Output,
    /// Keystrokes for the remote shell
    Input,
    /// Unrecoverable session fault
    Error,
    /// Remote side closed the shell
    Disconnected,
    /// Visible terminal area changed
    Resize,
}

impl MessageType {
    /// Wire tag for this type
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Connected => "connected",
            MessageType::Output => "output",
            MessageType::Input => "input",
            MessageType::Error => "error",
            MessageType::Disconnected => "disconnected",
            MessageType::Resize => "resize",
        }
    }

    /// Parse a wire tag
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "connected" => Some(Self::Connected),
            "output" => Some(Self::Output),
            "input" => Some(Self::Input),
            "error" => Some(Self::Error),
            "disconnected" => Some(Self::Disconnected),
            "resize" => Some(Self::Resize),
            _ => None,
        }
    }

    /// Direction this message type travels in
    pub fn direction(&self) -> Direction {
        match self {
            MessageType::Input | MessageType::Resize => Direction::ToGateway,
            _ => Direction::ToClient,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Protocol messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Handshake complete
    Connected {
        /// Optional human-readable banner
        banner: Option<String>,
    },

    /// Terminal output
    Output(String),

    /// Terminal input
    Input(String),

    /// Session fault reported by the gateway
    Error {
        /// Human-readable description
        message: String,
    },

    /// Remote shell ended
    Disconnected {
        /// Optional reason
        reason: Option<String>,
    },

    /// Terminal resize
    Resize(TerminalSize),
}

impl Message {
    /// Build an input message from raw keystroke bytes.
    ///
    /// The wire payload is text; invalid UTF-8 sequences are replaced.
    pub fn input(data: &[u8]) -> Self {
        Message::Input(String::from_utf8_lossy(data).into_owned())
    }

    /// Get the message type for this message
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Connected { .. } => MessageType::Connected,
            Message::Output(_) => MessageType::Output,
            Message::Input(_) => MessageType::Input,
            Message::Error { .. } => MessageType::Error,
            Message::Disconnected { .. } => MessageType::Disconnected,
            Message::Resize(_) => MessageType::Resize,
        }
    }
}
