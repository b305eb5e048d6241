//! et-session: Interactive shell sessions over a remote-exec gateway
//!
//! The registry keeps exactly one live connection per session key across
//! view re-activations. Each connection runs a driver task that owns the
//! transport and feeds the session state machine; the terminal bridge glues
//! a connection to a terminal emulator, and the lifecycle coordinator decides
//! when a view's departure tears a session down.

pub mod backoff;
pub mod bridge;
pub mod capability;
pub mod connection;
pub mod lifecycle;
pub mod registry;
pub mod state;
pub mod transport;

pub use bridge::{BridgeConfig, BridgeExit, TerminalBridge};
pub use capability::{Capability, CapabilityClient, CapabilityError};
pub use connection::{ConnectionHandle, SessionEvent};
pub use lifecycle::{CoordinatorError, SessionCoordinator, SessionOutcome, ViewParams};
pub use registry::{SessionConfig, SessionRegistry};
pub use state::{SessionStateMachine, StatusChange};
pub use transport::{MemoryConnector, WsConnector};
