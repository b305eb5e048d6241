//! Transport implementations
//!
//! - [`ws`]: WebSocket transport to a remote-exec gateway
//! - [`memory`]: in-process transport whose gateway side is handed to the caller

pub mod memory;
pub mod ws;

pub use memory::{GatewaySide, MemoryConnector, MemoryTransport};
pub use ws::{WsConnector, WsTransport};
