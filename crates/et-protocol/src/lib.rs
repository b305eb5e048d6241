//! et-protocol: Wire protocol for exec-term shell sessions
//!
//! This crate defines the tagged JSON messages exchanged between the
//! client and the remote-exec gateway, and the codec that turns them
//! into frames and back.

pub mod codec;
pub mod error;
pub mod message;

pub use codec::{decode, decode_bytes, encode, MAX_FRAME_SIZE};
pub use error::ProtocolError;
pub use message::{Direction, Message, MessageType, TerminalSize};
