//! Transport traits
//!
//! A [`Connector`] opens one [`Transport`] per session. Transports move
//! already-encoded frames; encoding and decoding live in `et-protocol`.

use async_trait::async_trait;

use crate::error::TransportError;
use crate::types::Endpoint;

/// A frame received from the gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// Text frame
    Text(String),
    /// Binary frame
    Binary(Vec<u8>),
}

/// Opens transports to a gateway
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a transport to the endpoint
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Transport>, TransportError>;
}

/// An open, ordered, bidirectional frame stream
#[async_trait]
pub trait Transport: Send {
    /// Write one frame
    async fn send(&mut self, frame: String) -> Result<(), TransportError>;

    /// Read the next frame.
    ///
    /// Returns `None` once the remote side closed the stream gracefully.
    /// Must be cancel-safe: a dropped call loses no frame.
    async fn recv(&mut self) -> Option<Result<InboundFrame, TransportError>>;

    /// Close the stream, best effort
    async fn close(&mut self);
}
