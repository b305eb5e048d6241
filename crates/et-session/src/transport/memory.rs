//! In-process transport
//!
//! Every successful connect hands a [`GatewaySide`] to whoever holds the
//! receiver returned by [`MemoryConnector::new`]. The gateway side plays the
//! remote-exec gateway: it pushes frames to the client and reads what the
//! client wrote.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use et_core::traits::{Connector, InboundFrame, Transport};
use et_core::{Endpoint, TransportError};
use et_protocol::{decode, encode, Message};

/// Connector producing in-process transports
pub struct MemoryConnector {
    gateways: mpsc::UnboundedSender<GatewaySide>,
    connects: AtomicUsize,
    refusal: Mutex<Option<String>>,
}

impl MemoryConnector {
    /// Create a connector and the receiver of gateway sides
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<GatewaySide>) {
        let (gateways, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            gateways,
            connects: AtomicUsize::new(0),
            refusal: Mutex::new(None),
        });
        (connector, rx)
    }

    /// Number of connect attempts so far
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Refuse every further connect with `reason`
    pub fn refuse_with(&self, reason: impl Into<String>) {
        *self.refusal.lock() = Some(reason.into());
    }

    /// Accept connects again
    pub fn accept(&self) {
        *self.refusal.lock() = None;
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Transport>, TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let refusal = self.refusal.lock().clone();
        if let Some(reason) = refusal {
            return Err(TransportError::ConnectFailed(reason));
        }

        let (to_client, inbound) = mpsc::unbounded_channel();
        let (outbound, from_client) = mpsc::unbounded_channel();
        let gateway = GatewaySide {
            endpoint: endpoint.clone(),
            to_client,
            from_client,
        };
        self.gateways
            .send(gateway)
            .map_err(|_| TransportError::ConnectFailed("no gateway is listening".to_string()))?;

        Ok(Box::new(MemoryTransport {
            inbound,
            outbound: Some(outbound),
        }))
    }
}

/// Client end of an in-process transport
pub struct MemoryTransport {
    inbound: mpsc::UnboundedReceiver<Result<InboundFrame, TransportError>>,
    outbound: Option<mpsc::UnboundedSender<String>>,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        let outbound = self
            .outbound
            .as_ref()
            .ok_or_else(|| TransportError::SendFailed("transport closed".to_string()))?;
        outbound
            .send(frame)
            .map_err(|_| TransportError::SendFailed("gateway hung up".to_string()))
    }

    async fn recv(&mut self) -> Option<Result<InboundFrame, TransportError>> {
        self.inbound.recv().await
    }

    async fn close(&mut self) {
        self.outbound = None;
        self.inbound.close();
    }
}

/// Gateway end of an in-process transport
pub struct GatewaySide {
    endpoint: Endpoint,
    to_client: mpsc::UnboundedSender<Result<InboundFrame, TransportError>>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl GatewaySide {
    /// Endpoint the client connected to
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Send a message as a text frame
    pub fn send(&self, message: &Message) {
        self.send_raw(encode(message));
    }

    /// Send arbitrary text as a frame
    pub fn send_raw(&self, text: impl Into<String>) {
        let _ = self.to_client.send(Ok(InboundFrame::Text(text.into())));
    }

    /// Send a binary frame
    pub fn send_binary(&self, data: Vec<u8>) {
        let _ = self.to_client.send(Ok(InboundFrame::Binary(data)));
    }

    /// Break the transport with an error
    pub fn fail(&self, error: TransportError) {
        let _ = self.to_client.send(Err(error));
    }

    /// Next raw frame written by the client; `None` once the client closed
    pub async fn recv_frame(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// Raw frame written by the client, if one is queued
    pub fn try_recv_frame(&mut self) -> Option<String> {
        self.from_client.try_recv().ok()
    }

    /// Next decodable message written by the client
    pub async fn recv(&mut self) -> Option<Message> {
        while let Some(frame) = self.recv_frame().await {
            match decode(&frame) {
                Ok(message) => return Some(message),
                Err(e) => tracing::warn!("Client wrote an undecodable frame: {}", e),
            }
        }
        None
    }

    /// Close the stream gracefully
    pub fn hang_up(self) {
        drop(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use et_core::config::ClientConfig;
    use et_core::SessionKey;

    fn endpoint() -> Endpoint {
        ClientConfig::default()
            .session_endpoint(&SessionKey::new("dev", "api", "task-123"))
            .unwrap()
    }

    #[tokio::test]
    async fn test_frames_flow_both_ways() {
        let (connector, mut gateways) = MemoryConnector::new();
        let mut transport = connector.connect(&endpoint()).await.unwrap();
        let mut gateway = gateways.recv().await.unwrap();

        gateway.send(&Message::Output("hi".into()));
        assert_eq!(
            transport.recv().await,
            Some(Ok(InboundFrame::Text(r#"{"data":"hi","type":"output"}"#.into())))
        );

        transport.send(encode(&Message::Input("ls\n".into()))).await.unwrap();
        assert_eq!(gateway.recv().await, Some(Message::Input("ls\n".into())));
        assert_eq!(connector.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_hang_up_ends_stream() {
        let (connector, mut gateways) = MemoryConnector::new();
        let mut transport = connector.connect(&endpoint()).await.unwrap();
        gateways.recv().await.unwrap().hang_up();

        assert_eq!(transport.recv().await, None);
        assert!(transport.send("{}".to_string()).await.is_err());
    }

    #[tokio::test]
    async fn test_close_releases_gateway() {
        let (connector, mut gateways) = MemoryConnector::new();
        let mut transport = connector.connect(&endpoint()).await.unwrap();
        let mut gateway = gateways.recv().await.unwrap();

        transport.close().await;
        assert_eq!(gateway.recv_frame().await, None);
    }

    #[tokio::test]
    async fn test_refusal() {
        let (connector, _gateways) = MemoryConnector::new();
        connector.refuse_with("connection refused");
        assert!(matches!(
            connector.connect(&endpoint()).await,
            Err(TransportError::ConnectFailed(_))
        ));

        connector.accept();
        assert!(connector.connect(&endpoint()).await.is_ok());
        assert_eq!(connector.connect_count(), 2);
    }
}
