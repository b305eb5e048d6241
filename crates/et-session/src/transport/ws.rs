//! WebSocket transport
//!
//! One JSON message per WebSocket frame. Text frames are the norm; binary
//! frames are passed through and decoded as UTF-8 JSON by the driver.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use et_core::traits::{Connector, InboundFrame, Transport};
use et_core::{Endpoint, TransportError};

/// Opens WebSocket transports to `ws://` and `wss://` endpoints
#[derive(Debug, Default, Clone)]
pub struct WsConnector;

impl WsConnector {
    /// Create a new connector
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Transport>, TransportError> {
        match endpoint.url().scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(TransportError::UnsupportedEndpoint(format!(
                    "{}:// is not a WebSocket scheme",
                    other
                )))
            }
        }

        let (stream, response) = connect_async(endpoint.as_str())
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
        tracing::debug!("WebSocket handshake complete ({})", response.status());

        Ok(Box::new(WsTransport { stream }))
    }
}

/// An open WebSocket stream
pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        self.stream
            .send(WsMessage::Text(frame))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<InboundFrame, TransportError>> {
        loop {
            match self.stream.next().await? {
                Ok(WsMessage::Text(text)) => return Some(Ok(InboundFrame::Text(text))),
                Ok(WsMessage::Binary(data)) => return Some(Ok(InboundFrame::Binary(data))),
                Ok(WsMessage::Close(frame)) => {
                    tracing::debug!("Gateway closed the WebSocket: {:?}", frame);
                    return None;
                }
                // Pings are answered by tungstenite
                Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) | Ok(WsMessage::Frame(_)) => {
                    continue
                }
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    return None
                }
                Err(e) => return Some(Err(TransportError::ReceiveFailed(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            tracing::debug!("WebSocket close: {}", e);
        }
    }
}
