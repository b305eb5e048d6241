//! Live connections and their driver tasks
//!
//! A [`Connection`] is the registry-owned resource behind one session key.
//! Exactly one driver task owns its transport; inbound frames, the connection
//! timeout, and outbound writes are all serialized in that task. Subscribers
//! observe the connection through [`ConnectionHandle`]s, each with its own
//! unbounded event channel, so every subscriber sees every event in order.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use et_core::traits::{Connector, InboundFrame, Transport};
use et_core::{ConnectionStatus, Endpoint, FaultReason, SessionKey};
use et_protocol::{decode, decode_bytes, encode, Direction, Message, TerminalSize};

use crate::state::{SessionStateMachine, StatusChange};

/// Events delivered to every subscriber of a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Transport is open; waiting for the gateway handshake
    Opened,
    /// Gateway attached the shell
    Connected {
        /// Banner from the gateway, if any
        banner: Option<String>,
    },
    /// Shell output
    Output(String),
    /// Session failed
    Failed(FaultReason),
    /// Remote side ended the session
    Disconnected {
        /// Reason from the gateway, if any
        reason: Option<String>,
    },
    /// Session was closed locally; no further events follow
    Closed,
}

impl From<StatusChange> for SessionEvent {
    fn from(change: StatusChange) -> Self {
        match change {
            StatusChange::Connected { banner } => SessionEvent::Connected { banner },
            StatusChange::Disconnected { reason } => SessionEvent::Disconnected { reason },
            StatusChange::Failed(reason) => SessionEvent::Failed(reason),
        }
    }
}

#[derive(Default)]
struct SubscriberSet {
    next_id: u64,
    senders: Vec<(u64, mpsc::UnboundedSender<SessionEvent>)>,
    closed: bool,
}

impl SubscriberSet {
    fn broadcast(&mut self, event: SessionEvent) {
        // Receivers dropped without unsubscribing are pruned here
        self.senders.retain(|(_, tx)| tx.send(event.clone()).is_ok());
    }
}

/// A live connection for one session key
pub struct Connection {
    key: SessionKey,
    generation: u64,
    status: watch::Sender<ConnectionStatus>,
    outbound: mpsc::UnboundedSender<Message>,
    subscribers: Mutex<SubscriberSet>,
    cancel: CancellationToken,
}

impl Connection {
    /// Create a connection in `Connecting`.
    ///
    /// Returns the receiving end of the outbound queue, which belongs to the
    /// driver task.
    pub(crate) fn new(
        key: SessionKey,
        generation: u64,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Message>) {
        let (status, _) = watch::channel(ConnectionStatus::Connecting);
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let connection = Arc::new(Self {
            key,
            generation,
            status,
            outbound,
            subscribers: Mutex::new(SubscriberSet::default()),
            cancel: CancellationToken::new(),
        });
        (connection, outbound_rx)
    }

    /// Session key
    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// Registry-unique generation id
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Current status
    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Whether the connection was closed locally
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Whether the connection can still be handed out to new subscribers
    pub fn is_live(&self) -> bool {
        !self.is_closed() && !self.status().is_terminal()
    }

    /// Number of attached subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().senders.len()
    }

    /// Queue keystrokes for the gateway.
    ///
    /// Dropped unless the connection is `Connected`. Returns whether the
    /// input was queued.
    pub fn send_input(&self, data: &[u8]) -> bool {
        self.send_if_connected(Message::input(data))
    }

    /// Queue a resize notification for the gateway, gated like input
    pub fn send_resize(&self, size: TerminalSize) -> bool {
        self.send_if_connected(Message::Resize(size))
    }

    fn send_if_connected(&self, message: Message) -> bool {
        if self.is_closed() || self.status() != ConnectionStatus::Connected {
            tracing::trace!(
                session = %self.key,
                "Dropping {} while not connected",
                message.message_type()
            );
            return false;
        }
        self.outbound.send(message).is_ok()
    }

    /// Attach a subscriber.
    ///
    /// A subscriber attaching to an already closed connection receives a
    /// single `Closed` event.
    fn subscribe(&self) -> (u64, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subscribers = self.subscribers.lock();
        let id = subscribers.next_id;
        subscribers.next_id += 1;
        if subscribers.closed {
            let _ = tx.send(SessionEvent::Closed);
        } else {
            subscribers.senders.push((id, tx));
        }
        (id, rx)
    }

    fn unsubscribe(&self, id: u64) {
        self.subscribers.lock().senders.retain(|(sub, _)| *sub != id);
    }

    fn publish(&self, event: SessionEvent) {
        let mut subscribers = self.subscribers.lock();
        if !subscribers.closed {
            subscribers.broadcast(event);
        }
    }

    /// Record a status change and fan it out.
    ///
    /// Status and event are updated under the subscriber lock so a subscriber
    /// attaching concurrently sees either neither or both.
    fn apply(&self, change: Option<StatusChange>) {
        let Some(change) = change else {
            return;
        };
        let mut subscribers = self.subscribers.lock();
        if subscribers.closed {
            return;
        }
        let status = change.status();
        self.status.send_replace(status);
        match &change {
            StatusChange::Failed(reason) => {
                tracing::warn!(session = %self.key, "Session failed: {}", reason)
            }
            _ => tracing::info!(session = %self.key, "Session {}", status),
        }
        subscribers.broadcast(change.into());
    }

    /// Close the connection: stop the driver, deliver `Closed` to every
    /// subscriber, and detach them all. Idempotent.
    pub(crate) fn close(&self) {
        self.cancel.cancel();
        let mut subscribers = self.subscribers.lock();
        if subscribers.closed {
            return;
        }
        subscribers.closed = true;
        for (_, tx) in subscribers.senders.drain(..) {
            let _ = tx.send(SessionEvent::Closed);
        }
        tracing::info!(session = %self.key, generation = self.generation, "Session closed");
    }

    fn handle_frame(&self, machine: &mut SessionStateMachine, frame: InboundFrame) {
        let decoded = match frame {
            InboundFrame::Text(text) => decode(&text),
            InboundFrame::Binary(bytes) => decode_bytes(&bytes),
        };
        let message = match decoded {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(session = %self.key, "Dropping undecodable frame: {}", e);
                return;
            }
        };

        if message.message_type().direction() == Direction::ToGateway {
            tracing::warn!(
                session = %self.key,
                "Dropping {} frame sent by the gateway",
                message.message_type()
            );
            return;
        }

        match message {
            Message::Output(text) => self.publish(SessionEvent::Output(text)),
            other => {
                tracing::debug!(session = %self.key, "Received {}", other.message_type());
                self.apply(machine.on_message(&other));
            }
        }
    }
}

/// Drive one connection until it reaches a terminal status or is closed.
///
/// The connection timeout covers both opening the transport and waiting for
/// the gateway's `connected` message, measured from `deadline`.
pub(crate) async fn drive(
    connection: Arc<Connection>,
    connector: Arc<dyn Connector>,
    endpoint: Endpoint,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    deadline: Instant,
) {
    let mut machine = SessionStateMachine::new();
    let timeout = tokio::time::sleep_until(deadline);
    tokio::pin!(timeout);

    tracing::debug!(session = %connection.key, "Connecting to {}", endpoint);

    let mut transport: Box<dyn Transport> = tokio::select! {
        biased;

        _ = connection.cancel.cancelled() => {
            tracing::debug!(session = %connection.key, "Closed before the transport opened");
            return;
        }
        _ = &mut timeout => {
            connection.apply(machine.on_timeout());
            return;
        }
        result = connector.connect(&endpoint) => match result {
            Ok(transport) => transport,
            Err(e) => {
                connection.apply(machine.on_transport_error(&e));
                return;
            }
        },
    };

    tracing::debug!(session = %connection.key, "Transport open, awaiting handshake");
    connection.publish(SessionEvent::Opened);

    loop {
        tokio::select! {
            biased;

            _ = connection.cancel.cancelled() => break,

            _ = &mut timeout, if machine.awaiting_handshake() => {
                connection.apply(machine.on_timeout());
            }

            frame = transport.recv() => match frame {
                Some(Ok(frame)) => connection.handle_frame(&mut machine, frame),
                Some(Err(e)) => connection.apply(machine.on_transport_error(&e)),
                None => connection.apply(machine.on_transport_closed()),
            },

            Some(message) = outbound.recv() => {
                if let Err(e) = transport.send(encode(&message)).await {
                    tracing::warn!(session = %connection.key, "Failed to write frame: {}", e);
                    connection.apply(machine.on_transport_error(&e));
                }
            }
        }

        if machine.status().is_terminal() {
            break;
        }
    }

    transport.close().await;
    tracing::debug!(session = %connection.key, "Transport released");
}

/// Far enough out that the deadline never fires in practice
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Grace period armed when a connection is created.
///
/// Timeouts past the clock's range saturate to a far-future deadline.
pub(crate) fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// A subscriber's view of a connection.
///
/// Dropping the handle detaches the subscriber; the connection itself stays
/// in the registry until it is closed.
pub struct ConnectionHandle {
    connection: Arc<Connection>,
    subscriber: u64,
    events: mpsc::UnboundedReceiver<SessionEvent>,
}

impl ConnectionHandle {
    pub(crate) fn attach(connection: Arc<Connection>) -> Self {
        let (subscriber, events) = connection.subscribe();
        Self {
            connection,
            subscriber,
            events,
        }
    }

    /// Session key
    pub fn key(&self) -> &SessionKey {
        self.connection.key()
    }

    /// Generation of the underlying connection
    pub fn generation(&self) -> u64 {
        self.connection.generation()
    }

    /// Current status
    pub fn status(&self) -> ConnectionStatus {
        self.connection.status()
    }

    /// Watch status changes
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.connection.status.subscribe()
    }

    /// Whether the connection was closed locally
    pub fn is_closed(&self) -> bool {
        self.connection.is_closed()
    }

    /// Wait for the next event.
    ///
    /// Returns `None` after `Closed` has been delivered.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    /// Take the next event if one is queued
    pub fn try_next_event(&mut self) -> Option<SessionEvent> {
        self.events.try_recv().ok()
    }

    /// Whether both handles observe the same connection
    pub fn same_connection(&self, other: &ConnectionHandle) -> bool {
        Arc::ptr_eq(&self.connection, &other.connection)
    }

    /// Queue keystrokes; see [`Connection::send_input`]
    pub fn send_input(&self, data: &[u8]) -> bool {
        self.connection.send_input(data)
    }

    /// Queue a resize; see [`Connection::send_resize`]
    pub fn send_resize(&self, size: TerminalSize) -> bool {
        self.connection.send_resize(size)
    }

    /// Number of subscribers on the underlying connection
    pub fn subscriber_count(&self) -> usize {
        self.connection.subscriber_count()
    }

    pub(crate) fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("key", self.key())
            .field("generation", &self.generation())
            .field("subscriber", &self.subscriber)
            .field("status", &self.status())
            .finish()
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        self.connection.unsubscribe(self.subscriber);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> SessionKey {
        SessionKey::new("dev", "api", "task-123")
    }

    #[test]
    fn test_deadline_saturates_for_huge_timeouts() {
        let now = Instant::now();
        assert!(deadline_after(Duration::MAX) > now + Duration::from_secs(86_400 * 365));
        assert!(deadline_after(Duration::from_secs(10)) >= now + Duration::from_secs(10));
    }

    #[test]
    fn test_subscribers_receive_status_changes_in_order() {
        let (connection, _outbound) = Connection::new(key(), 1);
        let mut first = ConnectionHandle::attach(Arc::clone(&connection));
        let mut second = ConnectionHandle::attach(Arc::clone(&connection));
        let mut machine = SessionStateMachine::new();

        connection.apply(machine.on_message(&Message::Connected { banner: None }));
        connection.publish(SessionEvent::Output("a".into()));
        connection.publish(SessionEvent::Output("b".into()));

        for handle in [&mut first, &mut second] {
            assert_eq!(
                handle.try_next_event(),
                Some(SessionEvent::Connected { banner: None })
            );
            assert_eq!(handle.try_next_event(), Some(SessionEvent::Output("a".into())));
            assert_eq!(handle.try_next_event(), Some(SessionEvent::Output("b".into())));
            assert_eq!(handle.try_next_event(), None);
        }
        assert_eq!(first.status(), ConnectionStatus::Connected);
    }

    #[test]
    fn test_input_gated_on_connected() {
        let (connection, mut outbound) = Connection::new(key(), 1);
        let mut machine = SessionStateMachine::new();

        assert!(!connection.send_input(b"early"));
        assert!(outbound.try_recv().is_err());

        connection.apply(machine.on_message(&Message::Connected { banner: None }));
        assert!(connection.send_input(b"ls\n"));
        assert_eq!(outbound.try_recv().unwrap(), Message::Input("ls\n".into()));

        connection.apply(machine.on_message(&Message::Disconnected { reason: None }));
        assert!(!connection.send_input(b"late"));
        assert!(outbound.try_recv().is_err());
    }

    #[test]
    fn test_close_is_idempotent_and_silences_events() {
        let (connection, _outbound) = Connection::new(key(), 1);
        let mut handle = ConnectionHandle::attach(Arc::clone(&connection));

        connection.close();
        connection.close();
        connection.publish(SessionEvent::Output("after close".into()));

        assert_eq!(handle.try_next_event(), Some(SessionEvent::Closed));
        assert_eq!(handle.try_next_event(), None);
        assert!(handle.is_closed());
        assert_eq!(handle.subscriber_count(), 0);
    }

    #[test]
    fn test_attach_after_close_sees_closed() {
        let (connection, _outbound) = Connection::new(key(), 1);
        connection.close();

        let mut handle = ConnectionHandle::attach(Arc::clone(&connection));
        assert_eq!(handle.try_next_event(), Some(SessionEvent::Closed));
        assert_eq!(connection.subscriber_count(), 0);
    }

    #[test]
    fn test_dropping_handle_unsubscribes() {
        let (connection, _outbound) = Connection::new(key(), 1);
        let first = ConnectionHandle::attach(Arc::clone(&connection));
        let second = ConnectionHandle::attach(Arc::clone(&connection));
        assert_eq!(connection.subscriber_count(), 2);
        assert!(first.same_connection(&second));

        drop(first);
        assert_eq!(connection.subscriber_count(), 1);
        drop(second);
        assert_eq!(connection.subscriber_count(), 0);
        assert!(connection.is_live());
    }

    #[test]
    fn test_gateway_bound_frames_are_dropped() {
        let (connection, _outbound) = Connection::new(key(), 1);
        let mut handle = ConnectionHandle::attach(Arc::clone(&connection));
        let mut machine = SessionStateMachine::new();

        connection.handle_frame(
            &mut machine,
            InboundFrame::Text(r#"{"type":"input","data":"rm -rf /"}"#.into()),
        );
        connection.handle_frame(&mut machine, InboundFrame::Text("{not json".into()));
        connection.handle_frame(
            &mut machine,
            InboundFrame::Binary(br#"{"type":"output","data":"ok"}"#.to_vec()),
        );

        assert_eq!(handle.try_next_event(), Some(SessionEvent::Output("ok".into())));
        assert_eq!(handle.try_next_event(), None);
        assert_eq!(machine.status(), ConnectionStatus::Connecting);
    }
}
