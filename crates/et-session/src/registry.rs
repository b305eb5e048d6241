//! Session registry
//!
//! Maps each [`SessionKey`] to at most one live [`Connection`]. The registry
//! is constructed explicitly and shared through `Arc`; views that attach to
//! the same key share the same connection and transport.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use et_core::config::ClientConfig;
use et_core::traits::Connector;
use et_core::{ConnectionStatus, Endpoint, SessionKey};
use et_protocol::TerminalSize;

use crate::connection::{deadline_after, drive, Connection, ConnectionHandle};

/// Registry settings
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long a connection may stay `connecting`
    pub connect_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&ClientConfig> for SessionConfig {
    fn from(config: &ClientConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout,
        }
    }
}

/// Process-wide map of live sessions
pub struct SessionRegistry {
    /// Connections indexed by session key
    connections: DashMap<SessionKey, Arc<Connection>>,
    /// Opens transports for new connections
    connector: Arc<dyn Connector>,
    /// Registry settings
    config: SessionConfig,
    /// Source of connection generations
    next_generation: AtomicU64,
}

impl SessionRegistry {
    /// Create an empty registry
    pub fn new(connector: Arc<dyn Connector>, config: SessionConfig) -> Self {
        Self {
            connections: DashMap::new(),
            connector,
            config,
            next_generation: AtomicU64::new(1),
        }
    }

    /// Attach to the live connection for `key`, creating it if needed.
    ///
    /// A `connecting` or `connected` connection is reused. A terminal one is
    /// replaced. A new connection starts in `connecting` and its driver task
    /// opens the transport to `endpoint`. The lookup and insert are atomic
    /// per key, so concurrent callers never open two transports.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn get_or_create(&self, key: &SessionKey, endpoint: &Endpoint) -> ConnectionHandle {
        match self.connections.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_live() {
                    tracing::debug!(session = %key, "Reusing live session");
                    return ConnectionHandle::attach(Arc::clone(entry.get()));
                }
                let (connection, handle) = self.spawn(key, endpoint);
                let stale = entry.insert(connection);
                stale.close();
                handle
            }
            Entry::Vacant(entry) => {
                let (connection, handle) = self.spawn(key, endpoint);
                entry.insert(connection);
                handle
            }
        }
    }

    /// Alias of [`get_or_create`](Self::get_or_create)
    pub fn open(&self, key: &SessionKey, endpoint: &Endpoint) -> ConnectionHandle {
        self.get_or_create(key, endpoint)
    }

    fn spawn(&self, key: &SessionKey, endpoint: &Endpoint) -> (Arc<Connection>, ConnectionHandle) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let (connection, outbound) = Connection::new(key.clone(), generation);
        // Subscribe before the driver runs so no event is missed
        let handle = ConnectionHandle::attach(Arc::clone(&connection));

        tracing::info!(session = %key, generation, "Opening session");
        tokio::spawn(drive(
            Arc::clone(&connection),
            Arc::clone(&self.connector),
            endpoint.clone(),
            outbound,
            deadline_after(self.config.connect_timeout),
        ));

        (connection, handle)
    }

    /// Whether a `connected` connection exists for `key`
    pub fn is_connected(&self, key: &SessionKey) -> bool {
        self.status(key) == Some(ConnectionStatus::Connected)
    }

    /// Status of the connection for `key`, if one is registered
    pub fn status(&self, key: &SessionKey) -> Option<ConnectionStatus> {
        self.connections.get(key).map(|c| c.status())
    }

    /// Queue keystrokes for `key`.
    ///
    /// A no-op unless a `connected` connection exists. Returns whether the
    /// input was queued.
    pub fn send_input(&self, key: &SessionKey, data: &[u8]) -> bool {
        self.connections
            .get(key)
            .map(|c| c.send_input(data))
            .unwrap_or(false)
    }

    /// Queue a resize notification for `key`, gated like input
    pub fn send_resize(&self, key: &SessionKey, size: TerminalSize) -> bool {
        self.connections
            .get(key)
            .map(|c| c.send_resize(size))
            .unwrap_or(false)
    }

    /// Close and remove the connection for `key`. Idempotent.
    pub fn close(&self, key: &SessionKey) {
        if let Some((_, connection)) = self.connections.remove(key) {
            connection.close();
        }
    }

    /// Remove the handle's connection if the registry still holds it.
    ///
    /// A newer connection for the same key is left alone.
    pub fn discard(&self, handle: &ConnectionHandle) {
        let generation = handle.generation();
        let removed = self
            .connections
            .remove_if(handle.key(), |_, c| c.generation() == generation);
        if removed.is_some() {
            tracing::debug!(session = %handle.key(), generation, "Discarded ended session");
        }
        handle.connection().close();
    }

    /// Close every connection
    pub fn shutdown(&self) {
        let count = self.connections.len();
        self.connections.retain(|_, connection| {
            connection.close();
            false
        });
        if count > 0 {
            tracing::info!("Closed {} session(s)", count);
        }
    }

    /// Keys with a registered connection
    pub fn keys(&self) -> Vec<SessionKey> {
        self.connections.iter().map(|r| r.key().clone()).collect()
    }

    /// Number of registered connections
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
