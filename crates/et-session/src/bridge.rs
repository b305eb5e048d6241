//! Terminal I/O bridge
//!
//! Glues one [`ConnectionHandle`] to a [`TerminalEmulator`]: shell output is
//! written to the emulator, keystrokes go to the gateway while the session is
//! connected, and the emulator is fitted to its surface on resize.

use futures::{Stream, StreamExt};
use tokio::time::Instant;

use et_core::config::{BackoffConfig, ClientConfig};
use et_core::traits::{EmulatorEvent, TerminalEmulator};
use et_core::{ConnectionStatus, FaultReason, FitError};

use crate::backoff::ExponentialBackoff;
use crate::connection::{ConnectionHandle, SessionEvent};

/// Bridge settings
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Backoff between fit attempts
    pub fit_retry: BackoffConfig,
    /// Fit attempts before giving up
    pub fit_max_attempts: u32,
    /// Send `resize` frames after a successful fit
    pub forward_resize: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::from(&ClientConfig::default())
    }
}

impl From<&ClientConfig> for BridgeConfig {
    fn from(config: &ClientConfig) -> Self {
        Self {
            fit_retry: config.fit_retry.clone(),
            fit_max_attempts: config.fit_max_attempts,
            forward_resize: config.forward_resize,
        }
    }
}

/// Why [`TerminalBridge::run`] returned
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeExit {
    /// The user asked to close the session
    CloseRequested,
    /// The emulator's event stream ended
    ViewDetached,
    /// The session reached a terminal status
    SessionEnded(ConnectionStatus),
    /// The session was closed locally
    Closed,
}

struct FitState {
    backoff: ExponentialBackoff,
    attempts: u32,
    retry_at: Option<Instant>,
}

/// Bridge between a session and a terminal emulator
pub struct TerminalBridge<E> {
    emulator: E,
    config: BridgeConfig,
    accepting_input: bool,
    fit: FitState,
}

impl<E: TerminalEmulator> TerminalBridge<E> {
    /// Create a bridge around an emulator
    pub fn new(emulator: E, config: BridgeConfig) -> Self {
        let backoff = ExponentialBackoff::from_config(&config.fit_retry);
        Self {
            emulator,
            config,
            accepting_input: false,
            fit: FitState {
                backoff,
                attempts: 0,
                retry_at: None,
            },
        }
    }

    /// The wrapped emulator
    pub fn emulator(&self) -> &E {
        &self.emulator
    }

    /// The wrapped emulator, mutably
    pub fn emulator_mut(&mut self) -> &mut E {
        &mut self.emulator
    }

    /// Unwrap the emulator
    pub fn into_inner(self) -> E {
        self.emulator
    }

    /// Whether keystrokes may still be forwarded.
    ///
    /// Cleared once the session ends; while set, input is still dropped
    /// unless the session is `connected`.
    pub fn accepting_input(&self) -> bool {
        self.accepting_input
    }

    /// Pump events until the view closes, detaches, or the session ends.
    ///
    /// A session that already ended is annotated and returned at once.
    pub async fn run<S>(&mut self, handle: &mut ConnectionHandle, input: &mut S) -> BridgeExit
    where
        S: Stream<Item = EmulatorEvent> + Unpin,
    {
        let status = handle.status();
        if status.is_terminal() {
            self.accepting_input = false;
            self.annotate(&format!("session {}", status));
            return BridgeExit::SessionEnded(status);
        }
        self.accepting_input = true;

        loop {
            let retry = self.fit.retry_at;
            tokio::select! {
                event = handle.next_event() => {
                    let exit = match event {
                        Some(event) => self.on_session_event(event),
                        None => Some(BridgeExit::Closed),
                    };
                    if let Some(exit) = exit {
                        return exit;
                    }
                }
                event = input.next() => match event {
                    Some(EmulatorEvent::CloseRequested) => return BridgeExit::CloseRequested,
                    Some(event) => self.on_emulator_event(handle, event),
                    None => return BridgeExit::ViewDetached,
                },
                _ = sleep_until_retry(retry), if retry.is_some() => {
                    self.fit.retry_at = None;
                    self.try_fit(handle);
                }
            }
        }
    }

    fn on_session_event(&mut self, event: SessionEvent) -> Option<BridgeExit> {
        match event {
            SessionEvent::Opened => None,
            SessionEvent::Output(text) => {
                if let Err(e) = self.emulator.write(text.as_bytes()) {
                    tracing::warn!("Failed to write to terminal: {}", e);
                }
                None
            }
            SessionEvent::Connected { banner } => {
                self.annotate(banner.as_deref().unwrap_or("connected"));
                None
            }
            SessionEvent::Failed(reason) => {
                self.accepting_input = false;
                self.annotate(&failure_annotation(&reason));
                Some(BridgeExit::SessionEnded(ConnectionStatus::Error))
            }
            SessionEvent::Disconnected { reason } => {
                self.accepting_input = false;
                let text = match reason {
                    Some(reason) if !reason.is_empty() => format!("session ended: {}", reason),
                    _ => "session ended".to_string(),
                };
                self.annotate(&text);
                Some(BridgeExit::SessionEnded(ConnectionStatus::Disconnected))
            }
            SessionEvent::Closed => {
                self.accepting_input = false;
                self.annotate("session closed");
                Some(BridgeExit::Closed)
            }
        }
    }

    fn on_emulator_event(&mut self, handle: &ConnectionHandle, event: EmulatorEvent) {
        match event {
            EmulatorEvent::Input(data) => {
                // The connection drops input unless it is connected
                if !(self.accepting_input && handle.send_input(&data)) {
                    tracing::trace!("Dropping {} byte(s) of input while not connected", data.len());
                }
            }
            EmulatorEvent::Resized | EmulatorEvent::Ready => {
                self.fit.backoff.reset();
                self.fit.attempts = 0;
                self.fit.retry_at = None;
                self.try_fit(handle);
            }
            EmulatorEvent::CloseRequested => {}
        }
    }

    /// Fit the emulator to its surface, scheduling a retry on failure
    fn try_fit(&mut self, handle: &ConnectionHandle) {
        let size = self.emulator.surface_size();
        let result = if size.is_empty() {
            Err(FitError::ZeroSize)
        } else {
            self.emulator.fit(size)
        };

        match result {
            Ok(()) => {
                tracing::debug!("Terminal fitted to {}", size);
                self.fit.backoff.reset();
                self.fit.attempts = 0;
                if self.config.forward_resize {
                    handle.send_resize(size);
                }
            }
            Err(e) => {
                self.fit.attempts += 1;
                if self.fit.attempts >= self.config.fit_max_attempts {
                    tracing::warn!(
                        "Giving up on terminal fit after {} attempts: {}",
                        self.fit.attempts,
                        e
                    );
                    return;
                }
                let delay = self.fit.backoff.next_delay();
                tracing::debug!("Terminal fit failed ({}), retrying in {:?}", e, delay);
                self.fit.retry_at = Instant::now().checked_add(delay);
                if self.fit.retry_at.is_none() {
                    tracing::warn!("Fit retry delay {:?} is out of range, giving up", delay);
                }
            }
        }
    }

    fn annotate(&mut self, text: &str) {
        let line = format!("\r\n[{}]\r\n", text);
        if let Err(e) = self.emulator.write(line.as_bytes()) {
            tracing::warn!("Failed to write annotation: {}", e);
        }
    }
}

async fn sleep_until_retry(retry: Option<Instant>) {
    if let Some(deadline) = retry {
        tokio::time::sleep_until(deadline).await;
    }
}

fn failure_annotation(reason: &FaultReason) -> String {
    match reason {
        FaultReason::Timeout => "session error: timed out waiting for the gateway".to_string(),
        other => format!("session error: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{SessionConfig, SessionRegistry};
    use crate::transport::memory::MemoryConnector;
    use et_core::SessionKey;
    use et_protocol::{Message, TerminalSize};
    use futures::channel::mpsc;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Default)]
    struct Screen {
        written: String,
        surface: TerminalSize,
        fits: Vec<TerminalSize>,
        fit_calls: u32,
    }

    #[derive(Clone, Default)]
    struct FakeTerminal(Arc<Mutex<Screen>>);

    impl FakeTerminal {
        fn written(&self) -> String {
            self.0.lock().written.clone()
        }
    }

    impl TerminalEmulator for FakeTerminal {
        fn write(&mut self, data: &[u8]) -> std::io::Result<()> {
            self.0.lock().written.push_str(&String::from_utf8_lossy(data));
            Ok(())
        }

        fn surface_size(&self) -> TerminalSize {
            self.0.lock().surface
        }

        fn fit(&mut self, size: TerminalSize) -> Result<(), FitError> {
            let mut screen = self.0.lock();
            screen.fit_calls += 1;
            screen.fits.push(size);
            Ok(())
        }
    }

    fn zero_size() -> TerminalSize {
        TerminalSize::new(0, 0)
    }

    fn setup(
        config: BridgeConfig,
    ) -> (
        Arc<SessionRegistry>,
        tokio::sync::mpsc::UnboundedReceiver<crate::transport::memory::GatewaySide>,
        SessionKey,
        FakeTerminal,
        TerminalBridge<FakeTerminal>,
    ) {
        let (connector, gateways) = MemoryConnector::new();
        let registry = Arc::new(SessionRegistry::new(connector, SessionConfig::default()));
        let key = SessionKey::new("dev", "api", "task-123");
        let terminal = FakeTerminal::default();
        terminal.0.lock().surface = TerminalSize::new(24, 80);
        let bridge = TerminalBridge::new(terminal.clone(), config);
        (registry, gateways, key, terminal, bridge)
    }

    fn endpoint(key: &SessionKey) -> et_core::Endpoint {
        ClientConfig::default().session_endpoint(key).unwrap()
    }

    #[tokio::test]
    async fn test_output_and_annotations() {
        let (registry, mut gateways, key, terminal, mut bridge) = setup(BridgeConfig::default());
        let mut handle = registry.get_or_create(&key, &endpoint(&key));
        let (_input_tx, mut input) = mpsc::unbounded::<EmulatorEvent>();

        let run = tokio::spawn(async move {
            let exit = bridge.run(&mut handle, &mut input).await;
            (exit, bridge)
        });

        let gateway = gateways.recv().await.unwrap();
        gateway.send(&Message::Connected {
            banner: Some("Connected to api".into()),
        });
        gateway.send(&Message::Output("$ ".into()));
        gateway.send(&Message::Disconnected {
            reason: Some("Session ended".into()),
        });

        let (exit, bridge) = run.await.unwrap();
        assert_eq!(exit, BridgeExit::SessionEnded(ConnectionStatus::Disconnected));
        assert!(!bridge.accepting_input());
        assert_eq!(
            terminal.written(),
            "\r\n[Connected to api]\r\n$ \r\n[session ended: Session ended]\r\n"
        );
    }

    #[tokio::test]
    async fn test_keystrokes_forwarded_only_when_connected() {
        let (registry, mut gateways, key, _terminal, mut bridge) = setup(BridgeConfig::default());
        let mut handle = registry.get_or_create(&key, &endpoint(&key));
        let mut status = handle.watch_status();
        let (input_tx, mut input) = mpsc::unbounded();

        let run = tokio::spawn(async move { bridge.run(&mut handle, &mut input).await });

        let mut gateway = gateways.recv().await.unwrap();
        input_tx
            .unbounded_send(EmulatorEvent::Input(b"early".to_vec()))
            .unwrap();
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        gateway.send(&Message::Connected { banner: None });
        while *status.borrow_and_update() != ConnectionStatus::Connected {
            status.changed().await.unwrap();
        }
        input_tx
            .unbounded_send(EmulatorEvent::Input(b"ls\n".to_vec()))
            .unwrap();

        assert_eq!(gateway.recv().await, Some(Message::Input("ls\n".into())));
        assert!(gateway.try_recv_frame().is_none());

        input_tx.unbounded_send(EmulatorEvent::CloseRequested).unwrap();
        assert_eq!(run.await.unwrap(), BridgeExit::CloseRequested);
    }

    #[tokio::test]
    async fn test_view_detach_leaves_session_running() {
        let (registry, _gateways, key, _terminal, mut bridge) = setup(BridgeConfig::default());
        let mut handle = registry.get_or_create(&key, &endpoint(&key));
        let (input_tx, mut input) = mpsc::unbounded::<EmulatorEvent>();
        drop(input_tx);

        assert_eq!(
            bridge.run(&mut handle, &mut input).await,
            BridgeExit::ViewDetached
        );
        assert!(!handle.is_closed());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_closed_session_annotates() {
        let (registry, _gateways, key, terminal, mut bridge) = setup(BridgeConfig::default());
        let mut handle = registry.get_or_create(&key, &endpoint(&key));
        let (_input_tx, mut input) = mpsc::unbounded::<EmulatorEvent>();

        registry.close(&key);
        assert_eq!(bridge.run(&mut handle, &mut input).await, BridgeExit::Closed);
        assert!(terminal.written().ends_with("[session closed]\r\n"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fit_retries_until_surface_is_laid_out() {
        let config = BridgeConfig {
            fit_retry: BackoffConfig {
                initial: Duration::from_millis(50),
                max: Duration::from_secs(1),
                multiplier: 2.0,
                jitter: 0.0,
            },
            fit_max_attempts: 20,
            forward_resize: false,
        };
        let (registry, _gateways, key, terminal, mut bridge) = setup(config);
        terminal.0.lock().surface = zero_size();
        let mut handle = registry.get_or_create(&key, &endpoint(&key));
        let (input_tx, mut input) = mpsc::unbounded();

        let run = tokio::spawn(async move { bridge.run(&mut handle, &mut input).await });
        input_tx.unbounded_send(EmulatorEvent::Ready).unwrap();

        // First attempt fails immediately; retries at +50ms and +100ms fail too
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(terminal.0.lock().fit_calls, 0);

        terminal.0.lock().surface = TerminalSize::new(40, 120);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(terminal.0.lock().fits, vec![TerminalSize::new(40, 120)]);

        input_tx.unbounded_send(EmulatorEvent::CloseRequested).unwrap();
        assert_eq!(run.await.unwrap(), BridgeExit::CloseRequested);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fit_retry_survives_unusable_backoff() {
        let config = BridgeConfig {
            fit_retry: BackoffConfig {
                initial: Duration::from_millis(50),
                max: Duration::from_secs(1),
                multiplier: f64::INFINITY,
                jitter: f64::NAN,
            },
            fit_max_attempts: 20,
            forward_resize: false,
        };
        let (registry, _gateways, key, terminal, mut bridge) = setup(config);
        terminal.0.lock().surface = zero_size();
        let mut handle = registry.get_or_create(&key, &endpoint(&key));
        let (input_tx, mut input) = mpsc::unbounded();

        let run = tokio::spawn(async move { bridge.run(&mut handle, &mut input).await });
        input_tx.unbounded_send(EmulatorEvent::Ready).unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;

        // Retries keep a constant delay instead of blowing up
        terminal.0.lock().surface = TerminalSize::new(40, 120);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(terminal.0.lock().fits, vec![TerminalSize::new(40, 120)]);

        input_tx.unbounded_send(EmulatorEvent::CloseRequested).unwrap();
        assert_eq!(run.await.unwrap(), BridgeExit::CloseRequested);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fit_gives_up_without_touching_session() {
        let config = BridgeConfig {
            fit_retry: BackoffConfig {
                initial: Duration::from_millis(10),
                max: Duration::from_millis(10),
                multiplier: 1.0,
                jitter: 0.0,
            },
            fit_max_attempts: 3,
            forward_resize: false,
        };
        let (registry, _gateways, key, terminal, mut bridge) = setup(config);
        terminal.0.lock().surface = zero_size();
        let mut handle = registry.get_or_create(&key, &endpoint(&key));
        let (input_tx, mut input) = mpsc::unbounded();

        let run = tokio::spawn(async move {
            let exit = bridge.run(&mut handle, &mut input).await;
            (exit, handle)
        });
        input_tx.unbounded_send(EmulatorEvent::Resized).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Surface appears, but the retry budget is spent
        terminal.0.lock().surface = TerminalSize::new(24, 80);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(terminal.0.lock().fit_calls, 0);

        input_tx.unbounded_send(EmulatorEvent::CloseRequested).unwrap();
        let (exit, handle) = run.await.unwrap();
        assert_eq!(exit, BridgeExit::CloseRequested);
        assert!(!handle.status().is_terminal());
    }

    #[tokio::test]
    async fn test_resize_forwarded_when_enabled() {
        let config = BridgeConfig {
            forward_resize: true,
            ..BridgeConfig::default()
        };
        let (registry, mut gateways, key, _terminal, mut bridge) = setup(config);
        let mut handle = registry.get_or_create(&key, &endpoint(&key));
        let mut watch = handle.watch_status();
        let (input_tx, mut input) = mpsc::unbounded();

        let run = tokio::spawn(async move { bridge.run(&mut handle, &mut input).await });

        let mut gateway = gateways.recv().await.unwrap();
        gateway.send(&Message::Connected { banner: None });
        while *watch.borrow_and_update() != ConnectionStatus::Connected {
            watch.changed().await.unwrap();
        }

        input_tx.unbounded_send(EmulatorEvent::Resized).unwrap();
        assert_eq!(
            gateway.recv().await,
            Some(Message::Resize(TerminalSize::new(24, 80)))
        );

        input_tx.unbounded_send(EmulatorEvent::CloseRequested).unwrap();
        assert_eq!(run.await.unwrap(), BridgeExit::CloseRequested);
    }

    #[test]
    fn test_failure_annotation_names_timeout() {
        assert_eq!(
            failure_annotation(&FaultReason::Timeout),
            "session error: timed out waiting for the gateway"
        );
        assert_eq!(
            failure_annotation(&FaultReason::Gateway("Error reading PTY".into())),
            "session error: Error reading PTY"
        );
    }
}
