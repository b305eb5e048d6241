//! Crossterm-backed terminal emulator
//!
//! The local terminal is the emulator: shell output is written to stdout in
//! raw mode, and key and resize events are read on a blocking thread and
//! translated into [`EmulatorEvent`]s.

use std::io::{self, Stdout, Write};
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use futures::channel::mpsc;
use tokio_util::sync::CancellationToken;

use et_core::traits::{EmulatorEvent, TerminalEmulator};
use et_core::FitError;
use et_protocol::TerminalSize;

/// Restores cooked mode when dropped
pub struct RawModeGuard(());

impl RawModeGuard {
    /// Switch the local terminal into raw mode
    pub fn enable() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self(()))
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

/// The local terminal as a [`TerminalEmulator`]
pub struct CrosstermTerminal {
    stdout: Stdout,
    size: TerminalSize,
}

impl CrosstermTerminal {
    /// Wrap stdout
    pub fn new() -> Self {
        Self {
            stdout: io::stdout(),
            size: TerminalSize::new(0, 0),
        }
    }

    /// Size the remote shell was last fitted to
    pub fn fitted_size(&self) -> TerminalSize {
        self.size
    }
}

impl Default for CrosstermTerminal {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalEmulator for CrosstermTerminal {
    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.stdout.write_all(data)?;
        self.stdout.flush()
    }

    fn surface_size(&self) -> TerminalSize {
        match terminal::size() {
            Ok((cols, rows)) => TerminalSize::new(rows, cols),
            Err(_) => TerminalSize::new(0, 0),
        }
    }

    fn fit(&mut self, size: TerminalSize) -> Result<(), FitError> {
        if size.is_empty() {
            return Err(FitError::ZeroSize);
        }
        // The local terminal reflows itself; only the size is tracked
        self.size = size;
        Ok(())
    }
}

/// Read local terminal events on a blocking thread.
///
/// The stream starts with `Ready` and ends when `stop` fires or the receiver
/// is dropped.
pub fn spawn_input_reader(stop: CancellationToken) -> mpsc::UnboundedReceiver<EmulatorEvent> {
    let (tx, rx) = mpsc::unbounded();
    let _ = tx.unbounded_send(EmulatorEvent::Ready);

    tokio::task::spawn_blocking(move || {
        while !stop.is_cancelled() {
            match event::poll(Duration::from_millis(50)) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    tracing::warn!("Failed to poll terminal events: {}", e);
                    break;
                }
            }
            let translated = match event::read() {
                Ok(evt) => translate_event(evt),
                Err(e) => {
                    tracing::warn!("Failed to read terminal event: {}", e);
                    break;
                }
            };
            if let Some(evt) = translated {
                if tx.unbounded_send(evt).is_err() {
                    break;
                }
            }
        }
    });

    rx
}

/// Translate a crossterm event; Ctrl+] requests close
pub fn translate_event(evt: Event) -> Option<EmulatorEvent> {
    match evt {
        Event::Key(KeyEvent {
            code,
            modifiers,
            kind,
            ..
        }) => {
            if kind == KeyEventKind::Release {
                return None;
            }
            if modifiers.contains(KeyModifiers::CONTROL) && code == KeyCode::Char(']') {
                return Some(EmulatorEvent::CloseRequested);
            }
            let data = key_to_bytes(code, modifiers);
            (!data.is_empty()).then_some(EmulatorEvent::Input(data))
        }
        Event::Paste(text) => Some(EmulatorEvent::Input(text.into_bytes())),
        Event::Resize(_, _) => Some(EmulatorEvent::Resized),
        _ => None,
    }
}

/// Convert a key press to the bytes a terminal would send
pub fn key_to_bytes(code: KeyCode, modifiers: KeyModifiers) -> Vec<u8> {
    use KeyCode::*;

    match code {
        Char(c) if modifiers.contains(KeyModifiers::CONTROL) => match control_byte(c) {
            Some(byte) if modifiers.contains(KeyModifiers::ALT) => vec![0x1b, byte],
            Some(byte) => vec![byte],
            None => key_to_bytes(Char(c), modifiers.difference(KeyModifiers::CONTROL)),
        },
        Char(c) => {
            let mut bytes = Vec::with_capacity(5);
            if modifiers.contains(KeyModifiers::ALT) {
                bytes.push(0x1b);
            }
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            bytes
        }
        Enter => vec![b'\r'],
        Tab => vec![b'\t'],
        BackTab => b"\x1b[Z".to_vec(),
        Backspace => vec![0x7f],
        Esc => vec![0x1b],
        Up => b"\x1b[A".to_vec(),
        Down => b"\x1b[B".to_vec(),
        Right => b"\x1b[C".to_vec(),
        Left => b"\x1b[D".to_vec(),
        Home => b"\x1b[H".to_vec(),
        End => b"\x1b[F".to_vec(),
        PageUp => b"\x1b[5~".to_vec(),
        PageDown => b"\x1b[6~".to_vec(),
        Delete => b"\x1b[3~".to_vec(),
        Insert => b"\x1b[2~".to_vec(),
        F(n @ 1..=4) => vec![0x1b, b'O', b'P' + (n - 1)],
        F(n @ 5..=12) => {
            let code = [15, 17, 18, 19, 20, 21, 23, 24][usize::from(n - 5)];
            format!("\x1b[{}~", code).into_bytes()
        }
        _ => vec![],
    }
}

/// Byte a terminal sends for Ctrl plus `c`, if there is one
fn control_byte(c: char) -> Option<u8> {
    match c {
        // Ctrl+A = 0x01 ... Ctrl+Z = 0x1a
        'a'..='z' | 'A'..='Z' => Some((c.to_ascii_lowercase() as u8) - b'a' + 1),
        ' ' | '@' | '2' => Some(0x00),
        '[' | '3' => Some(0x1b),
        '\\' | '4' => Some(0x1c),
        ']' | '5' => Some(0x1d),
        '^' | '6' => Some(0x1e),
        '_' | '-' | '7' => Some(0x1f),
        '?' | '8' => Some(0x7f),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_keys() {
        assert_eq!(key_to_bytes(KeyCode::Char('c'), KeyModifiers::CONTROL), vec![0x03]);
        assert_eq!(key_to_bytes(KeyCode::Char('D'), KeyModifiers::CONTROL), vec![0x04]);
        assert_eq!(key_to_bytes(KeyCode::Enter, KeyModifiers::NONE), vec![b'\r']);
    }

    #[test]
    fn test_control_punctuation() {
        let ctrl = KeyModifiers::CONTROL;
        assert_eq!(key_to_bytes(KeyCode::Char(' '), ctrl), vec![0x00]);
        assert_eq!(key_to_bytes(KeyCode::Char('@'), ctrl), vec![0x00]);
        assert_eq!(key_to_bytes(KeyCode::Char('['), ctrl), vec![0x1b]);
        assert_eq!(key_to_bytes(KeyCode::Char('\\'), ctrl), vec![0x1c]);
        assert_eq!(key_to_bytes(KeyCode::Char('^'), ctrl), vec![0x1e]);
        assert_eq!(key_to_bytes(KeyCode::Char('_'), ctrl), vec![0x1f]);
        assert_eq!(key_to_bytes(KeyCode::Char('?'), ctrl), vec![0x7f]);
        assert_eq!(
            key_to_bytes(KeyCode::Char('c'), ctrl | KeyModifiers::ALT),
            vec![0x1b, 0x03]
        );
        // No control code: the plain character goes through
        assert_eq!(key_to_bytes(KeyCode::Char('.'), ctrl), b".".to_vec());
    }

    #[test]
    fn test_printable_and_alt() {
        assert_eq!(key_to_bytes(KeyCode::Char('l'), KeyModifiers::NONE), b"l".to_vec());
        assert_eq!(key_to_bytes(KeyCode::Char('é'), KeyModifiers::NONE), "é".as_bytes().to_vec());
        assert_eq!(key_to_bytes(KeyCode::Char('b'), KeyModifiers::ALT), b"\x1bb".to_vec());
    }

    #[test]
    fn test_function_keys() {
        assert_eq!(key_to_bytes(KeyCode::F(1), KeyModifiers::NONE), b"\x1bOP".to_vec());
        assert_eq!(key_to_bytes(KeyCode::F(4), KeyModifiers::NONE), b"\x1bOS".to_vec());
        assert_eq!(key_to_bytes(KeyCode::F(5), KeyModifiers::NONE), b"\x1b[15~".to_vec());
        assert_eq!(key_to_bytes(KeyCode::F(12), KeyModifiers::NONE), b"\x1b[24~".to_vec());
        assert!(key_to_bytes(KeyCode::F(13), KeyModifiers::NONE).is_empty());
    }

    #[test]
    fn test_ctrl_bracket_requests_close() {
        let evt = Event::Key(KeyEvent::new(KeyCode::Char(']'), KeyModifiers::CONTROL));
        assert_eq!(translate_event(evt), Some(EmulatorEvent::CloseRequested));
    }

    #[test]
    fn test_resize_and_paste() {
        assert_eq!(
            translate_event(Event::Resize(120, 40)),
            Some(EmulatorEvent::Resized)
        );
        assert_eq!(
            translate_event(Event::Paste("echo hi".into())),
            Some(EmulatorEvent::Input(b"echo hi".to_vec()))
        );
        assert_eq!(translate_event(Event::FocusGained), None);
    }

    #[test]
    fn test_fit_tracks_size() {
        let mut terminal = CrosstermTerminal::new();
        assert_eq!(terminal.fit(TerminalSize::new(0, 0)), Err(FitError::ZeroSize));
        terminal.fit(TerminalSize::new(40, 120)).unwrap();
        assert_eq!(terminal.fitted_size(), TerminalSize::new(40, 120));
    }
}
