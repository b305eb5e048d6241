//! Terminal emulator abstraction
//!
//! The emulator renders bytes and reports user input; the session layer
//! never looks inside it.

use crate::error::FitError;
use et_protocol::TerminalSize;

/// Events reported by a terminal emulator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmulatorEvent {
    /// User keystrokes
    Input(Vec<u8>),
    /// Visible area changed
    Resized,
    /// Surface laid out for the first time
    Ready,
    /// User asked to close the session
    CloseRequested,
}

/// A terminal emulator the bridge writes to
pub trait TerminalEmulator: Send {
    /// Render bytes
    fn write(&mut self, data: &[u8]) -> std::io::Result<()>;

    /// Current size of the containing surface; zero while not laid out
    fn surface_size(&self) -> TerminalSize;

    /// Fit rows and columns to the given size
    fn fit(&mut self, size: TerminalSize) -> Result<(), FitError>;
}
