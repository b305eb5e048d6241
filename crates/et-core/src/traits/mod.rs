//! Core trait definitions

mod terminal;
mod transport;

pub use terminal::{EmulatorEvent, TerminalEmulator};
pub use transport::{Connector, InboundFrame, Transport};
