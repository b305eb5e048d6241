//! Output formatting utilities for the CLI
//!
//! Status lines go to stdout, errors to stderr. Inside an interactive
//! session stdout belongs to the remote shell, so these are only used
//! before and after one.

use std::io::Write;

use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

use et_core::SessionKey;
use et_session::Capability;

/// Describe a capability probe result
pub fn format_capability(key: &SessionKey, capability: &Capability) -> String {
    if capability.enabled {
        return format!("{}: interactive shell available", key);
    }
    match capability.reason.as_deref() {
        Some(reason) if !reason.is_empty() => {
            format!("{}: interactive shell unavailable ({})", key, reason)
        }
        _ => format!("{}: interactive shell unavailable", key),
    }
}

fn print_marked(mut out: impl Write, color: Color, mark: &str, msg: &str) {
    let _ = crossterm::execute!(
        out,
        SetForegroundColor(color),
        Print(mark),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a success message with green checkmark
pub fn print_success(msg: &str) {
    print_marked(std::io::stdout(), Color::Green, "✓ ", msg);
}

/// Print an error message with red cross
pub fn print_error(msg: &str) {
    print_marked(std::io::stderr(), Color::Red, "✗ ", msg);
}

/// Print a warning message
pub fn print_warning(msg: &str) {
    print_marked(std::io::stderr(), Color::Yellow, "⚠ ", msg);
}

/// Print an informational message
pub fn print_info(msg: &str) {
    print_marked(std::io::stdout(), Color::Cyan, "ℹ ", msg);
}
