//! exec-term: Command-line client for interactive task shells
//!
//! Provides the `exec-term` CLI: a crossterm-backed terminal for
//! [`et_session`] sessions, a capability check, and config management.

pub mod commands;
pub mod output;
pub mod terminal;
