//! Command-line interface: argument parsing, one-shot commands and the
//! foreground session.

pub mod args;
pub mod commands;
pub mod session;
