//! Command-line interface for coverdrop.
//!
//! This module provides CLI commands for adding, listing and clearing the
//! cover art of MP3 files.

mod commands;

pub use commands::{Cli, Commands, exit_code_for, permission_hint, run_command};
