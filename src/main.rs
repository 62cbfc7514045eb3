//! coverdrop - embed cover art in MP3 files.
//!
//! Covers are added to, listed from and cleared out of the ID3v2 tag at the
//! start of an MP3 file. Every edit is a transaction: when the new tag
//! cannot be written, the original covers are put back.

pub mod cli;
pub mod config;
pub mod cover;
pub mod error;
pub mod id3;
#[cfg(test)]
pub mod test_utils;

use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> ExitCode {
    let args = cli::Cli::parse();

    // Initialize logging
    let level = if args.verbose { "coverdrop=debug" } else { "coverdrop=info" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(level.parse().expect("valid directive")))
        .init();

    match cli::run_command(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            if let Some(hint) = cli::permission_hint(&e) {
                eprintln!("{}", hint);
            }
            ExitCode::from(cli::exit_code_for(&e))
        }
    }
}
