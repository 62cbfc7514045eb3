//! CLI command definitions and dispatch.
//!
//! Each subcommand is implemented in its own submodule:
//! - `add`: Embed cover images
//! - `list`: Show embedded covers
//! - `clear`: Remove all covers
//! - `config`: Show or write the configuration

mod add;
mod clear;
mod config;
mod list;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

use crate::config::{self as app_config, Config, CoverMode};
use crate::error::Error;

pub use add::cmd_add;
pub use clear::cmd_clear;
pub use config::cmd_config;
pub use list::cmd_list;

/// Exit code when the file could not be written with the current rights.
pub const EXIT_PERMISSION_DENIED: u8 = 3;
/// Exit code when a failed write could not be undone.
pub const EXIT_DUAL_FAILURE: u8 = 4;

/// Embed cover art in MP3 files
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file to use instead of the default location
    #[arg(long, global = true, env = "COVERDROP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Add cover images to an MP3 file
    Add {
        /// Path to the MP3 file
        mp3: PathBuf,
        /// Images to embed (jpg, jpeg, png), in order
        #[arg(required = true)]
        images: Vec<PathBuf>,
        /// Remove the existing covers first
        #[arg(long, conflicts_with = "append")]
        replace: bool,
        /// Keep the existing covers and add the new ones after them
        #[arg(long)]
        append: bool,
    },
    /// List the covers embedded in an MP3 file
    List {
        /// Path to the MP3 file
        mp3: PathBuf,
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Remove every cover from an MP3 file
    Clear {
        /// Path to the MP3 file
        mp3: PathBuf,
    },
    /// Print the effective configuration
    Config {
        /// Also save it to the config file
        #[arg(long)]
        write: bool,
    },
}

/// Output format for `list`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Run the specified CLI command and print its report.
pub fn run_command(cli: &Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => app_config::load_from(path),
        None => app_config::load(),
    };

    let report = match &cli.command {
        Commands::Add {
            mp3,
            images,
            replace,
            append,
        } => {
            let mode = select_mode(*replace, *append, &config);
            cmd_add(&config, mp3, images, mode)?
        }
        Commands::List { mp3, format } => cmd_list(&config, mp3, *format)?,
        Commands::Clear { mp3 } => cmd_clear(&config, mp3)?,
        Commands::Config { write } => cmd_config(&config, cli.config.as_deref(), *write)?,
    };

    println!("{}", report);
    Ok(())
}

/// Process exit code for an error returned by [`run_command`].
pub fn exit_code_for(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<Error>() {
        Some(e) if e.is_retryable() => EXIT_PERMISSION_DENIED,
        Some(e) if e.is_dual_failure() => EXIT_DUAL_FAILURE,
        _ => 1,
    }
}

/// Hint printed after a permission error. Nothing is retried automatically.
pub fn permission_hint(err: &anyhow::Error) -> Option<&'static str> {
    err.downcast_ref::<Error>()
        .filter(|e| e.is_retryable())
        .map(|_| "You have no permission to write this file. Re-run with elevated rights to retry.")
}

fn select_mode(replace: bool, append: bool, config: &Config) -> CoverMode {
    if replace {
        CoverMode::Replace
    } else if append {
        CoverMode::Append
    } else {
        config.cli.default_mode
    }
}

// ============================================================================
// Shared helper functions
// ============================================================================

/// Check that `path` looks like an existing MP3 file.
pub(crate) fn check_mp3(path: &Path) -> anyhow::Result<()> {
    let is_mp3 = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.eq_ignore_ascii_case("mp3"))
        .unwrap_or(false);
    if !is_mp3 {
        anyhow::bail!("{} does not have an .mp3 extension", path.display());
    }
    if !path.is_file() {
        return Err(Error::not_found(path).into());
    }
    Ok(())
}
