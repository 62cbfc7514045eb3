//! Configuration display command.

use std::path::Path;

use crate::config::{self, Config, ConfigError};

/// Print the effective configuration, optionally saving it
///
/// With `write`, the configuration is saved to `path` when one was given on
/// the command line, otherwise to the default location.
pub fn cmd_config(config: &Config, path: Option<&Path>, write: bool) -> anyhow::Result<String> {
    let rendered = config::to_toml(config)?;
    if !write {
        return Ok(rendered);
    }

    let target = match path {
        Some(path) => path.to_path_buf(),
        None => config::config_path().ok_or(ConfigError::NoConfigDir)?,
    };
    config::save_to(config, &target)?;
    Ok(format!("{}\n# Saved to {}", rendered.trim_end(), target.display()))
}
