//! Configuration file loading

use super::Config;
use crate::util::fs::write_private;
use anyhow::{Context, Result};
use std::path::Path;

/// Load, parse and validate config from path
pub fn load_from_path(path: &Path) -> Result<Config> {
    let contents = std::fs::read_to_string(path).with_context(|| {
        format!(
            "Unable to read config file {:?} (use `bergelmir init` to create one)",
            path
        )
    })?;

    let config: Config = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    super::validate(&config)?;

    Ok(config)
}

/// Serialize config and write it with owner-only permissions
pub fn save_to_path(config: &Config, path: &Path) -> Result<()> {
    let contents = toml::to_string_pretty(config).context("Failed to serialize config")?;
    write_private(path, contents.as_bytes())
}
