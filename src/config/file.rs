//! Configuration file loading

use super::Config;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default config file locations
const CONFIG_PATHS: &[&str] = &["/etc/newnym/config.toml", "./newnym.toml"];

/// Load configuration from `explicit`, or from the first default location
/// that exists. With neither, built-in defaults are used.
pub fn load(explicit: Option<&Path>) -> Result<Config> {
    match explicit {
        Some(path) => load_from_path(path),
        None => match find_config_file() {
            Some(path) => load_from_path(&path),
            None => {
                debug!("No configuration file found, using defaults");
                Ok(Config::default())
            },
        },
    }
}

/// Find first existing config file
fn find_config_file() -> Option<PathBuf> {
    CONFIG_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
}

/// Load and parse config from path
pub fn load_from_path(path: &Path) -> Result<Config> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    debug!("Loaded configuration from {}", path.display());
    Ok(config)
}
