//! Configuration file discovery and loading
//!
//! The configuration itself lives in the core crate; this module finds
//! the TOML file on disk, reads it and reports problems with the path
//! attached.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

pub use driftwm_core::config::Config;

/// Load the configuration from `path`, or from the first standard
/// location that exists. A missing file yields the defaults.
pub fn load(path: Option<&str>) -> Result<Config> {
    let config_path = path.map(PathBuf::from).or_else(find_config_file);

    match config_path {
        Some(path) if path.exists() => {
            info!("Loading configuration from {:?}", path);
            load_file(&path)
        },
        Some(path) => {
            warn!("Config file not found at {:?}, using defaults", path);
            Ok(Config::default())
        },
        None => {
            info!("No config file found, using defaults");
            Ok(Config::default())
        },
    }
}

fn load_file(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    Config::from_toml_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
}

/// Find the configuration file
fn find_config_file() -> Option<PathBuf> {
    let candidates = [
        dirs::config_dir().map(|p| p.join("driftwm/config.toml")),
        dirs::home_dir().map(|p| p.join(".driftwm/config.toml")),
        Some(PathBuf::from("/etc/driftwm/config.toml")),
    ];

    candidates.into_iter().flatten().find(|p| p.exists())
}

/// The default configuration as TOML, for `--print-default-config`.
pub fn default_config_string() -> String {
    toml::to_string_pretty(&Config::default())
        .unwrap_or_else(|e| format!("# Error generating config: {}", e))
}
