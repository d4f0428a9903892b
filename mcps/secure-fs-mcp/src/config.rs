//! Config file discovery and loading

use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::types::Config;

/// Load the server config.
///
/// An explicit path (from `--config` or `SECURE_FS_CONFIG_PATH`) must exist
/// and parse. Otherwise the first readable file among
/// 1. `./secure-fs-mcp.toml`
/// 2. `$XDG_CONFIG_HOME/secure-fs-mcp/config.toml`
/// 3. `~/.secure-fs-mcp.toml`
///
/// is used, falling back to defaults.
pub fn load_config(explicit: Option<&Path>) -> anyhow::Result<Config> {
    if let Some(path) = explicit {
        let config = read_config(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?;
        tracing::info!("Loaded config from {}", path.display());
        return Ok(config);
    }

    for path in search_paths() {
        if !path.exists() {
            continue;
        }
        match read_config(&path) {
            Ok(config) => {
                tracing::info!("Loaded config from {}", path.display());
                return Ok(config);
            }
            Err(e) => {
                tracing::warn!("Skipping config {}: {:#}", path.display(), e);
            }
        }
    }

    tracing::info!("Using default configuration");
    Ok(Config::default())
}

fn search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("secure-fs-mcp.toml")];

    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("secure-fs-mcp").join("config.toml"));
    }

    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".secure-fs-mcp.toml"));
    }

    paths
}

fn read_config(path: &Path) -> anyhow::Result<Config> {
    let content = std::fs::read_to_string(path)?;
    let config = toml::from_str::<Config>(&content)?;
    Ok(config)
}
