//! Command-line interface

use std::path::PathBuf;

use clap::{ArgAction, Parser};

use crate::config::load_config;
use crate::types::Config;

/// Sandboxed filesystem MCP server with croc file transfers
#[derive(Parser, Debug)]
#[command(name = "secure-fs-mcp")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Directories the server may access (replaces `[paths] allowed` from the config file)
    #[arg(value_name = "ALLOWED_DIR")]
    pub allowed_dirs: Vec<String>,

    /// Config file (default: searched in standard locations)
    #[arg(short, long, env = "SECURE_FS_CONFIG_PATH")]
    pub config: Option<PathBuf>,

    /// Transfer binary to run instead of the configured one
    #[arg(long, env = "SECURE_FS_TRANSFER_BINARY")]
    pub transfer_binary: Option<String>,

    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Config file merged with command-line overrides
    pub fn resolve_config(&self) -> anyhow::Result<Config> {
        let mut config = load_config(self.config.as_deref())?;
        self.apply_overrides(&mut config);

        if config.paths.allowed.is_empty() {
            anyhow::bail!(
                "No allowed directories configured. Pass them as arguments or set [paths] allowed in the config file."
            );
        }

        Ok(config)
    }

    fn apply_overrides(&self, config: &mut Config) {
        if !self.allowed_dirs.is_empty() {
            config.paths.allowed = self.allowed_dirs.clone();
        }
        if let Some(binary) = &self.transfer_binary {
            config.transfer.binary = binary.clone();
        }
    }

    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}
