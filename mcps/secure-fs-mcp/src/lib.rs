//! Secure filesystem MCP
//!
//! An MCP server whose every filesystem access is confined to a set of
//! allowed directories by [`DirectoryGuard`], plus croc file transfers run
//! as supervised subprocesses and tracked in a [`ProcessRegistry`].
//!
//! ```rust,ignore
//! use secure_fs_mcp::{Config, SecureFsMcpServer};
//!
//! let mut config = Config::default();
//! config.paths.allowed = vec!["/data".into()];
//! let server = SecureFsMcpServer::with_config(config)?;
//! let registry = server.registry().clone();
//! mcp_common::serve_stdio(server, "secure-fs-mcp").await?;
//! registry.cleanup_all().await;
//! ```

pub mod cli;
pub mod config;
pub mod guard;
pub mod handlers;
pub mod params;
pub mod registry;
pub mod server;
pub mod transfer;
pub mod types;

pub use cli::Cli;
pub use guard::DirectoryGuard;
pub use registry::{ProcessRegistry, TransferDirection, TransferProcess, TransferStatus};
pub use server::SecureFsMcpServer;
pub use transfer::TransferOrchestrator;
pub use types::{Config, FsError, FsResult, TransferConfig};

// Re-export parameter types for direct API usage
pub use params::*;
