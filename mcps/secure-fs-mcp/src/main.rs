//! Secure filesystem MCP - confined file operations and croc transfers over stdio

use clap::Parser;
use secure_fs_mcp::{Cli, SecureFsMcpServer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    mcp_common::init_tracing("secure_fs_mcp", cli.log_level())?;

    let config = cli.resolve_config()?;
    let server = SecureFsMcpServer::with_config(config)?;
    let registry = server.registry().clone();

    let served = mcp_common::serve_stdio(server, "secure-fs-mcp").await;

    // No transfer may outlive the server, whatever ended it
    let terminated = registry.cleanup_all().await;
    if terminated > 0 {
        tracing::info!(terminated, "Terminated outstanding transfers");
    }

    served?;
    Ok(())
}
