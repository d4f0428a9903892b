//! Server initialization utilities
//!
//! Tracing setup and stdio serving shared by MCP server binaries.

use rmcp::{transport::stdio, ServerHandler, ServiceExt};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing/logging for MCP servers
///
/// Logs go to stderr because stdout is reserved for the MCP protocol.
/// `RUST_LOG` refines filtering; `directive_level` is the default level for
/// `crate_name` (e.g. `"info"`). Set `LOG_FORMAT=json` for JSON lines.
pub fn init_tracing(crate_name: &str, directive_level: &str) -> anyhow::Result<()> {
    let directive = format!("{}={}", crate_name, directive_level);
    let filter = EnvFilter::from_default_env().add_directive(directive.parse()?);

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);

    if use_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .init();
    }

    Ok(())
}

/// Why [`serve_stdio`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// The client closed the transport
    ClientClosed,
    /// The process received Ctrl-C
    Interrupted,
}

/// Serve `server` over stdio until the client disconnects or Ctrl-C
///
/// Returns instead of exiting so the caller can release resources the
/// server owns (child processes, temp files) before the process ends.
pub async fn serve_stdio<S>(server: S, name: &str) -> anyhow::Result<ShutdownReason>
where
    S: ServerHandler,
{
    tracing::info!("Starting {} MCP Server", name);

    let service = server.serve(stdio()).await?;

    tracing::info!("Server running, waiting for requests...");

    let reason = tokio::select! {
        quit = service.waiting() => {
            let quit = quit?;
            tracing::debug!(?quit, "transport closed");
            ShutdownReason::ClientClosed
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            ShutdownReason::Interrupted
        }
    };

    tracing::info!(?reason, "Server shutting down");
    Ok(reason)
}
