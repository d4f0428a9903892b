//! MCP Common - Shared utilities for MCP servers
//!
//! - **Initialization**: [`init_tracing`] and [`serve_stdio`]
//! - **Results**: helpers for building `CallToolResult` responses
//! - **Errors**: kind-tagged tool errors and plain invalid-params errors
//!
//! ```rust,ignore
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     mcp_common::init_tracing("my_mcp", "info")?;
//!     mcp_common::serve_stdio(MyServer::new(), "my-mcp").await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod init;
pub mod result;

// Re-export commonly used items at crate root
pub use error::{invalid_params, tagged_error, ErrorCategory};
pub use init::{init_tracing, serve_stdio, ShutdownReason};
pub use result::{json_success, text_success};

// Re-export rmcp types that are commonly needed
pub use rmcp::{model::CallToolResult, ErrorData as McpError};
