//! MCP Server exposing confined filesystem operations and croc transfers
//!
//! Handler implementations are in the handlers module.

use std::sync::Arc;

use mcp_common::{CallToolResult, McpError};
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{ServerCapabilities, ServerInfo},
    service::RequestContext,
    tool, tool_handler, tool_router, RoleServer,
};

use crate::guard::DirectoryGuard;
use crate::handlers;
use crate::params::*;
use crate::registry::ProcessRegistry;
use crate::transfer::TransferOrchestrator;
use crate::types::{Config, FsResult};

#[derive(Clone)]
pub struct SecureFsMcpServer {
    guard: Arc<DirectoryGuard>,
    config: Config,
    transfers: TransferOrchestrator,
    tool_router: ToolRouter<Self>,
}

// ============================================================================
// Tool Router - Each tool delegates to its handler
// ============================================================================

#[tool_router]
impl SecureFsMcpServer {
    /// Build a server confined to `config.paths.allowed`
    pub fn with_config(config: Config) -> FsResult<Self> {
        let guard = Arc::new(DirectoryGuard::new(&config.paths.allowed)?);
        let transfers = TransferOrchestrator::new(
            guard.clone(),
            ProcessRegistry::new(),
            config.transfer.clone(),
        );

        tracing::info!(
            roots = ?guard.allowed_directories(),
            binary = %config.transfer.binary,
            "Directory guard ready"
        );

        Ok(Self {
            guard,
            config,
            transfers,
            tool_router: Self::tool_router(),
        })
    }

    /// Registry of running transfers, for shutdown cleanup
    pub fn registry(&self) -> &ProcessRegistry {
        self.transfers.registry()
    }

    pub fn transfers(&self) -> &TransferOrchestrator {
        &self.transfers
    }

    #[tool(description = "Read the complete contents of a text file inside an allowed directory.")]
    async fn read_file(
        &self,
        Parameters(params): Parameters<ReadFileParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::read_file(&self.guard, &self.config, params).await
    }

    #[tool(
        description = "Read several files in one call. Each file is read independently; a failure for one file is reported in its entry and does not affect the others."
    )]
    async fn read_multiple_files(
        &self,
        Parameters(params): Parameters<ReadMultipleFilesParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::read_multiple_files(&self.guard, &self.config, params).await
    }

    #[tool(
        description = "Write content to a file. Creates the file if it doesn't exist, overwrites if it does."
    )]
    async fn write_file(
        &self,
        Parameters(params): Parameters<WriteFileParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::write_file(&self.guard, &self.config, params).await
    }

    #[tool(
        description = "Find and replace text in a file. Replaces every occurrence by default; set regex=true to treat find as a regular expression."
    )]
    async fn modify_file(
        &self,
        Parameters(params): Parameters<ModifyFileParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::modify_file(&self.guard, &self.config, params).await
    }

    #[tool(
        description = "List the contents of a directory with type, size and modification time. Symlinks are listed but not followed."
    )]
    async fn list_directory(
        &self,
        Parameters(params): Parameters<ListDirParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::list_directory(&self.guard, &self.config, params).await
    }

    #[tool(
        description = "Create a directory. Uses recursive=true by default to create parent directories."
    )]
    async fn create_directory(
        &self,
        Parameters(params): Parameters<CreateDirParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::create_directory(&self.guard, params).await
    }

    #[tool(
        description = "Copy a file or directory tree to a new path. The destination must not exist."
    )]
    async fn copy_file(
        &self,
        Parameters(params): Parameters<CopyFileParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::copy_file(&self.guard, params).await
    }

    #[tool(
        description = "Move or rename a file or directory. Both source and destination must be within allowed directories."
    )]
    async fn move_file(
        &self,
        Parameters(params): Parameters<MoveFileParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::move_file(&self.guard, params).await
    }

    #[tool(
        description = "Delete a file or directory. Use recursive=true to delete non-empty directories."
    )]
    async fn delete_file(
        &self,
        Parameters(params): Parameters<DeleteFileParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::delete_file(&self.guard, params).await
    }

    #[tool(
        description = "Get size, timestamps, type and permissions of a file or directory."
    )]
    async fn get_file_info(
        &self,
        Parameters(params): Parameters<FileInfoParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::get_file_info(&self.guard, params).await
    }

    #[tool(description = "Find files under a base directory matching a relative glob pattern.")]
    async fn search_files(
        &self,
        Parameters(params): Parameters<SearchFilesParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::search_files(&self.guard, &self.config, params).await
    }

    #[tool(
        description = "Search file contents under a directory for a substring. Reports paths and line numbers; binary files and symlinks are skipped."
    )]
    async fn search_within_files(
        &self,
        Parameters(params): Parameters<SearchWithinFilesParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::search_within_files(&self.guard, &self.config, params).await
    }

    #[tool(
        description = "Hierarchical JSON view of a directory up to a depth (default 3). Symlinked directories are only expanded with follow_symlinks=true and only when they stay inside the allowed directories."
    )]
    async fn tree(
        &self,
        Parameters(params): Parameters<TreeParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::tree(&self.guard, &self.config, params).await
    }

    #[tool(description = "List the directories this server is allowed to access.")]
    async fn list_allowed_directories(&self) -> Result<CallToolResult, McpError> {
        handlers::list_allowed_directories(&self.guard).await
    }

    #[tool(
        description = "Start sending a file or directory with croc. Returns immediately with the code the receiver needs and the PID to track or cancel the transfer."
    )]
    async fn transfer_send(
        &self,
        Parameters(params): Parameters<TransferSendParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::transfer_send(&self.transfers, params).await
    }

    #[tool(
        description = "Receive a file with a croc code into an allowed directory. Blocks until the transfer finishes, fails, times out or is cancelled."
    )]
    async fn transfer_receive(
        &self,
        Parameters(params): Parameters<TransferReceiveParams>,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        handlers::transfer_receive(&self.transfers, params, context.ct).await
    }

    #[tool(description = "List active croc transfers with PID, status, target and elapsed time.")]
    async fn transfer_status(&self) -> Result<CallToolResult, McpError> {
        handlers::transfer_status(&self.transfers).await
    }

    #[tool(description = "Cancel a running croc transfer by PID.")]
    async fn transfer_cancel(
        &self,
        Parameters(params): Parameters<TransferCancelParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::transfer_cancel(&self.transfers, params).await
    }
}

// ============================================================================
// Server Handler Implementation
// ============================================================================

#[tool_handler]
impl rmcp::ServerHandler for SecureFsMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Filesystem server confined to configured allowed directories, with croc \
                 file transfers. Use list_allowed_directories to see what paths are \
                 accessible. transfer_send returns a code at once; share it with the \
                 receiver and poll transfer_status."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
