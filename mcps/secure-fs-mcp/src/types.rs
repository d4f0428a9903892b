//! Type definitions for the secure filesystem MCP

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Configuration Types
// ============================================================================

/// Server configuration, loaded from TOML and overridden by CLI flags
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paths: PathConfig,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default)]
    pub transfer: TransferConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathConfig {
    /// Directories the agent may touch. Positional CLI arguments replace this list.
    #[serde(default)]
    pub allowed: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Limits {
    /// Maximum file size in bytes for read/write
    #[serde(default = "default_max_file_size")]
    pub max_file_size: usize,
    /// Maximum entries returned by list/search operations
    #[serde(default = "default_max_files_per_list")]
    pub max_files_per_list: usize,
}

fn default_max_file_size() -> usize {
    10 * 1024 * 1024 // 10MB
}

fn default_max_files_per_list() -> usize {
    1000
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            max_files_per_list: default_max_files_per_list(),
        }
    }
}

/// How the external transfer binary is invoked and supervised
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Transfer executable, resolved through PATH
    #[serde(default = "default_binary")]
    pub binary: String,
    /// Arguments placed before the transfer flags (e.g. `["--relay", "host:9009"]`)
    #[serde(default)]
    pub global_args: Vec<String>,
    /// Environment variable carrying the shared code
    #[serde(default = "default_secret_env")]
    pub secret_env: String,
    /// Length of generated codes (values below 8 are raised to 8)
    #[serde(default = "default_code_length")]
    pub code_length: usize,
    /// Output fragment signalling that the receiver connected
    #[serde(default = "default_transferring_marker")]
    pub transferring_marker: String,
    /// How long a finished send stays visible to status queries
    #[serde(default = "default_send_grace_secs")]
    pub send_grace_secs: u64,
    /// Ceiling for a blocking receive
    #[serde(default = "default_receive_timeout_secs")]
    pub receive_timeout_secs: u64,
    /// Lines of subprocess output kept for messages and errors
    #[serde(default = "default_output_tail_lines")]
    pub output_tail_lines: usize,
}

fn default_binary() -> String {
    "croc".to_string()
}

fn default_secret_env() -> String {
    "CROC_SECRET".to_string()
}

fn default_code_length() -> usize {
    10
}

fn default_transferring_marker() -> String {
    "Sending".to_string()
}

fn default_send_grace_secs() -> u64 {
    300
}

fn default_receive_timeout_secs() -> u64 {
    600
}

fn default_output_tail_lines() -> usize {
    20
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            global_args: Vec::new(),
            secret_env: default_secret_env(),
            code_length: default_code_length(),
            transferring_marker: default_transferring_marker(),
            send_grace_secs: default_send_grace_secs(),
            receive_timeout_secs: default_receive_timeout_secs(),
            output_tail_lines: default_output_tail_lines(),
        }
    }
}

// ============================================================================
// Response Types
// ============================================================================

/// Response for read_file operation
#[derive(Debug, Serialize, Deserialize)]
pub struct ReadFileResponse {
    pub path: String,
    pub content: String,
    pub size: u64,
}

/// Response for write_file operation
#[derive(Debug, Serialize, Deserialize)]
pub struct WriteFileResponse {
    pub path: String,
    pub bytes_written: usize,
}

/// Response for copy_file and move_file operations
#[derive(Debug, Serialize, Deserialize)]
pub struct TransferPathsResponse {
    pub source: String,
    pub destination: String,
}

/// Response for delete_file operation
#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteFileResponse {
    pub path: String,
    pub deleted: bool,
}

/// File or directory entry
#[derive(Debug, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub entry_type: String, // "file" or "directory"
    pub size: Option<u64>,
    pub modified: Option<DateTime<Utc>>,
}

/// Response for list_directory operation
#[derive(Debug, Serialize, Deserialize)]
pub struct ListDirResponse {
    pub path: String,
    pub entries: Vec<FileEntry>,
    pub total_count: usize,
    pub truncated: bool,
}

/// Response for search_files operation
#[derive(Debug, Serialize, Deserialize)]
pub struct SearchFilesResponse {
    pub pattern: String,
    pub base_path: String,
    pub matches: Vec<String>,
    pub total_count: usize,
}

/// Response for get_file_info operation
#[derive(Debug, Serialize, Deserialize)]
pub struct FileInfoResponse {
    pub path: String,
    pub exists: bool,
    #[serde(rename = "type")]
    pub entry_type: Option<String>,
    pub size: Option<u64>,
    pub modified: Option<DateTime<Utc>>,
    pub created: Option<DateTime<Utc>>,
    pub readonly: Option<bool>,
}

/// One file of a read_multiple_files call; either `content` or `error` is set
#[derive(Debug, Serialize, Deserialize)]
pub struct MultiReadEntry {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Response for read_multiple_files operation
#[derive(Debug, Serialize, Deserialize)]
pub struct ReadMultipleFilesResponse {
    pub files: Vec<MultiReadEntry>,
    pub succeeded: usize,
    pub failed: usize,
}

/// Node of a directory tree
#[derive(Debug, Serialize, Deserialize)]
pub struct TreeNode {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub entry_type: String, // "file", "directory" or "symlink"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<TreeNode>>,
}

/// Response for tree operation
#[derive(Debug, Serialize, Deserialize)]
pub struct TreeResponse {
    pub root: TreeNode,
    pub total_entries: usize,
    pub truncated: bool,
}

/// Response for modify_file operation
#[derive(Debug, Serialize, Deserialize)]
pub struct ModifyFileResponse {
    pub path: String,
    pub replacements: usize,
    pub new_size: u64,
}

/// One matching line found by search_within_files
#[derive(Debug, Serialize, Deserialize)]
pub struct ContentMatch {
    pub path: String,
    pub line_number: usize,
    pub line: String,
}

/// Response for search_within_files operation
#[derive(Debug, Serialize, Deserialize)]
pub struct SearchWithinFilesResponse {
    pub base_path: String,
    pub substring: String,
    pub matches: Vec<ContentMatch>,
    pub total_count: usize,
    pub truncated: bool,
}

/// Response for transfer_send: returned before any receiver connects
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendResponse {
    pub code: String,
    pub status: String,
    pub filename: String,
    pub size_bytes: u64,
    pub size_human: String,
    pub pid: u32,
}

/// Response for a completed transfer_receive
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiveResponse {
    pub status: String,
    pub message: String,
    pub output_dir: String,
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Error, Debug)]
pub enum FsError {
    /// Never carries the resolved location, only what the caller sent
    #[error("Access denied: {0} is outside the allowed directories")]
    PathOutsideAllowedDirectories(String),

    #[error("Failed to resolve path {path}: {source}")]
    PathResolution {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid output directory: {0}")]
    OutputDirectoryInvalid(String),

    #[error("Failed to start transfer process: {0}")]
    ProcessStart(#[source] std::io::Error),

    #[error("No transfer process found with PID {0}")]
    ProcessNotFound(u32),

    #[error("Transfer timed out after {0}s")]
    TransferTimeout(u64),

    #[error("Transfer cancelled: {0}")]
    TransferCancelled(String),

    /// `status` describes the exit ("exit code 1", "killed by signal")
    #[error("Transfer process failed ({status}): {stderr}")]
    ExternalProcessFailed { status: String, stderr: String },

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("File too large: {size} bytes (max {max})")]
    FileTooLarge { size: u64, max: usize },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Config error: {0}")]
    ConfigError(String),
}

impl FsError {
    /// Stable identifier reported to clients alongside the message
    pub fn kind(&self) -> &'static str {
        match self {
            FsError::PathOutsideAllowedDirectories(_) => "PathOutsideAllowedDirectories",
            FsError::PathResolution { .. } => "PathResolutionError",
            FsError::OutputDirectoryInvalid(_) => "OutputDirectoryInvalid",
            FsError::ProcessStart(_) => "ProcessStartFailure",
            FsError::ProcessNotFound(_) => "ProcessNotFound",
            FsError::TransferTimeout(_) => "TransferTimeout",
            FsError::TransferCancelled(_) => "TransferCancelled",
            FsError::ExternalProcessFailed { .. } => "ExternalProcessFailed",
            FsError::InvalidPath(_) => "InvalidPath",
            FsError::InvalidArgument(_) => "InvalidArgument",
            FsError::NotFound(_) => "NotFound",
            FsError::FileTooLarge { .. } => "FileTooLarge",
            FsError::IoError(_) => "IoError",
            FsError::ConfigError(_) => "ConfigError",
        }
    }
}

pub type FsResult<T> = Result<T, FsError>;
