//! Tool handlers
//!
//! Each handler takes the guard (or the transfer orchestrator), the config,
//! and the params. Every caller-supplied path goes through
//! [`DirectoryGuard::validate_path`] before it touches the filesystem.

use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;

use chrono::{DateTime, Utc};
use regex::Regex;
use mcp_common::{
    invalid_params, json_success, tagged_error, text_success, CallToolResult, ErrorCategory,
    McpError,
};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::guard::DirectoryGuard;
use crate::params::*;
use crate::transfer::TransferOrchestrator;
use crate::types::{
    Config, ContentMatch, DeleteFileResponse, FileEntry, FileInfoResponse, FsError, FsResult,
    ListDirResponse, ModifyFileResponse, MultiReadEntry, ReadFileResponse,
    ReadMultipleFilesResponse, SearchFilesResponse, SearchWithinFilesResponse,
    TransferPathsResponse, TreeNode, TreeResponse, WriteFileResponse,
};

/// Default cap on search_within_files results
const DEFAULT_MAX_RESULTS: usize = 1000;

/// Matching lines longer than this are cut in search_within_files output
const MAX_MATCH_LINE: usize = 500;

// ============================================================================
// Helper Functions
// ============================================================================

pub fn fs_error_to_mcp(err: FsError) -> McpError {
    let category = match &err {
        FsError::PathOutsideAllowedDirectories(_) | FsError::FileTooLarge { .. } => {
            ErrorCategory::Forbidden
        }
        FsError::InvalidPath(_)
        | FsError::InvalidArgument(_)
        | FsError::OutputDirectoryInvalid(_) => ErrorCategory::InvalidInput,
        FsError::NotFound(_) | FsError::ProcessNotFound(_) => ErrorCategory::NotFound,
        FsError::PathResolution { .. }
        | FsError::ProcessStart(_)
        | FsError::TransferTimeout(_)
        | FsError::TransferCancelled(_)
        | FsError::ExternalProcessFailed { .. }
        | FsError::IoError(_)
        | FsError::ConfigError(_) => ErrorCategory::Internal,
    };
    tagged_error(category, err.kind(), err.to_string())
}

/// I/O failure on an already validated path, reported against the caller's input
fn io_fs_error(input: &str, err: std::io::Error) -> FsError {
    if err.kind() == std::io::ErrorKind::NotFound {
        FsError::NotFound(input.to_string())
    } else {
        FsError::IoError(err)
    }
}

fn io_error(input: &str, err: std::io::Error) -> McpError {
    fs_error_to_mcp(io_fs_error(input, err))
}

/// Validate `input` and read it as text, enforcing the size limit
async fn read_text(
    guard: &DirectoryGuard,
    config: &Config,
    input: &str,
) -> FsResult<(PathBuf, String, u64)> {
    let canonical = guard.validate_path(input)?;

    let metadata = fs::metadata(&canonical)
        .await
        .map_err(|e| io_fs_error(input, e))?;

    if metadata.len() > config.limits.max_file_size as u64 {
        return Err(FsError::FileTooLarge {
            size: metadata.len(),
            max: config.limits.max_file_size,
        });
    }

    let content = fs::read_to_string(&canonical)
        .await
        .map_err(|e| io_fs_error(input, e))?;

    Ok((canonical, content, metadata.len()))
}

/// Validate `input` and require it to be an existing directory
async fn require_dir(guard: &DirectoryGuard, input: &str) -> FsResult<PathBuf> {
    let canonical = guard.validate_path(input)?;
    let metadata = fs::metadata(&canonical)
        .await
        .map_err(|e| io_fs_error(input, e))?;
    if !metadata.is_dir() {
        return Err(FsError::InvalidArgument(format!("not a directory: {input}")));
    }
    Ok(canonical)
}

/// Entry for `path` without following a final symlink, so a link never
/// reports the metadata of its target
async fn get_file_entry(path: &Path) -> Result<FileEntry, std::io::Error> {
    let metadata = fs::symlink_metadata(path).await?;
    let modified: Option<DateTime<Utc>> = metadata.modified().ok().map(|t| t.into());

    let entry_type = if metadata.is_symlink() {
        "symlink"
    } else if metadata.is_dir() {
        "directory"
    } else {
        "file"
    };

    Ok(FileEntry {
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default(),
        path: path.display().to_string(),
        entry_type: entry_type.to_string(),
        size: if metadata.is_file() {
            Some(metadata.len())
        } else {
            None
        },
        modified,
    })
}

// ============================================================================
// Filesystem handlers
// ============================================================================

pub async fn read_file(
    guard: &DirectoryGuard,
    config: &Config,
    params: ReadFileParams,
) -> Result<CallToolResult, McpError> {
    let (canonical, content, size) = read_text(guard, config, &params.path)
        .await
        .map_err(fs_error_to_mcp)?;

    let response = ReadFileResponse {
        path: canonical.display().to_string(),
        content,
        size,
    };

    json_success(&response)
}

/// Read several files; a failure is reported per file and never fails the call
pub async fn read_multiple_files(
    guard: &DirectoryGuard,
    config: &Config,
    params: ReadMultipleFilesParams,
) -> Result<CallToolResult, McpError> {
    if params.paths.is_empty() {
        return Err(fs_error_to_mcp(FsError::InvalidArgument(
            "paths must not be empty".to_string(),
        )));
    }
    if params.paths.len() > config.limits.max_files_per_list {
        return Err(fs_error_to_mcp(FsError::InvalidArgument(format!(
            "at most {} paths per call",
            config.limits.max_files_per_list
        ))));
    }

    let mut files = Vec::with_capacity(params.paths.len());
    for path in params.paths {
        let entry = match read_text(guard, config, &path).await {
            Ok((_, content, size)) => MultiReadEntry {
                path,
                content: Some(content),
                size: Some(size),
                error: None,
            },
            Err(e) => MultiReadEntry {
                path,
                content: None,
                size: None,
                error: Some(e.to_string()),
            },
        };
        files.push(entry);
    }

    let failed = files.iter().filter(|f| f.error.is_some()).count();
    let response = ReadMultipleFilesResponse {
        succeeded: files.len() - failed,
        failed,
        files,
    };

    json_success(&response)
}

pub async fn write_file(
    guard: &DirectoryGuard,
    config: &Config,
    params: WriteFileParams,
) -> Result<CallToolResult, McpError> {
    let canonical = guard.validate_path(&params.path).map_err(fs_error_to_mcp)?;

    if params.content.len() > config.limits.max_file_size {
        return Err(fs_error_to_mcp(FsError::FileTooLarge {
            size: params.content.len() as u64,
            max: config.limits.max_file_size,
        }));
    }

    let mut file = fs::File::create(&canonical)
        .await
        .map_err(|e| io_error(&params.path, e))?;

    file.write_all(params.content.as_bytes())
        .await
        .map_err(|e| io_error(&params.path, e))?;
    file.flush().await.map_err(|e| io_error(&params.path, e))?;

    let response = WriteFileResponse {
        path: canonical.display().to_string(),
        bytes_written: params.content.len(),
    };

    json_success(&response)
}

/// Find and replace inside a file, literally or by regex
pub async fn modify_file(
    guard: &DirectoryGuard,
    config: &Config,
    params: ModifyFileParams,
) -> Result<CallToolResult, McpError> {
    if params.find.is_empty() {
        return Err(fs_error_to_mcp(FsError::InvalidArgument(
            "find must not be empty".to_string(),
        )));
    }

    let (canonical, content, _) = read_text(guard, config, &params.path)
        .await
        .map_err(fs_error_to_mcp)?;

    let (new_content, replacements) = if params.regex {
        let re = Regex::new(&params.find).map_err(|e| {
            fs_error_to_mcp(FsError::InvalidArgument(format!("invalid regex: {e}")))
        })?;
        let found = re.find_iter(&content).count();
        if params.all_occurrences {
            let replaced = re.replace_all(&content, params.replace.as_str());
            (replaced.into_owned(), found)
        } else {
            let replaced = re.replacen(&content, 1, params.replace.as_str());
            (replaced.into_owned(), found.min(1))
        }
    } else {
        let found = content.matches(params.find.as_str()).count();
        if params.all_occurrences {
            (content.replace(&params.find, &params.replace), found)
        } else {
            (content.replacen(&params.find, &params.replace, 1), found.min(1))
        }
    };

    if replacements == 0 {
        return Err(fs_error_to_mcp(FsError::InvalidArgument(format!(
            "no match for {:?} in {}",
            params.find, params.path
        ))));
    }

    if new_content.len() > config.limits.max_file_size {
        return Err(fs_error_to_mcp(FsError::FileTooLarge {
            size: new_content.len() as u64,
            max: config.limits.max_file_size,
        }));
    }

    fs::write(&canonical, &new_content)
        .await
        .map_err(|e| io_error(&params.path, e))?;

    let response = ModifyFileResponse {
        path: canonical.display().to_string(),
        replacements,
        new_size: new_content.len() as u64,
    };

    json_success(&response)
}

pub async fn list_directory(
    guard: &DirectoryGuard,
    config: &Config,
    params: ListDirParams,
) -> Result<CallToolResult, McpError> {
    let canonical = guard.validate_path(&params.path).map_err(fs_error_to_mcp)?;
    let limit = config.limits.max_files_per_list;

    let mut entries = Vec::new();
    let mut truncated = false;
    let mut stack = vec![canonical.clone()];

    'walk: while let Some(dir) = stack.pop() {
        let mut read_dir = fs::read_dir(&dir)
            .await
            .map_err(|e| io_error(&params.path, e))?;

        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| io_error(&params.path, e))?
        {
            if entries.len() >= limit {
                truncated = true;
                break 'walk;
            }

            let path = entry.path();
            if let Ok(file_entry) = get_file_entry(&path).await {
                // Links are listed but never descended into
                if params.recursive && file_entry.entry_type == "directory" {
                    stack.push(path);
                }
                entries.push(file_entry);
            }
        }
    }

    entries.sort_by(|a, b| a.path.cmp(&b.path));

    let response = ListDirResponse {
        path: canonical.display().to_string(),
        total_count: entries.len(),
        entries,
        truncated,
    };

    json_success(&response)
}

pub async fn create_directory(
    guard: &DirectoryGuard,
    params: CreateDirParams,
) -> Result<CallToolResult, McpError> {
    let canonical = guard.validate_path(&params.path).map_err(fs_error_to_mcp)?;

    if params.recursive {
        fs::create_dir_all(&canonical)
            .await
            .map_err(|e| io_error(&params.path, e))?;
    } else {
        fs::create_dir(&canonical)
            .await
            .map_err(|e| io_error(&params.path, e))?;
    }

    let response = serde_json::json!({
        "path": canonical.display().to_string(),
        "created": true
    });

    json_success(&response)
}

pub async fn copy_file(
    guard: &DirectoryGuard,
    params: CopyFileParams,
) -> Result<CallToolResult, McpError> {
    let source = guard
        .validate_path(&params.source)
        .map_err(fs_error_to_mcp)?;
    let destination = guard
        .validate_path(&params.destination)
        .map_err(fs_error_to_mcp)?;

    if fs::symlink_metadata(&destination).await.is_ok() {
        return Err(invalid_params(format!(
            "Destination already exists: {}",
            params.destination
        )));
    }

    let metadata = fs::metadata(&source)
        .await
        .map_err(|e| io_error(&params.source, e))?;

    if metadata.is_dir() {
        if destination.starts_with(&source) {
            return Err(invalid_params(format!(
                "Cannot copy {} into itself",
                params.source
            )));
        }
        copy_tree(&source, &destination)
            .await
            .map_err(|e| io_error(&params.source, e))?;
    } else {
        fs::copy(&source, &destination)
            .await
            .map_err(|e| io_error(&params.source, e))?;
    }

    let response = TransferPathsResponse {
        source: source.display().to_string(),
        destination: destination.display().to_string(),
    };

    json_success(&response)
}

/// Recursive copy that skips symlinks, so nothing outside the roots is
/// pulled in through a link
async fn copy_tree(source: &Path, destination: &Path) -> std::io::Result<()> {
    let mut pending: Vec<(PathBuf, PathBuf)> = vec![(source.to_path_buf(), destination.to_path_buf())];

    while let Some((from, to)) = pending.pop() {
        fs::create_dir(&to).await?;
        let mut read_dir = fs::read_dir(&from).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            let file_type = entry.file_type().await?;
            let target = to.join(entry.file_name());
            if file_type.is_dir() {
                pending.push((entry.path(), target));
            } else if file_type.is_file() {
                fs::copy(entry.path(), &target).await?;
            } else {
                tracing::debug!(path = %entry.path().display(), "Skipping non-regular entry during copy");
            }
        }
    }

    Ok(())
}

pub async fn move_file(
    guard: &DirectoryGuard,
    params: MoveFileParams,
) -> Result<CallToolResult, McpError> {
    let source = guard
        .validate_path(&params.source)
        .map_err(fs_error_to_mcp)?;
    let destination = guard
        .validate_path(&params.destination)
        .map_err(fs_error_to_mcp)?;

    if guard.is_root(&source) {
        return Err(fs_error_to_mcp(FsError::PathOutsideAllowedDirectories(
            params.source,
        )));
    }

    fs::rename(&source, &destination)
        .await
        .map_err(|e| io_error(&params.source, e))?;

    let response = TransferPathsResponse {
        source: source.display().to_string(),
        destination: destination.display().to_string(),
    };

    json_success(&response)
}

pub async fn delete_file(
    guard: &DirectoryGuard,
    params: DeleteFileParams,
) -> Result<CallToolResult, McpError> {
    let canonical = guard.validate_path(&params.path).map_err(fs_error_to_mcp)?;

    // Removing a root would take the sandbox with it
    if guard.is_root(&canonical) {
        return Err(fs_error_to_mcp(FsError::PathOutsideAllowedDirectories(
            params.path,
        )));
    }

    let metadata = fs::metadata(&canonical)
        .await
        .map_err(|e| io_error(&params.path, e))?;

    if metadata.is_dir() {
        if params.recursive {
            fs::remove_dir_all(&canonical)
                .await
                .map_err(|e| io_error(&params.path, e))?;
        } else {
            fs::remove_dir(&canonical)
                .await
                .map_err(|e| io_error(&params.path, e))?;
        }
    } else {
        fs::remove_file(&canonical)
            .await
            .map_err(|e| io_error(&params.path, e))?;
    }

    let response = DeleteFileResponse {
        path: canonical.display().to_string(),
        deleted: true,
    };

    json_success(&response)
}

pub async fn get_file_info(
    guard: &DirectoryGuard,
    params: FileInfoParams,
) -> Result<CallToolResult, McpError> {
    let canonical = guard.validate_path(&params.path).map_err(fs_error_to_mcp)?;

    let response = match fs::metadata(&canonical).await {
        Ok(metadata) => FileInfoResponse {
            path: canonical.display().to_string(),
            exists: true,
            entry_type: Some(if metadata.is_dir() {
                "directory".to_string()
            } else {
                "file".to_string()
            }),
            size: if metadata.is_file() {
                Some(metadata.len())
            } else {
                None
            },
            modified: metadata.modified().ok().map(|t| t.into()),
            created: metadata.created().ok().map(|t| t.into()),
            readonly: Some(metadata.permissions().readonly()),
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => FileInfoResponse {
            path: canonical.display().to_string(),
            exists: false,
            entry_type: None,
            size: None,
            modified: None,
            created: None,
            readonly: None,
        },
        Err(e) => return Err(io_error(&params.path, e)),
    };

    json_success(&response)
}

pub async fn search_files(
    guard: &DirectoryGuard,
    config: &Config,
    params: SearchFilesParams,
) -> Result<CallToolResult, McpError> {
    let canonical = guard.validate_path(&params.path).map_err(fs_error_to_mcp)?;

    let pattern = Path::new(&params.pattern);
    let escapes = pattern.is_absolute()
        || pattern
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
    if escapes {
        return Err(fs_error_to_mcp(FsError::InvalidPath(format!(
            "pattern must be relative to the base path: {}",
            params.pattern
        ))));
    }

    let base = glob::Pattern::escape(&canonical.display().to_string());
    let full_pattern = format!("{}/{}", base.trim_end_matches('/'), params.pattern);

    let mut matches = Vec::new();
    for entry in glob::glob(&full_pattern).map_err(|e| invalid_params(e.to_string()))? {
        if matches.len() >= config.limits.max_files_per_list {
            break;
        }

        let Ok(path) = entry else { continue };
        // Matches reached through a link must still resolve inside a root
        let inside = std::fs::canonicalize(&path)
            .map(|real| guard.is_within_allowed(&real))
            .unwrap_or(false);
        if inside {
            matches.push(path.display().to_string());
        }
    }

    let response = SearchFilesResponse {
        pattern: params.pattern,
        base_path: canonical.display().to_string(),
        total_count: matches.len(),
        matches,
    };

    json_success(&response)
}

pub async fn list_allowed_directories(guard: &DirectoryGuard) -> Result<CallToolResult, McpError> {
    let response = serde_json::json!({
        "allowed_directories": guard.allowed_directories(),
    });

    json_success(&response)
}

// ============================================================================
// Tree and content search
// ============================================================================

pub async fn tree(
    guard: &DirectoryGuard,
    config: &Config,
    params: TreeParams,
) -> Result<CallToolResult, McpError> {
    let canonical = require_dir(guard, &params.path)
        .await
        .map_err(fs_error_to_mcp)?;

    let mut walk = TreeWalk {
        guard,
        follow_symlinks: params.follow_symlinks,
        max_depth: params.depth,
        budget: config.limits.max_files_per_list,
        entries: 0,
        truncated: false,
    };

    let children = if params.depth > 0 {
        let mut ancestors = vec![canonical.clone()];
        Some(
            walk.children(&canonical, 0, &mut ancestors)
                .await
                .map_err(|e| io_error(&params.path, e))?,
        )
    } else {
        None
    };

    let root = TreeNode {
        name: canonical
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| canonical.display().to_string()),
        path: canonical.display().to_string(),
        entry_type: "directory".to_string(),
        size: None,
        children,
    };

    let response = TreeResponse {
        root,
        total_entries: walk.entries,
        truncated: walk.truncated,
    };

    json_success(&response)
}

type TreeFuture<'a> = Pin<Box<dyn Future<Output = std::io::Result<Vec<TreeNode>>> + Send + 'a>>;

/// State of one tree walk. `budget` caps the total number of nodes.
struct TreeWalk<'g> {
    guard: &'g DirectoryGuard,
    follow_symlinks: bool,
    max_depth: usize,
    budget: usize,
    entries: usize,
    truncated: bool,
}

impl<'g> TreeWalk<'g> {
    /// Nodes for the entries of `dir`, which sits at `depth` below the root.
    /// `ancestors` holds the real paths of the directories being expanded.
    fn children<'a>(
        &'a mut self,
        dir: &'a Path,
        depth: usize,
        ancestors: &'a mut Vec<PathBuf>,
    ) -> TreeFuture<'a> {
        Box::pin(async move {
            let mut paths = Vec::new();
            let mut read_dir = fs::read_dir(dir).await?;
            while let Some(entry) = read_dir.next_entry().await? {
                paths.push(entry.path());
            }
            paths.sort();

            let mut nodes = Vec::with_capacity(paths.len());
            for path in paths {
                if self.entries >= self.budget {
                    self.truncated = true;
                    break;
                }
                let Ok(metadata) = fs::symlink_metadata(&path).await else {
                    continue;
                };
                self.entries += 1;

                let (entry_type, expand) = if metadata.is_symlink() {
                    let target = if self.follow_symlinks {
                        self.followable(&path, ancestors.as_slice()).await
                    } else {
                        None
                    };
                    ("symlink", target)
                } else if metadata.is_dir() {
                    ("directory", Some(path.clone()))
                } else {
                    ("file", None)
                };

                let mut node = TreeNode {
                    name: path
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_default(),
                    path: path.display().to_string(),
                    entry_type: entry_type.to_string(),
                    size: metadata.is_file().then(|| metadata.len()),
                    children: None,
                };

                if let Some(target) = expand {
                    if depth + 1 < self.max_depth {
                        ancestors.push(target.clone());
                        let nested = self.children(&target, depth + 1, ancestors).await;
                        ancestors.pop();
                        // An unreadable subdirectory is shown without children
                        node.children = nested.ok();
                    }
                }

                nodes.push(node);
            }

            Ok(nodes)
        })
    }

    /// Real directory behind a link, if it stays inside the roots and is
    /// not already being expanded
    async fn followable(&self, link: &Path, ancestors: &[PathBuf]) -> Option<PathBuf> {
        let real = fs::canonicalize(link).await.ok()?;
        if !self.guard.is_within_allowed(&real) {
            tracing::debug!(link = %link.display(), "Not following link out of allowed directories");
            return None;
        }
        if ancestors.contains(&real) || !fs::metadata(&real).await.ok()?.is_dir() {
            return None;
        }
        Some(real)
    }
}

/// Grep-like content search. Symlinks are never followed and binary files
/// are skipped.
pub async fn search_within_files(
    guard: &DirectoryGuard,
    config: &Config,
    params: SearchWithinFilesParams,
) -> Result<CallToolResult, McpError> {
    if params.substring.is_empty() {
        return Err(fs_error_to_mcp(FsError::InvalidArgument(
            "substring must not be empty".to_string(),
        )));
    }

    let canonical = require_dir(guard, &params.path)
        .await
        .map_err(fs_error_to_mcp)?;
    let max_depth = params.depth.filter(|d| *d > 0);
    let max_results = params
        .max_results
        .filter(|n| *n > 0)
        .unwrap_or(DEFAULT_MAX_RESULTS);

    let mut matches = Vec::new();
    let mut truncated = false;
    let mut stack = vec![(canonical.clone(), 1usize)];

    'walk: while let Some((dir, depth)) = stack.pop() {
        let mut read_dir = match fs::read_dir(&dir).await {
            Ok(read_dir) => read_dir,
            Err(e) if dir == canonical => return Err(io_error(&params.path, e)),
            Err(e) => {
                tracing::debug!(dir = %dir.display(), error = %e, "Skipping unreadable directory");
                continue;
            }
        };

        let mut entries = Vec::new();
        while let Ok(Some(entry)) = read_dir.next_entry().await {
            if let Ok(file_type) = entry.file_type().await {
                entries.push((entry.path(), file_type));
            }
        }
        entries.sort_by(|a, b| b.0.cmp(&a.0));

        for (path, file_type) in entries {
            if file_type.is_dir() {
                if max_depth.map_or(true, |max| depth < max) {
                    stack.push((path, depth + 1));
                }
                continue;
            }
            if !file_type.is_file() {
                continue;
            }

            let Some(text) = read_searchable(&path, config.limits.max_file_size).await else {
                continue;
            };
            for (index, line) in text.lines().enumerate() {
                if !line.contains(params.substring.as_str()) {
                    continue;
                }
                if matches.len() >= max_results {
                    truncated = true;
                    break 'walk;
                }
                matches.push(ContentMatch {
                    path: path.display().to_string(),
                    line_number: index + 1,
                    line: clip_line(line.trim_end()),
                });
            }
        }
    }

    matches.sort_by(|a, b| a.path.cmp(&b.path).then(a.line_number.cmp(&b.line_number)));

    let response = SearchWithinFilesResponse {
        base_path: canonical.display().to_string(),
        substring: params.substring,
        total_count: matches.len(),
        matches,
        truncated,
    };

    json_success(&response)
}

/// Text of `path`, or `None` for binary, unreadable or oversized files
async fn read_searchable(path: &Path, max_size: usize) -> Option<String> {
    let metadata = fs::metadata(path).await.ok()?;
    if metadata.len() > max_size as u64 {
        return None;
    }
    let bytes = fs::read(path).await.ok()?;
    if looks_binary(&bytes) {
        return None;
    }
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

/// A NUL byte in the first 8 KiB marks a file as binary
fn looks_binary(bytes: &[u8]) -> bool {
    bytes.iter().take(8192).any(|b| *b == 0)
}

fn clip_line(line: &str) -> String {
    match line.char_indices().nth(MAX_MATCH_LINE) {
        Some((cut, _)) => format!("{}...", &line[..cut]),
        None => line.to_string(),
    }
}

// ============================================================================
// Transfer handlers
// ============================================================================

pub async fn transfer_send(
    transfers: &TransferOrchestrator,
    params: TransferSendParams,
) -> Result<CallToolResult, McpError> {
    let response = transfers.send(&params.path).await.map_err(fs_error_to_mcp)?;
    json_success(&response)
}

pub async fn transfer_receive(
    transfers: &TransferOrchestrator,
    params: TransferReceiveParams,
    request: CancellationToken,
) -> Result<CallToolResult, McpError> {
    let response = transfers
        .receive(&params.code, params.output_dir.as_deref(), request)
        .await
        .map_err(fs_error_to_mcp)?;
    json_success(&response)
}

pub async fn transfer_status(transfers: &TransferOrchestrator) -> Result<CallToolResult, McpError> {
    Ok(text_success(transfers.status().await))
}

pub async fn transfer_cancel(
    transfers: &TransferOrchestrator,
    params: TransferCancelParams,
) -> Result<CallToolResult, McpError> {
    let message = transfers.cancel(params.pid).await.map_err(fs_error_to_mcp)?;
    Ok(text_success(message))
}
