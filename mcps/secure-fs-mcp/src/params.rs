//! Parameter types for the secure filesystem MCP tools

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ReadFileParams {
    #[schemars(description = "Path to the file to read")]
    pub path: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct WriteFileParams {
    #[schemars(description = "Path to the file to write")]
    pub path: String,

    #[schemars(description = "Content to write to the file")]
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ListDirParams {
    #[schemars(description = "Path to the directory to list")]
    pub path: String,

    #[schemars(description = "Include entries of subdirectories (default: false)")]
    #[schemars(with = "bool")]
    #[serde(default, deserialize_with = "deserialize_lenient_bool")]
    pub recursive: bool,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SearchFilesParams {
    #[schemars(description = "Base directory to search from")]
    pub path: String,

    #[schemars(description = "Glob pattern relative to the base (e.g., '*.rs', '**/*.json')")]
    pub pattern: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct FileInfoParams {
    #[schemars(description = "Path to the file or directory")]
    pub path: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct CopyFileParams {
    #[schemars(description = "Source file or directory")]
    pub source: String,

    #[schemars(description = "Destination path (must not exist)")]
    pub destination: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct MoveFileParams {
    #[schemars(description = "Source path")]
    pub source: String,

    #[schemars(description = "Destination path")]
    pub destination: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct DeleteFileParams {
    #[schemars(description = "Path to the file or directory to delete")]
    pub path: String,

    #[schemars(description = "Recursively delete directories (default: false)")]
    #[schemars(with = "bool")]
    #[serde(default, deserialize_with = "deserialize_lenient_bool")]
    pub recursive: bool,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct CreateDirParams {
    #[schemars(description = "Path of the directory to create")]
    pub path: String,

    #[schemars(description = "Create parent directories as needed (default: true)")]
    #[schemars(with = "bool")]
    #[serde(default = "default_true", deserialize_with = "deserialize_lenient_bool")]
    pub recursive: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ReadMultipleFilesParams {
    #[schemars(description = "Paths of the files to read")]
    pub paths: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct TreeParams {
    #[schemars(description = "Directory to describe")]
    pub path: String,

    #[schemars(description = "Maximum depth to traverse (default: 3)")]
    #[serde(default = "default_tree_depth")]
    pub depth: usize,

    #[schemars(
        description = "Descend into symlinked directories that stay inside the allowed directories (default: false)"
    )]
    #[schemars(with = "bool")]
    #[serde(default, deserialize_with = "deserialize_lenient_bool")]
    pub follow_symlinks: bool,
}

fn default_tree_depth() -> usize {
    3
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ModifyFileParams {
    #[schemars(description = "Path to the file to modify")]
    pub path: String,

    #[schemars(description = "Text to search for (exact match or regex pattern)")]
    pub find: String,

    #[schemars(description = "Replacement text; with regex=true, $1 or ${name} refer to capture groups")]
    pub replace: String,

    #[schemars(description = "Replace every occurrence instead of only the first (default: true)")]
    #[schemars(with = "bool")]
    #[serde(default = "default_true", deserialize_with = "deserialize_lenient_bool")]
    pub all_occurrences: bool,

    #[schemars(description = "Treat find as a regular expression (default: false)")]
    #[schemars(with = "bool")]
    #[serde(default, deserialize_with = "deserialize_lenient_bool")]
    pub regex: bool,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SearchWithinFilesParams {
    #[schemars(description = "Directory to search from")]
    pub path: String,

    #[schemars(description = "Text to search for within file contents")]
    pub substring: String,

    #[schemars(description = "Maximum directory depth to search; 1 means only the directory itself (default: unlimited)")]
    #[serde(default)]
    pub depth: Option<usize>,

    #[schemars(description = "Maximum number of matching lines to return (default: 1000)")]
    #[serde(default)]
    pub max_results: Option<usize>,
}


// ============================================================================
// Transfer tools
// ============================================================================

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct TransferSendParams {
    #[schemars(description = "File or directory to send; must be inside an allowed directory")]
    pub path: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct TransferReceiveParams {
    #[schemars(description = "Code shared by the sender")]
    pub code: String,

    #[schemars(description = "Directory to save into (default: first allowed directory)")]
    #[serde(default)]
    pub output_dir: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct TransferCancelParams {
    #[schemars(description = "PID of the transfer, as shown by transfer_status")]
    pub pid: u32,
}

/// Accept `true`, `"true"`, `"1"` and friends; some clients send every
/// argument as a string
fn deserialize_lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Lenient {
        Bool(bool),
        Text(String),
        Number(i64),
    }

    match Lenient::deserialize(deserializer)? {
        Lenient::Bool(b) => Ok(b),
        Lenient::Number(n) => Ok(n != 0),
        Lenient::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" | "" => Ok(false),
            other => Err(serde::de::Error::custom(format!(
                "expected a boolean, got {other:?}"
            ))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lenient_bool_accepts_strings() {
        let p: ListDirParams =
            serde_json::from_value(serde_json::json!({"path": "/data", "recursive": "true"}))
                .unwrap();
        assert!(p.recursive);

        let p: ListDirParams =
            serde_json::from_value(serde_json::json!({"path": "/data", "recursive": false}))
                .unwrap();
        assert!(!p.recursive);

        let p: ListDirParams =
            serde_json::from_value(serde_json::json!({"path": "/data"})).unwrap();
        assert!(!p.recursive);
    }

    #[test]
    fn test_create_dir_defaults_to_recursive() {
        let p: CreateDirParams =
            serde_json::from_value(serde_json::json!({"path": "/data/new"})).unwrap();
        assert!(p.recursive);
    }

    #[test]
    fn test_lenient_bool_rejects_garbage() {
        let result: Result<DeleteFileParams, _> =
            serde_json::from_value(serde_json::json!({"path": "/x", "recursive": "maybe"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_receive_output_dir_is_optional() {
        let p: TransferReceiveParams =
            serde_json::from_value(serde_json::json!({"code": "abc123defg"})).unwrap();
        assert!(p.output_dir.is_none());
    }

    #[test]
    fn test_modify_defaults_to_all_occurrences() {
        let p: ModifyFileParams = serde_json::from_value(
            serde_json::json!({"path": "/data/a.txt", "find": "x", "replace": "y"}),
        )
        .unwrap();
        assert!(p.all_occurrences);
        assert!(!p.regex);
    }

    #[test]
    fn test_tree_defaults() {
        let p: TreeParams =
            serde_json::from_value(serde_json::json!({"path": "/data", "follow_symlinks": "yes"}))
                .unwrap();
        assert_eq!(p.depth, 3);
        assert!(p.follow_symlinks);
    }
}
