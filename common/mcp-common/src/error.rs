//! Error handling utilities for MCP servers
//!
//! Tool failures are reported as `ErrorData` values. Domain errors carry a
//! machine-readable `kind` in the error data so clients can tell apart, for
//! example, a forbidden path from a broken one without parsing messages.

use rmcp::ErrorData as McpError;
use serde_json::json;

/// Broad class of a tool failure, which decides the JSON-RPC error code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The request is well-formed but not permitted
    Forbidden,
    /// The caller supplied bad arguments
    InvalidInput,
    /// The referenced entity does not exist
    NotFound,
    /// Anything the caller cannot fix by changing the request
    Internal,
}

/// Build an error tagged with a domain `kind`
///
/// ```rust,ignore
/// use mcp_common::{tagged_error, ErrorCategory};
///
/// let err = tagged_error(ErrorCategory::NotFound, "ProcessNotFound", "no process 42");
/// ```
pub fn tagged_error(
    category: ErrorCategory,
    kind: &'static str,
    message: impl Into<String>,
) -> McpError {
    let message = message.into();
    let data = Some(json!({ "kind": kind }));
    match category {
        ErrorCategory::Forbidden => McpError::invalid_request(message, data),
        ErrorCategory::InvalidInput => McpError::invalid_params(message, data),
        ErrorCategory::NotFound => McpError::resource_not_found(message, data),
        ErrorCategory::Internal => McpError::internal_error(message, data),
    }
}

/// Create an invalid params error with a message
pub fn invalid_params(message: impl Into<String>) -> McpError {
    McpError::invalid_params(message.into(), None)
}
