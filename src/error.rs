use serde_json::{Value, json};

use crate::schema::ValidationIssue;
use crate::types::{
    ERR_CODE_BAD_PARAMS, ERR_CODE_FORBIDDEN, ERR_CODE_INTERNAL, ERR_CODE_INVALID_REQ,
    ERR_CODE_NO_METHOD, ERR_CODE_PARSE, ERR_CODE_RATE_LIMIT, ERR_CODE_TIMEOUT, RpcError,
};

/// MCP error type for the crate.
///
/// Every failure that can reach a client maps onto exactly one JSON-RPC
/// error code through [`McpError::code`].
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("{0}")]
    MethodNotFound(String),
    #[error("{0}")]
    InvalidParams(String),
    /// Schema validation failure; `context` is e.g. "Invalid tool arguments".
    #[error("{context}: {}", join_issues(.issues))]
    Validation {
        context: String,
        issues: Vec<ValidationIssue>,
    },
    #[error("{0}")]
    Internal(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{message}")]
    RateLimit {
        message: String,
        retry_after: u64,
        limit: u32,
    },
    #[error("{0}")]
    Timeout(String),
    /// Failure raised by a tool handler. Contained as an `isError` result.
    #[error("{0}")]
    ToolExecution(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Other(String),
}

fn join_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl McpError {
    pub fn internal(message: impl Into<String>) -> Self {
        McpError::Internal(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        McpError::Forbidden(message.into())
    }

    pub fn other(message: impl Into<String>) -> Self {
        McpError::Other(message.into())
    }

    /// JSON-RPC error code for this error.
    pub fn code(&self) -> i32 {
        match self {
            McpError::Json(_) => ERR_CODE_PARSE,
            McpError::InvalidRequest(_) => ERR_CODE_INVALID_REQ,
            McpError::MethodNotFound(_) => ERR_CODE_NO_METHOD,
            McpError::InvalidParams(_) | McpError::Validation { .. } => ERR_CODE_BAD_PARAMS,
            McpError::Forbidden(_) => ERR_CODE_FORBIDDEN,
            McpError::RateLimit { .. } => ERR_CODE_RATE_LIMIT,
            McpError::Timeout(_) => ERR_CODE_TIMEOUT,
            McpError::Internal(_)
            | McpError::ToolExecution(_)
            | McpError::Io(_)
            | McpError::Other(_) => ERR_CODE_INTERNAL,
        }
    }

    /// Structured `data` payload attached to the error envelope, if any.
    pub fn data(&self) -> Option<Value> {
        match self {
            McpError::RateLimit {
                retry_after, limit, ..
            } => Some(json!({ "retryAfter": retry_after, "limit": limit })),
            McpError::Validation { issues, .. } => Some(json!({ "issues": issues })),
            _ => None,
        }
    }

    /// True for errors a guard or interceptor raises on purpose. These keep
    /// their own code instead of being folded into another class.
    pub fn is_access_error(&self) -> bool {
        matches!(
            self,
            McpError::Forbidden(_) | McpError::RateLimit { .. } | McpError::Timeout(_)
        )
    }

    /// Convert into the wire error object.
    pub fn to_rpc_error(&self) -> RpcError {
        RpcError {
            code: self.code(),
            message: self.to_string(),
            data: self.data(),
        }
    }
}
