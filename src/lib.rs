//! `mcpcore`: the protocol dispatch core of an MCP (Model Context Protocol) server.
//!
//! Implements the MCP 2025-03-26 request surface as a pure protocol handler:
//! a capability registry of tools, resources and prompts, schema-driven
//! argument validation, URI-template resource resolution, and a guard /
//! interceptor pipeline wrapped around every invocation. Transports stay
//! outside: deserialize a request, call `Server::handle()`, serialize the
//! response.
//!
//! # Quick start
//!
//! ```rust
//! use mcpcore::{FnToolHandler, JsonRpcRequest, Schema, Server, Tool, text_result};
//! use serde_json::Value;
//!
//! # async fn example() {
//! let server = Server::builder()
//!     .server_info("my-server", "0.1.0")
//!     .tool(
//!         Tool::new("echo", "echoes", FnToolHandler::new(|args: Value| async move {
//!             let msg = args.get("message").and_then(|v| v.as_str()).unwrap_or("");
//!             Ok(text_result(msg))
//!         }))
//!         .schema(Schema::object([("message", Schema::string())])),
//!     )
//!     .build();
//!
//! let req: JsonRpcRequest = serde_json::from_str(
//!     r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"echo","arguments":{"message":"hi"}}}"#,
//! ).unwrap();
//! let resp = server.handle(req).await;
//! // resp implements Serialize: hand it to axum::Json, serde_json, etc.
//! let json = serde_json::to_string(&resp).unwrap();
//! # }
//! ```

pub mod builtin;
pub mod capability;
pub mod config;
pub mod deprecation;
pub mod error;
pub mod pipeline;
pub mod registry;
pub mod schema;
pub mod server;
pub mod translate;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export the most commonly used items at the crate root.
pub use builtin::{RateLimitGuard, TimeoutInterceptor};
pub use capability::{
    CapabilityKind, FnPromptHandler, FnResourceHandler, FnToolHandler, Prompt, PromptArgument,
    PromptHandler, Resource, ResourceHandler, Tool, ToolHandler,
};
pub use config::{ServerConfig, load_config, parse_config};
pub use deprecation::Deprecation;
pub use error::McpError;
pub use pipeline::{
    DefaultResolver, ExecutionContext, Guard, GuardBinding, Interceptor, InterceptorBinding,
    McpContext, Next, Resolver,
};
pub use registry::Registry;
pub use schema::{Schema, ValidationIssue};
pub use server::{ErrorHandler, Server, ServerBuilder};
pub use translate::{ParamDef, ParamType};
pub use types::{
    ContentBlock, JsonRpcRequest, JsonRpcResponse, OneOrMany, PROTOCOL_VERSION, PromptMessage,
    ResourceContent, Role, RpcError, ToolResult, error_result, new_error_response, text_result,
};
