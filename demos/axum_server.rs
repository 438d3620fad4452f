//! MCP server mounted on an axum route.
//!
//! Run with: `cargo run --example axum_server`
//! Then test with:
//!   curl -X POST http://localhost:3000/mcp \
//!     -H "Content-Type: application/json" \
//!     -d '{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"greet","arguments":{"name":"Ada"}}}'

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use mcpcore::{
    Deprecation, FnPromptHandler, FnResourceHandler, FnToolHandler, GuardBinding,
    InterceptorBinding, JsonRpcRequest, JsonRpcResponse, McpError, OneOrMany, Prompt,
    PromptMessage, RateLimitGuard, Resource, ResourceContent, Schema, Server, TimeoutInterceptor,
    Tool, ToolHandler, ToolResult, text_result,
};
use serde_json::Value;

/// A struct-based tool handler for the "echo" tool.
struct EchoHandler;

#[async_trait]
impl ToolHandler for EchoHandler {
    async fn call(&self, args: Value) -> Result<ToolResult, McpError> {
        let message = args
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("(empty)");
        Ok(text_result(format!("echo: {}", message)))
    }
}

async fn mcp(
    State(server): State<Arc<Server>>,
    Json(req): Json<JsonRpcRequest>,
) -> Json<JsonRpcResponse> {
    Json(server.handle(req).await)
}

fn echo_tool() -> Tool {
    Tool::new("echo", "Echo a message back", Arc::new(EchoHandler))
        .schema(Schema::object([("message", Schema::string())]))
        .deprecated(Deprecation::new().since("0.1.0").replaced_by("greet"))
}

fn greet_tool() -> Tool {
    let handler = FnToolHandler::new(|args: Value| async move {
        let name = args["name"].as_str().unwrap_or("world");
        let greeting = match args["style"].as_str() {
            Some("formal") => format!("Good day, {}.", name),
            _ => format!("Hey, {}!", name),
        };
        Ok(text_result(greeting))
    });
    let name = Schema::string().min_length(1).describe("Who to greet");
    let style = Schema::enumeration(["casual", "formal"]).with_default("casual");
    let limiter = RateLimitGuard::new(10, Duration::from_secs(60));
    Tool::new("greet", "Greet someone", handler)
        .schema(Schema::object([("name", name), ("style", style)]))
        .guard(GuardBinding::guard(limiter))
}

fn profile_resource() -> Resource {
    let handler = FnResourceHandler::new(|uri: String, vars| async move {
        let id = vars.get("id").cloned().unwrap_or_default();
        let body = format!(r#"{{"id": "{}", "plan": "free"}}"#, id);
        Ok(OneOrMany::One(ResourceContent::text(uri, "application/json", body)))
    });
    Resource::template("users://{id}/profile", "User profile", handler)
        .mime_type("application/json")
}

fn review_prompt() -> Prompt {
    let handler = FnPromptHandler::new(|args: Value| async move {
        let code = args["code"].as_str().unwrap_or_default();
        let request = format!("Review this code:\n{}", code);
        Ok(OneOrMany::One(PromptMessage::user(request)))
    });
    Prompt::new("review", handler)
        .description("Ask for a code review")
        .schema(Schema::object([("code", Schema::string())]))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let timeout = TimeoutInterceptor::new(Duration::from_secs(10));
    let server = Server::builder()
        .server_info("example-server", "0.1.0")
        .instructions("Try greet, echo, or read users://{id}/profile.")
        .interceptor(InterceptorBinding::interceptor(timeout))
        .tools([echo_tool(), greet_tool()])
        .resource(profile_resource())
        .prompt(review_prompt())
        .build();

    let app = Router::new()
        .route("/mcp", post(mcp))
        .with_state(Arc::new(server));

    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
    println!("MCP server listening on http://localhost:3000/mcp");
    axum::serve(listener, app).await.unwrap();
}
