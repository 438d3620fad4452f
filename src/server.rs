use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::FutureExt;
use futures::future::join_all;
use serde_json::{Value, json};

use crate::capability::{CapabilityKind, Prompt, Resource, Tool};
use crate::config::{self, ServerConfig};
use crate::error::McpError;
use crate::pipeline::{
    self, ExecutionContext, GuardBinding, InterceptorBinding, Pipeline, Resolver,
};
use crate::registry::{Registry, extract_uri_variables};
use crate::schema::Schema;
use crate::types::*;

/// Hook that may replace the `data` payload of outgoing error envelopes.
///
/// `Ok(None)` keeps the original payload. An `Err` or a panic is logged and
/// the original error is sent unchanged.
pub trait ErrorHandler: Send + Sync {
    fn on_error(&self, method: &str, error: &McpError) -> Result<Option<Value>, McpError>;
}

impl<F> ErrorHandler for F
where
    F: Fn(&str, &McpError) -> Result<Option<Value>, McpError> + Send + Sync,
{
    fn on_error(&self, method: &str, error: &McpError) -> Result<Option<Value>, McpError> {
        self(method, error)
    }
}

/// The MCP server. Create with `ServerBuilder`, then feed it requests.
pub struct Server {
    config: ServerConfig,
    registry: Arc<Registry>,
    pipeline: Pipeline,
    error_handler: Option<Arc<dyn ErrorHandler>>,
    initialized: AtomicBool,
}

impl Server {
    /// Create a new server builder.
    pub fn builder() -> ServerBuilder {
        ServerBuilder::default()
    }

    /// The capability registry. Items may be added or removed at runtime.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Whether an `initialize` request has been handled. Other methods are
    /// served regardless.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Route a JSON-RPC request to the appropriate MCP handler.
    ///
    /// Never fails: every error, including a panicking handler, becomes an
    /// error envelope carrying the request id.
    pub async fn handle(&self, req: JsonRpcRequest) -> JsonRpcResponse {
        let id = req.id.clone();
        let method = req.method.clone();

        let outcome = match AssertUnwindSafe(self.dispatch(req)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(method = %method, "handler panicked: {}", message);
                Err(McpError::internal(format!("Internal error: {}", message)))
            }
        };

        match outcome {
            Ok(result) => new_ok_response(id, result),
            Err(err) => self.error_response(id, &method, err),
        }
    }

    /// Handle several requests concurrently. Responses keep the input order.
    pub async fn handle_batch(&self, requests: Vec<JsonRpcRequest>) -> Vec<JsonRpcResponse> {
        join_all(requests.into_iter().map(|req| self.handle(req))).await
    }

    async fn dispatch(&self, req: JsonRpcRequest) -> Result<Value, McpError> {
        if req.jsonrpc != "2.0" {
            return Err(McpError::InvalidRequest("jsonrpc must be '2.0'".into()));
        }
        tracing::debug!(method = %req.method, id = ?req.id, "dispatch");

        match req.method.as_str() {
            "initialize" => self.handle_initialize(&req),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(self.handle_tools_list()),
            "tools/call" => self.handle_tools_call(&req).await,
            "resources/list" => Ok(self.handle_resources_list()),
            "resources/read" => self.handle_resources_read(&req).await,
            "prompts/list" => Ok(self.handle_prompts_list()),
            "prompts/get" => self.handle_prompts_get(&req).await,
            _ => Err(McpError::MethodNotFound(format!("Method not found: {}", req.method))),
        }
    }

    fn handle_initialize(&self, req: &JsonRpcRequest) -> Result<Value, McpError> {
        if let Some(params) = &req.params {
            if let Ok(p) = serde_json::from_value::<InitializeParams>(params.clone()) {
                let client_name = p.client_info.as_ref().map_or("", |c| c.name.as_str());
                let client_version = p.client_info.as_ref().map_or("", |c| c.version.as_str());
                tracing::info!(
                    client_name,
                    client_version,
                    protocol_version = ?p.protocol_version,
                    "initialize"
                );
            }
        }

        self.initialized.store(true, Ordering::SeqCst);

        let mut result = json!({
            "protocolVersion": self.config.protocol_version,
            "capabilities": serde_json::to_value(&self.config.capabilities)?,
            "serverInfo": serde_json::to_value(self.config.server_info())?,
        });
        if let Some(instructions) = &self.config.instructions {
            result["instructions"] = json!(instructions);
        }
        Ok(result)
    }

    fn handle_tools_list(&self) -> Value {
        let tools = self.registry.tools();
        let entries: Vec<Value> = tools.iter().map(|t| t.list_entry()).collect();
        json!({ "tools": entries })
    }

    async fn handle_tools_call(&self, req: &JsonRpcRequest) -> Result<Value, McpError> {
        let name = required_str(req, "name")?;
        let tool = self
            .registry
            .get_tool(name)
            .ok_or_else(|| not_found("Tool", name))?;
        tool.versioning
            .warn_if_deprecated(CapabilityKind::Tool, &tool.name);

        let args = validate(
            tool.schema.as_ref(),
            arguments(req),
            "Invalid tool arguments",
        )?;
        let ctx = ExecutionContext::new(
            CapabilityKind::Tool,
            req.clone(),
            tool.name.clone(),
            vec![args.clone()],
        );

        let handler = Arc::clone(&tool.handler);
        let terminal = pipeline::terminal(move || {
            let handler = Arc::clone(&handler);
            let args = args.clone();
            async move {
                match handler.call(args).await {
                    Ok(result) => serde_json::to_value(result).map_err(McpError::from),
                    Err(e) => Err(McpError::ToolExecution(e.to_string())),
                }
            }
        });

        let outcome = self
            .pipeline
            .run(&tool.guards, &tool.interceptors, &ctx, terminal)
            .await;
        match outcome {
            Err(McpError::ToolExecution(message)) => {
                tracing::debug!(tool = %tool.name, error = %message, "tool handler failed");
                Ok(serde_json::to_value(error_result(format!("Error: {}", message)))?)
            }
            other => other,
        }
    }

    fn handle_resources_list(&self) -> Value {
        let resources = self.registry.resources();
        let entries: Vec<Value> = resources.iter().map(|r| r.list_entry()).collect();
        json!({ "resources": entries })
    }

    async fn handle_resources_read(&self, req: &JsonRpcRequest) -> Result<Value, McpError> {
        let uri = required_str(req, "uri")?;

        let exact = self.registry.get_resource(uri).filter(|r| !r.is_template());
        let (resource, mut variables) = match exact {
            Some(resource) => (resource, HashMap::new()),
            None => {
                let resource = self
                    .registry
                    .find_resource_by_pattern(uri)
                    .ok_or_else(|| not_found("Resource", uri))?;
                let variables = resource
                    .uri_template()
                    .map(|template| extract_uri_variables(template, uri))
                    .unwrap_or_default();
                (resource, variables)
            }
        };
        resource
            .versioning
            .warn_if_deprecated(CapabilityKind::Resource, resource.key());

        if resource.is_template() {
            let checked = validate(
                resource.schema.as_ref(),
                json!(variables),
                "Invalid resource variables",
            )?;
            variables.extend(string_map(checked));
        }

        let ctx = ExecutionContext::new(
            CapabilityKind::Resource,
            req.clone(),
            resource.key(),
            vec![json!(uri), json!(variables)],
        );

        let handler = Arc::clone(&resource.handler);
        let uri_owned = uri.to_string();
        let terminal = pipeline::terminal(move || {
            let handler = Arc::clone(&handler);
            let uri = uri_owned.clone();
            let variables = variables.clone();
            async move {
                match handler.read(&uri, variables).await {
                    Ok(contents) => serde_json::to_value(contents.into_vec())
                        .map(|contents| json!({ "contents": contents }))
                        .map_err(McpError::from),
                    Err(e) => Err(surface_handler_error("resource", &uri, e)),
                }
            }
        });

        self.pipeline
            .run(&resource.guards, &resource.interceptors, &ctx, terminal)
            .await
    }

    fn handle_prompts_list(&self) -> Value {
        let prompts = self.registry.prompts();
        let entries: Vec<Value> = prompts.iter().map(|p| p.list_entry()).collect();
        json!({ "prompts": entries })
    }

    async fn handle_prompts_get(&self, req: &JsonRpcRequest) -> Result<Value, McpError> {
        let name = required_str(req, "name")?;
        let prompt = self
            .registry
            .get_prompt(name)
            .ok_or_else(|| not_found("Prompt", name))?;
        prompt
            .versioning
            .warn_if_deprecated(CapabilityKind::Prompt, &prompt.name);

        let args = validate(
            prompt.schema.as_ref(),
            arguments(req),
            "Invalid prompt arguments",
        )?;
        let ctx = ExecutionContext::new(
            CapabilityKind::Prompt,
            req.clone(),
            prompt.name.clone(),
            vec![args.clone()],
        );

        let handler = Arc::clone(&prompt.handler);
        let prompt_name = prompt.name.clone();
        let description = prompt.description.clone();
        let terminal = pipeline::terminal(move || {
            let handler = Arc::clone(&handler);
            let args = args.clone();
            let prompt_name = prompt_name.clone();
            let description = description.clone();
            async move {
                match handler.get(args).await {
                    Ok(messages) => serde_json::to_value(messages.into_vec())
                        .map(|messages| prompt_result(description, messages))
                        .map_err(McpError::from),
                    Err(e) => Err(surface_handler_error("prompt", &prompt_name, e)),
                }
            }
        });

        self.pipeline
            .run(&prompt.guards, &prompt.interceptors, &ctx, terminal)
            .await
    }

    fn error_response(&self, id: Option<Value>, method: &str, err: McpError) -> JsonRpcResponse {
        let mut error = err.to_rpc_error();

        if let Some(handler) = &self.error_handler {
            match std::panic::catch_unwind(AssertUnwindSafe(|| handler.on_error(method, &err))) {
                Ok(Ok(Some(data))) => error.data = Some(data),
                Ok(Ok(None)) => {}
                Ok(Err(handler_err)) => {
                    tracing::error!(method, error = %handler_err, "custom error handler failed");
                }
                Err(panic) => {
                    tracing::error!(
                        method,
                        "custom error handler panicked: {}",
                        panic_message(panic.as_ref())
                    );
                }
            }
        }

        new_error_response(id, error)
    }
}

/// `params.<key>` as a string, or InvalidParams.
fn required_str<'a>(req: &'a JsonRpcRequest, key: &str) -> Result<&'a str, McpError> {
    req.params
        .as_ref()
        .and_then(|p| p.get(key))
        .and_then(Value::as_str)
        .ok_or_else(|| McpError::InvalidParams(format!("Missing required parameter: {}", key)))
}

/// `params.arguments`, defaulting to an empty object.
fn arguments(req: &JsonRpcRequest) -> Value {
    req.params
        .as_ref()
        .and_then(|p| p.get("arguments"))
        .filter(|a| !a.is_null())
        .cloned()
        .unwrap_or_else(|| json!({}))
}

fn validate(schema: Option<&Schema>, value: Value, context: &str) -> Result<Value, McpError> {
    match schema {
        Some(schema) => schema
            .validate(&value)
            .map_err(|issues| McpError::Validation {
                context: context.to_string(),
                issues,
            }),
        None => Ok(value),
    }
}

fn not_found(what: &str, key: &str) -> McpError {
    McpError::MethodNotFound(format!("{} not found: {}", what, key))
}

/// Validated template variables as handler bindings. Non-string values keep
/// their JSON text.
fn string_map(value: Value) -> HashMap<String, String> {
    let Value::Object(map) = value else {
        return HashMap::new();
    };
    map.into_iter()
        .map(|(key, value)| match value {
            Value::String(s) => (key, s),
            other => (key, other.to_string()),
        })
        .collect()
}

fn prompt_result(description: Option<String>, messages: Value) -> Value {
    json!({ "description": description, "messages": messages })
}

/// Resource and prompt handler failures become InternalError; access errors
/// keep their own code.
fn surface_handler_error(kind: &str, target: &str, err: McpError) -> McpError {
    if err.is_access_error() {
        return err;
    }
    tracing::debug!(kind, target, error = %err, "handler failed");
    McpError::Internal(err.to_string())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".into()
    }
}

/// Builder for constructing an MCP Server.
#[derive(Default)]
pub struct ServerBuilder {
    config: ServerConfig,
    tools: Vec<Tool>,
    resources: Vec<Resource>,
    prompts: Vec<Prompt>,
    guards: Vec<GuardBinding>,
    interceptors: Vec<InterceptorBinding>,
    resolver: Option<Arc<dyn Resolver>>,
    error_handler: Option<Arc<dyn ErrorHandler>>,
}

impl ServerBuilder {
    /// Replace the whole server configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Load the server configuration from a JSON file.
    pub fn config_file(mut self, path: impl AsRef<Path>) -> Self {
        match config::load_config(path) {
            Ok(config) => self.config = config,
            Err(e) => tracing::error!("load config file: {}", e),
        }
        self
    }

    /// Parse the server configuration from raw JSON bytes.
    pub fn config_json(mut self, data: &[u8]) -> Self {
        match config::parse_config(data) {
            Ok(config) => self.config = config,
            Err(e) => tracing::error!("parse config json: {}", e),
        }
        self
    }

    /// Set server name and version.
    pub fn server_info(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.config.name = name.into();
        self.config.version = version.into();
        self
    }

    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.config.instructions = Some(instructions.into());
        self
    }

    pub fn capabilities(mut self, capabilities: ServerCapabilities) -> Self {
        self.config.capabilities = capabilities;
        self
    }

    pub fn tool(mut self, tool: Tool) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn tools(mut self, tools: impl IntoIterator<Item = Tool>) -> Self {
        self.tools.extend(tools);
        self
    }

    pub fn resource(mut self, resource: Resource) -> Self {
        self.resources.push(resource);
        self
    }

    pub fn resources(mut self, resources: impl IntoIterator<Item = Resource>) -> Self {
        self.resources.extend(resources);
        self
    }

    pub fn prompt(mut self, prompt: Prompt) -> Self {
        self.prompts.push(prompt);
        self
    }

    pub fn prompts(mut self, prompts: impl IntoIterator<Item = Prompt>) -> Self {
        self.prompts.extend(prompts);
        self
    }

    /// Guard applied to every capability, ahead of its own guards.
    pub fn guard(mut self, guard: GuardBinding) -> Self {
        self.guards.push(guard);
        self
    }

    /// Interceptor wrapped around every capability, outside its own ones.
    pub fn interceptor(mut self, interceptor: InterceptorBinding) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    /// Resolver for named guard / interceptor bindings.
    pub fn resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn error_handler(mut self, handler: Arc<dyn ErrorHandler>) -> Self {
        self.error_handler = Some(handler);
        self
    }

    /// Build the server.
    pub fn build(self) -> Server {
        let registry = Registry::new();
        registry.register_tools(self.tools);
        registry.register_resources(self.resources);
        registry.register_prompts(self.prompts);

        let pipeline = match self.resolver {
            Some(resolver) => Pipeline::new(resolver),
            None => Pipeline::default(),
        }
        .with_guards(self.guards)
        .with_interceptors(self.interceptors);

        Server {
            config: self.config,
            registry: Arc::new(registry),
            pipeline,
            error_handler: self.error_handler,
            initialized: AtomicBool::new(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::builtin::{RateLimitGuard, TimeoutInterceptor};
    use crate::capability::{
        FnPromptHandler, FnResourceHandler, FnToolHandler, PromptArgument, ToolHandler,
    };
    use crate::deprecation::Deprecation;
    use crate::pipeline::Guard;
    use crate::testing::LogBuffer;
    use crate::translate::{ParamDef, ParamType};

    struct EchoHandler;

    #[async_trait]
    impl ToolHandler for EchoHandler {
        async fn call(&self, args: Value) -> Result<ToolResult, McpError> {
            let msg = args.get("msg").and_then(|v| v.as_str()).unwrap_or("no msg");
            Ok(text_result(format!("echo: {}", msg)))
        }
    }

    struct PanicHandler;

    #[async_trait]
    impl ToolHandler for PanicHandler {
        async fn call(&self, _args: Value) -> Result<ToolResult, McpError> {
            panic!("kaboom")
        }
    }

    struct DenyAll;

    #[async_trait]
    impl Guard for DenyAll {
        async fn can_activate(&self, _ctx: &ExecutionContext) -> Result<bool, McpError> {
            Ok(false)
        }
    }

    fn echo_tool() -> Tool {
        Tool::new("echo", "echoes", Arc::new(EchoHandler))
            .schema(Schema::object([("msg", Schema::string())]))
    }

    fn failing_tool() -> Tool {
        let handler = FnToolHandler::new(|_args: Value| async move {
            Err(McpError::other("boom"))
        });
        Tool::new("fail", "always fails", handler)
    }

    fn profile_resource() -> Resource {
        let handler = FnResourceHandler::new(|uri: String, vars| async move {
            let id = vars.get("id").cloned().unwrap_or_default();
            let body = format!("user {}", id);
            Ok(OneOrMany::One(ResourceContent::text(uri, "text/plain", body)))
        });
        Resource::template("users://{id}/profile", "profile", handler)
            .schema(Schema::object([("id", Schema::string().min_length(2))]))
    }

    fn broken_resource() -> Resource {
        let handler = FnResourceHandler::new(|_uri: String, _vars| async move {
            Err(McpError::other("disk on fire"))
        });
        Resource::fixed("broken://x", "broken", handler)
    }

    fn greet_prompt() -> Prompt {
        let handler = FnPromptHandler::new(|args: Value| async move {
            let name = args["name"].as_str().unwrap_or("stranger").to_string();
            Ok(OneOrMany::Many(vec![
                PromptMessage::user(format!("Say hello to {}", name)),
                PromptMessage::assistant("Hello!"),
            ]))
        });
        Prompt::new("greet", handler)
            .description("Greets someone")
            .schema(Schema::object([("name", Schema::string())]))
    }

    fn test_server() -> Server {
        let csv = FnResourceHandler::new(|uri: String, _vars| async move {
            Ok(OneOrMany::One(ResourceContent::text(uri, "text/csv", "a,b")))
        });
        Server::builder()
            .server_info("test-server", "0.1.0")
            .tools([echo_tool(), failing_tool()])
            .resources([
                Resource::fixed("file:///test.csv", "test", csv).mime_type("text/csv"),
                profile_resource(),
                broken_resource(),
            ])
            .prompt(greet_prompt())
            .build()
    }

    fn make_req(method: &str, id: Option<Value>, params: Option<Value>) -> JsonRpcRequest {
        JsonRpcRequest {
            jsonrpc: "2.0".into(),
            id,
            method: method.into(),
            params,
        }
    }

    fn request(method: &str, params: Value) -> JsonRpcRequest {
        make_req(method, Some(json!(1)), Some(params))
    }

    fn bare(method: &str) -> JsonRpcRequest {
        make_req(method, Some(json!(1)), None)
    }

    fn call(name: &str, arguments: Value) -> JsonRpcRequest {
        request("tools/call", json!({"name": name, "arguments": arguments}))
    }

    #[tokio::test]
    async fn test_bad_jsonrpc_version() {
        let srv = test_server();
        let req = JsonRpcRequest {
            jsonrpc: "1.0".into(),
            id: Some(json!(1)),
            method: "ping".into(),
            params: None,
        };
        let resp = srv.handle(req).await;
        assert_eq!(resp.error.unwrap().code, ERR_CODE_INVALID_REQ);
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let srv = test_server();
        let resp = srv.handle(bare("nope")).await;
        assert!(resp.result.is_none());
        let err = resp.error.unwrap();
        assert_eq!(err.code, ERR_CODE_NO_METHOD);
        assert!(err.message.contains("nope"));
    }

    #[tokio::test]
    async fn test_id_is_echoed() {
        let srv = test_server();
        for id in [json!(7), json!("req-7"), Value::Null] {
            let ok = srv.handle(make_req("ping", Some(id.clone()), None)).await;
            assert_eq!(ok.id, Some(id.clone()));
            assert!(ok.result.is_some() && ok.error.is_none());

            let err = srv.handle(make_req("nope", Some(id.clone()), None)).await;
            assert_eq!(err.id, Some(id));
            assert!(err.result.is_none() && err.error.is_some());
        }
    }

    #[tokio::test]
    async fn test_initialize() {
        let srv = Server::builder()
            .server_info("test-server", "0.1.0")
            .instructions("Use echo.")
            .build();
        assert!(!srv.is_initialized());

        let params = json!({
            "protocolVersion": "2025-03-26",
            "capabilities": {},
            "clientInfo": {"name": "test", "version": "0.1"}
        });
        let resp = srv.handle(request("initialize", params)).await;
        let result = resp.result.unwrap();
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(result["serverInfo"]["name"], "test-server");
        assert_eq!(result["serverInfo"]["version"], "0.1.0");
        assert_eq!(result["instructions"], "Use echo.");
        assert!(result["capabilities"]["tools"].is_object());
        assert!(srv.is_initialized());
    }

    #[tokio::test]
    async fn test_methods_served_before_initialize() {
        let srv = test_server();
        let resp = srv.handle(bare("tools/list")).await;
        assert!(resp.error.is_none());
        assert!(!srv.is_initialized());
    }

    #[tokio::test]
    async fn test_config_json() {
        let srv = Server::builder()
            .config_json(br#"{"name":"from-json","version":"9.9.9"}"#)
            .build();
        assert_eq!(srv.config().name, "from-json");

        let fallback = Server::builder().config_json(b"{broken").build();
        assert_eq!(fallback.config(), &ServerConfig::default());
    }

    #[tokio::test]
    async fn test_ping() {
        let srv = test_server();
        let resp = srv.handle(bare("ping")).await;
        assert_eq!(resp.result.unwrap(), json!({}));
    }

    #[tokio::test]
    async fn test_tools_list() {
        let srv = Server::builder()
            .tool(echo_tool())
            .tool(
                failing_tool()
                    .param(ParamDef::new("reason", ParamType::String).optional())
                    .deprecated(Deprecation::new().replaced_by("echo")),
            )
            .build();
        let resp = srv.handle(bare("tools/list")).await;
        let result = resp.result.unwrap();
        let tools = result["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0]["name"], "echo");
        assert_eq!(tools[0]["inputSchema"]["required"], json!(["msg"]));
        assert!(tools[0].get("deprecated").is_none());

        let reason = &tools[1]["inputSchema"]["properties"]["reason"];
        assert_eq!(reason["type"], "string");
        assert_eq!(tools[1]["inputSchema"]["required"], json!([]));
        assert_eq!(tools[1]["deprecated"], true);
        assert_eq!(tools[1]["deprecationMessage"], "Use 'echo' instead.");
    }

    #[tokio::test]
    async fn test_tools_call_success() {
        let srv = test_server();
        let resp = srv.handle(call("echo", json!({"msg": "hello"}))).await;
        let result: ToolResult = serde_json::from_value(resp.result.unwrap()).unwrap();
        assert_eq!(result.content[0].text.as_deref(), Some("echo: hello"));
        assert!(!result.is_error);
    }

    #[tokio::test]
    async fn test_tools_call_missing_name() {
        let srv = test_server();
        let params = json!({"arguments": {}});
        let resp = srv.handle(request("tools/call", params)).await;
        assert_eq!(resp.error.unwrap().code, ERR_CODE_BAD_PARAMS);

        let params = json!({"name": 5});
        let resp = srv.handle(request("tools/call", params)).await;
        assert_eq!(resp.error.unwrap().code, ERR_CODE_BAD_PARAMS);
    }

    #[tokio::test]
    async fn test_tools_call_unknown_tool() {
        let srv = test_server();
        let resp = srv.handle(call("nonexistent", json!({}))).await;
        let err = resp.error.unwrap();
        assert_eq!(err.code, ERR_CODE_NO_METHOD);
        assert_eq!(err.message, "Tool not found: nonexistent");
    }

    #[tokio::test]
    async fn test_tools_call_invalid_arguments() {
        let srv = test_server();
        let resp = srv.handle(call("echo", json!({"msg": 42}))).await;
        let err = resp.error.unwrap();
        assert_eq!(err.code, ERR_CODE_BAD_PARAMS);
        assert!(err.message.contains("Invalid tool arguments"));
        assert_eq!(err.data.unwrap()["issues"][0]["path"], "msg");

        let params = json!({"name": "echo"});
        let resp = srv.handle(request("tools/call", params)).await;
        let err = resp.error.unwrap();
        assert!(err.message.contains("Invalid tool arguments"));
    }

    #[tokio::test]
    async fn test_tools_call_handler_error_is_result() {
        let srv = test_server();
        let resp = srv.handle(call("fail", json!({}))).await;
        assert!(resp.error.is_none());
        assert_eq!(
            resp.result.unwrap(),
            json!({"content": [{"type": "text", "text": "Error: boom"}], "isError": true})
        );
    }

    #[tokio::test]
    async fn test_tools_call_applies_defaults() {
        let handler = FnToolHandler::new(|args: Value| async move {
            Ok(text_result(args["limit"].to_string()))
        });
        let schema = Schema::object([("limit", Schema::integer().with_default(10))]);
        let srv = Server::builder()
            .tool(Tool::new("page", "pages", handler).schema(schema))
            .build();
        let resp = srv.handle(call("page", json!({}))).await;
        let result: ToolResult = serde_json::from_value(resp.result.unwrap()).unwrap();
        assert_eq!(result.content[0].text.as_deref(), Some("10"));
    }

    #[tokio::test]
    async fn test_handler_panic_is_internal_error() {
        let srv = Server::builder()
            .tool(Tool::new("explode", "panics", Arc::new(PanicHandler)))
            .build();
        let resp = srv.handle(call("explode", json!({}))).await;
        let err = resp.error.unwrap();
        assert_eq!(err.code, ERR_CODE_INTERNAL);
        assert!(err.message.contains("kaboom"));
        assert_eq!(resp.id, Some(json!(1)));
    }

    #[tokio::test]
    async fn test_guard_denial_is_forbidden() {
        let srv = Server::builder()
            .tool(echo_tool().guard(GuardBinding::guard(DenyAll)))
            .build();
        let resp = srv.handle(call("echo", json!({"msg": "hi"}))).await;
        let err = resp.error.unwrap();
        assert_eq!(err.code, ERR_CODE_FORBIDDEN);
        assert!(err.message.contains("DenyAll"));
    }

    #[tokio::test]
    async fn test_global_guard_applies_to_every_kind() {
        let srv = Server::builder()
            .guard(GuardBinding::guard(DenyAll))
            .prompt(greet_prompt())
            .build();
        let params = json!({"name": "greet", "arguments": {"name": "x"}});
        let resp = srv.handle(request("prompts/get", params)).await;
        assert_eq!(resp.error.unwrap().code, ERR_CODE_FORBIDDEN);
    }

    #[tokio::test]
    async fn test_rate_limited_tool() {
        let limiter = RateLimitGuard::new(2, Duration::from_secs(60));
        let srv = Server::builder()
            .tool(echo_tool().guard(GuardBinding::guard(limiter)))
            .build();
        for _ in 0..2 {
            let resp = srv.handle(call("echo", json!({"msg": "hi"}))).await;
            assert!(resp.error.is_none());
        }
        let resp = srv.handle(call("echo", json!({"msg": "hi"}))).await;
        let err = resp.error.unwrap();
        assert_eq!(err.code, ERR_CODE_RATE_LIMIT);
        let data = err.data.unwrap();
        assert_eq!(data["limit"], 2);
        assert!(data["retryAfter"].as_u64().unwrap() > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tool_timeout() {
        let handler = FnToolHandler::new(|_args: Value| async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(text_result("late"))
        });
        let timeout = TimeoutInterceptor::new(Duration::from_millis(100));
        let tool = Tool::new("slow", "sleeps", handler)
            .interceptor(InterceptorBinding::interceptor(timeout));
        let srv = Server::builder().tool(tool).build();
        let err = srv.handle(call("slow", json!({}))).await.error.unwrap();
        assert_eq!(err.code, ERR_CODE_TIMEOUT);
    }

    #[tokio::test]
    async fn test_resources_list() {
        let srv = test_server();
        let resp = srv.handle(bare("resources/list")).await;
        let result = resp.result.unwrap();
        let resources = result["resources"].as_array().unwrap();
        assert_eq!(resources.len(), 3);
        assert_eq!(resources[0]["uri"], "file:///test.csv");
        assert_eq!(resources[0]["mimeType"], "text/csv");
        assert_eq!(resources[1]["uri"], "users://{id}/profile");
    }

    #[tokio::test]
    async fn test_resources_read_static() {
        let srv = test_server();
        let params = json!({"uri": "file:///test.csv"});
        let resp = srv.handle(request("resources/read", params)).await;
        let result = resp.result.unwrap();
        let contents = result["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 1);
        assert_eq!(contents[0]["uri"], "file:///test.csv");
        assert_eq!(contents[0]["text"], "a,b");
    }

    #[tokio::test]
    async fn test_resources_read_template() {
        let srv = test_server();
        let params = json!({"uri": "users://42/profile"});
        let resp = srv.handle(request("resources/read", params)).await;
        let result = resp.result.unwrap();
        assert_eq!(result["contents"][0]["text"], "user 42");
    }

    #[tokio::test]
    async fn test_resources_read_applies_variable_defaults() {
        let handler = FnResourceHandler::new(|uri: String, vars| async move {
            let id = vars.get("id").cloned().unwrap_or_default();
            let format = vars.get("format").cloned().unwrap_or_default();
            let body = format!("{} as {}", id, format);
            Ok(OneOrMany::One(ResourceContent::text(uri, "text/plain", body)))
        });
        let format = Schema::enumeration(["json", "text"]).with_default("json");
        let report = Resource::template("reports://{id}", "report", handler)
            .schema(Schema::object([("id", Schema::string()), ("format", format)]));
        let srv = Server::builder().resource(report).build();

        let params = json!({"uri": "reports://q3"});
        let resp = srv.handle(request("resources/read", params)).await;
        let result = resp.result.unwrap();
        assert_eq!(result["contents"][0]["text"], "q3 as json");
    }

    #[tokio::test]
    async fn test_resources_read_invalid_variables() {
        let srv = test_server();
        let params = json!({"uri": "users://7/profile"});
        let resp = srv.handle(request("resources/read", params)).await;
        let err = resp.error.unwrap();
        assert_eq!(err.code, ERR_CODE_BAD_PARAMS);
        assert!(err.message.contains("Invalid resource variables"));
    }

    #[tokio::test]
    async fn test_resources_read_not_found() {
        let srv = test_server();
        let params = json!({"uri": "users://42/settings"});
        let resp = srv.handle(request("resources/read", params)).await;
        let err = resp.error.unwrap();
        assert_eq!(err.code, ERR_CODE_NO_METHOD);
        assert_eq!(err.message, "Resource not found: users://42/settings");
    }

    #[tokio::test]
    async fn test_resources_read_missing_uri() {
        let srv = test_server();
        let resp = srv.handle(request("resources/read", json!({}))).await;
        assert_eq!(resp.error.unwrap().code, ERR_CODE_BAD_PARAMS);
    }

    #[tokio::test]
    async fn test_resources_read_handler_error_is_internal() {
        let srv = test_server();
        let params = json!({"uri": "broken://x"});
        let resp = srv.handle(request("resources/read", params)).await;
        assert!(resp.result.is_none());
        let err = resp.error.unwrap();
        assert_eq!(err.code, ERR_CODE_INTERNAL);
        assert!(err.message.contains("disk on fire"));
    }

    #[tokio::test]
    async fn test_prompts_list() {
        let srv = test_server();
        let resp = srv.handle(bare("prompts/list")).await;
        let result = resp.result.unwrap();
        let prompts = result["prompts"].as_array().unwrap();
        assert_eq!(prompts[0]["name"], "greet");
        assert_eq!(prompts[0]["description"], "Greets someone");
        let expected = vec![PromptArgument::new("name", true)];
        assert_eq!(prompts[0]["arguments"], json!(expected));
    }

    #[tokio::test]
    async fn test_prompts_get() {
        let srv = test_server();
        let params = json!({"name": "greet", "arguments": {"name": "Ada"}});
        let resp = srv.handle(request("prompts/get", params)).await;
        let result = resp.result.unwrap();
        assert_eq!(result["description"], "Greets someone");
        let messages = result["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[0]["content"]["text"], "Say hello to Ada");
    }

    #[tokio::test]
    async fn test_prompts_get_errors() {
        let srv = test_server();
        let resp = srv.handle(request("prompts/get", json!({}))).await;
        assert_eq!(resp.error.unwrap().code, ERR_CODE_BAD_PARAMS);

        let params = json!({"name": "missing"});
        let resp = srv.handle(request("prompts/get", params)).await;
        let err = resp.error.unwrap();
        assert_eq!(err.code, ERR_CODE_NO_METHOD);
        assert_eq!(err.message, "Prompt not found: missing");

        let params = json!({"name": "greet", "arguments": {"name": 1}});
        let resp = srv.handle(request("prompts/get", params)).await;
        let err = resp.error.unwrap();
        assert!(err.message.contains("Invalid prompt arguments"));
    }

    #[tokio::test]
    async fn test_prompt_handler_error_is_internal() {
        let handler = FnPromptHandler::new(|_args: Value| async move {
            Err(McpError::other("no template"))
        });
        let srv = Server::builder()
            .prompt(Prompt::new("bad", handler))
            .build();
        let params = json!({"name": "bad"});
        let resp = srv.handle(request("prompts/get", params)).await;
        assert_eq!(resp.error.unwrap().code, ERR_CODE_INTERNAL);
    }

    #[tokio::test]
    async fn test_deprecated_tool_logs_warning() {
        let (logs, _guard) = LogBuffer::capture();
        let srv = Server::builder()
            .tool(echo_tool().deprecated(Deprecation::new().since("1.0")))
            .build();
        let resp = srv.handle(call("echo", json!({"msg": "hi"}))).await;
        assert!(resp.error.is_none());

        let logs = logs.contents();
        assert!(logs.contains("WARN"));
        assert!(logs.contains("tool 'echo' is deprecated: Deprecated since 1.0."));
    }

    #[tokio::test]
    async fn test_deprecated_resource_and_prompt_log_warnings() {
        let (logs, _guard) = LogBuffer::capture();
        let srv = Server::builder()
            .resource(profile_resource().deprecated(Deprecation::new().since("1.0")))
            .prompt(greet_prompt().deprecated(Deprecation::new().replaced_by("hello")))
            .build();

        let params = json!({"uri": "users://42/profile"});
        let resp = srv.handle(request("resources/read", params)).await;
        assert!(resp.error.is_none());
        let params = json!({"name": "greet", "arguments": {"name": "Ada"}});
        let resp = srv.handle(request("prompts/get", params)).await;
        assert!(resp.error.is_none());

        let logs = logs.contents();
        assert_eq!(logs.matches("WARN").count(), 2);
        assert!(logs.contains("resource 'users://{id}/profile' is deprecated"));
        assert!(logs.contains("prompt 'greet' is deprecated: Use 'hello' instead."));
    }

    #[tokio::test]
    async fn test_batch_preserves_order() {
        let srv = test_server();
        let batch = vec![
            make_req("ping", Some(json!(1)), None),
            make_req("nope", Some(json!(2)), None),
            call("echo", json!({"msg": "third"})),
        ];
        let responses = srv.handle_batch(batch).await;
        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0].id, Some(json!(1)));
        assert!(responses[1].is_error());
        assert_eq!(responses[1].id, Some(json!(2)));
        assert!(!responses[2].is_error());
    }

    #[tokio::test]
    async fn test_error_handler_sets_data() {
        let handler = |method: &str, err: &McpError| -> Result<Option<Value>, McpError> {
            Ok(Some(json!({"method": method, "code": err.code()})))
        };
        let srv = Server::builder().error_handler(Arc::new(handler)).build();
        let err = srv.handle(bare("nope")).await.error.unwrap();
        assert_eq!(err.data.unwrap(), json!({"method": "nope", "code": -32601}));
    }

    #[tokio::test]
    async fn test_failing_error_handler_keeps_original() {
        let handler = |_method: &str, _err: &McpError| -> Result<Option<Value>, McpError> {
            Err(McpError::other("handler broke"))
        };
        let srv = Server::builder()
            .resource(broken_resource())
            .error_handler(Arc::new(handler))
            .build();
        let params = json!({"uri": "broken://x"});
        let resp = srv.handle(request("resources/read", params)).await;
        let err = resp.error.unwrap();
        assert_eq!(err.code, ERR_CODE_INTERNAL);
        assert!(err.message.contains("disk on fire"));
        assert!(err.data.is_none());
    }

    #[tokio::test]
    async fn test_panicking_error_handler_keeps_original() {
        let handler = |_method: &str, _err: &McpError| -> Result<Option<Value>, McpError> {
            panic!("handler exploded")
        };
        let srv = Server::builder().error_handler(Arc::new(handler)).build();
        let err = srv.handle(bare("nope")).await.error.unwrap();
        assert_eq!(err.code, ERR_CODE_NO_METHOD);
        assert!(err.data.is_none());
    }

    #[tokio::test]
    async fn test_runtime_registration() {
        let srv = Server::builder().build();
        srv.registry().register_tool(echo_tool());
        let resp = srv.handle(call("echo", json!({"msg": "late"}))).await;
        assert!(resp.error.is_none());

        assert!(srv.registry().unregister_tool("echo"));
        let resp = srv.handle(call("echo", json!({"msg": "late"}))).await;
        assert_eq!(resp.error.unwrap().code, ERR_CODE_NO_METHOD);
    }
}
