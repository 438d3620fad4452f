//! Capability definitions: tools, resources and prompts with their handlers.
//!
//! Definitions are plain values built by the host and handed to the
//! [`Registry`](crate::Registry). Nothing here inspects handler signatures;
//! parameters and arguments come only from explicit metadata or a [`Schema`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::deprecation::{Deprecation, Versioning};
use crate::error::McpError;
use crate::pipeline::{GuardBinding, InterceptorBinding};
use crate::schema::Schema;
use crate::translate::{
    ParamDef, params_to_input_schema, schema_to_flat_params, schema_to_json_schema,
};
use crate::types::{OneOrMany, PromptMessage, ResourceContent, ToolResult};

/// The three capability categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityKind {
    Tool,
    Resource,
    Prompt,
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CapabilityKind::Tool => "tool",
            CapabilityKind::Resource => "resource",
            CapabilityKind::Prompt => "prompt",
        })
    }
}

// ── Handlers ──

/// Handler trait for MCP tools. Implement this or use closures.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: Value) -> Result<ToolResult, McpError>;
}

/// Handler trait for MCP resources.
///
/// `variables` holds the URI template bindings; it is empty for static resources.
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    async fn read(
        &self,
        uri: &str,
        variables: HashMap<String, String>,
    ) -> Result<OneOrMany<ResourceContent>, McpError>;
}

/// Handler trait for MCP prompts.
#[async_trait]
pub trait PromptHandler: Send + Sync {
    async fn get(&self, args: Value) -> Result<OneOrMany<PromptMessage>, McpError>;
}

/// Wraps an async closure into a ToolHandler.
pub struct FnToolHandler<F> {
    f: F,
}

impl<F, Fut> FnToolHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ToolResult, McpError>> + Send + 'static,
{
    pub fn new(f: F) -> Arc<dyn ToolHandler> {
        Arc::new(Self { f })
    }
}

#[async_trait]
impl<F, Fut> ToolHandler for FnToolHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ToolResult, McpError>> + Send + 'static,
{
    async fn call(&self, args: Value) -> Result<ToolResult, McpError> {
        (self.f)(args).await
    }
}

/// Wraps an async closure into a ResourceHandler.
pub struct FnResourceHandler<F> {
    f: F,
}

impl<F, Fut> FnResourceHandler<F>
where
    F: Fn(String, HashMap<String, String>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<OneOrMany<ResourceContent>, McpError>> + Send + 'static,
{
    pub fn new(f: F) -> Arc<dyn ResourceHandler> {
        Arc::new(Self { f })
    }
}

#[async_trait]
impl<F, Fut> ResourceHandler for FnResourceHandler<F>
where
    F: Fn(String, HashMap<String, String>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<OneOrMany<ResourceContent>, McpError>> + Send + 'static,
{
    async fn read(
        &self,
        uri: &str,
        variables: HashMap<String, String>,
    ) -> Result<OneOrMany<ResourceContent>, McpError> {
        (self.f)(uri.to_string(), variables).await
    }
}

/// Wraps an async closure into a PromptHandler.
pub struct FnPromptHandler<F> {
    f: F,
}

impl<F, Fut> FnPromptHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<OneOrMany<PromptMessage>, McpError>> + Send + 'static,
{
    pub fn new(f: F) -> Arc<dyn PromptHandler> {
        Arc::new(Self { f })
    }
}

#[async_trait]
impl<F, Fut> PromptHandler for FnPromptHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<OneOrMany<PromptMessage>, McpError>> + Send + 'static,
{
    async fn get(&self, args: Value) -> Result<OneOrMany<PromptMessage>, McpError> {
        (self.f)(args).await
    }
}

// ── Tool ──

/// An invokable function with typed parameters.
#[derive(Clone)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ParamDef>,
    pub schema: Option<Schema>,
    pub versioning: Versioning,
    pub guards: Vec<GuardBinding>,
    pub interceptors: Vec<InterceptorBinding>,
    pub handler: Arc<dyn ToolHandler>,
}

impl Tool {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        handler: Arc<dyn ToolHandler>,
    ) -> Self {
        Tool {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
            schema: None,
            versioning: Versioning::default(),
            guards: Vec::new(),
            interceptors: Vec::new(),
            handler,
        }
    }

    pub fn param(mut self, param: ParamDef) -> Self {
        self.parameters.push(param);
        self
    }

    /// Attach a validation schema. Parameters are derived from it unless
    /// explicit ones were already declared.
    pub fn schema(mut self, schema: Schema) -> Self {
        if self.parameters.is_empty() {
            self.parameters = schema_to_flat_params(&schema);
        }
        self.schema = Some(schema);
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.versioning.version = Some(version.into());
        self
    }

    pub fn deprecated(mut self, deprecation: Deprecation) -> Self {
        self.versioning.deprecate(&deprecation);
        self
    }

    pub fn guard(mut self, guard: GuardBinding) -> Self {
        self.guards.push(guard);
        self
    }

    pub fn interceptor(mut self, interceptor: InterceptorBinding) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    /// JSON Schema advertised in `tools/list`.
    pub fn input_schema(&self) -> Value {
        match &self.schema {
            Some(schema) => schema_to_json_schema(schema),
            None => params_to_input_schema(&self.parameters),
        }
    }

    pub(crate) fn list_entry(&self) -> Value {
        let mut entry = json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.input_schema(),
        });
        self.versioning.annotate(&mut entry);
        entry
    }
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parameters", &self.parameters)
            .field("versioning", &self.versioning)
            .finish_non_exhaustive()
    }
}

// ── Resource ──

/// Where a resource lives: a concrete URI or a `{var}` template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceLocation {
    Static(String),
    Template(String),
}

/// URI-addressed readable content.
#[derive(Clone)]
pub struct Resource {
    pub location: ResourceLocation,
    pub name: String,
    pub description: Option<String>,
    pub mime_type: Option<String>,
    /// Validates template variables, when set. Defaults it declares are
    /// added to the variables handed to the handler.
    pub schema: Option<Schema>,
    pub versioning: Versioning,
    pub guards: Vec<GuardBinding>,
    pub interceptors: Vec<InterceptorBinding>,
    pub handler: Arc<dyn ResourceHandler>,
}

impl Resource {
    /// A resource served at exactly `uri`.
    pub fn fixed(
        uri: impl Into<String>,
        name: impl Into<String>,
        handler: Arc<dyn ResourceHandler>,
    ) -> Self {
        let location = ResourceLocation::Static(uri.into());
        Self::with_location(location, name.into(), handler)
    }

    /// A resource served for every URI matching `uri_template`.
    pub fn template(
        uri_template: impl Into<String>,
        name: impl Into<String>,
        handler: Arc<dyn ResourceHandler>,
    ) -> Self {
        let location = ResourceLocation::Template(uri_template.into());
        Self::with_location(location, name.into(), handler)
    }

    fn with_location(
        location: ResourceLocation,
        name: String,
        handler: Arc<dyn ResourceHandler>,
    ) -> Self {
        Resource {
            location,
            name,
            description: None,
            mime_type: None,
            schema: None,
            versioning: Versioning::default(),
            guards: Vec::new(),
            interceptors: Vec::new(),
            handler,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.versioning.version = Some(version.into());
        self
    }

    pub fn deprecated(mut self, deprecation: Deprecation) -> Self {
        self.versioning.deprecate(&deprecation);
        self
    }

    pub fn guard(mut self, guard: GuardBinding) -> Self {
        self.guards.push(guard);
        self
    }

    pub fn interceptor(mut self, interceptor: InterceptorBinding) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    /// Registry key: the URI or the URI template.
    pub fn key(&self) -> &str {
        match &self.location {
            ResourceLocation::Static(uri) | ResourceLocation::Template(uri) => uri,
        }
    }

    pub fn is_template(&self) -> bool {
        matches!(self.location, ResourceLocation::Template(_))
    }

    pub fn uri(&self) -> Option<&str> {
        match &self.location {
            ResourceLocation::Static(uri) => Some(uri),
            ResourceLocation::Template(_) => None,
        }
    }

    pub fn uri_template(&self) -> Option<&str> {
        match &self.location {
            ResourceLocation::Template(template) => Some(template),
            ResourceLocation::Static(_) => None,
        }
    }

    pub(crate) fn list_entry(&self) -> Value {
        let mut entry = json!({
            "uri": self.key(),
            "name": self.name,
            "description": self.description,
            "mimeType": self.mime_type,
        });
        self.versioning.annotate(&mut entry);
        entry
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("location", &self.location)
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("versioning", &self.versioning)
            .finish_non_exhaustive()
    }
}

// ── Prompt ──

/// Declared argument of a prompt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromptArgument {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
}

impl PromptArgument {
    pub fn new(name: impl Into<String>, required: bool) -> Self {
        PromptArgument {
            name: name.into(),
            description: None,
            required,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A parameterized message template.
#[derive(Clone)]
pub struct Prompt {
    pub name: String,
    pub description: Option<String>,
    pub arguments: Vec<PromptArgument>,
    pub schema: Option<Schema>,
    pub versioning: Versioning,
    pub guards: Vec<GuardBinding>,
    pub interceptors: Vec<InterceptorBinding>,
    pub handler: Arc<dyn PromptHandler>,
}

impl Prompt {
    pub fn new(name: impl Into<String>, handler: Arc<dyn PromptHandler>) -> Self {
        Prompt {
            name: name.into(),
            description: None,
            arguments: Vec::new(),
            schema: None,
            versioning: Versioning::default(),
            guards: Vec::new(),
            interceptors: Vec::new(),
            handler,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn argument(mut self, argument: PromptArgument) -> Self {
        self.arguments.push(argument);
        self
    }

    /// Attach a validation schema. Arguments are derived from it unless
    /// explicit ones were already declared.
    pub fn schema(mut self, schema: Schema) -> Self {
        if self.arguments.is_empty() {
            self.arguments = schema_to_flat_params(&schema)
                .into_iter()
                .map(|p| PromptArgument {
                    name: p.name,
                    description: p.description,
                    required: p.required,
                })
                .collect();
        }
        self.schema = Some(schema);
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.versioning.version = Some(version.into());
        self
    }

    pub fn deprecated(mut self, deprecation: Deprecation) -> Self {
        self.versioning.deprecate(&deprecation);
        self
    }

    pub fn guard(mut self, guard: GuardBinding) -> Self {
        self.guards.push(guard);
        self
    }

    pub fn interceptor(mut self, interceptor: InterceptorBinding) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub(crate) fn list_entry(&self) -> Value {
        let mut entry = json!({
            "name": self.name,
            "description": self.description,
            "arguments": self.arguments,
        });
        self.versioning.annotate(&mut entry);
        entry
    }
}

impl fmt::Debug for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Prompt")
            .field("name", &self.name)
            .field("arguments", &self.arguments)
            .field("versioning", &self.versioning)
            .finish_non_exhaustive()
    }
}
