//! Guard / interceptor execution pipeline.
//!
//! Every capability invocation runs through the same two stages:
//!
//! ```text
//! guards (sequential, fail-fast) ──► interceptor 1 ──► interceptor 2 ──► handler
//!                                         ◄──────────────────◄──────────────┘
//! ```
//!
//! Guards decide whether the handler may run at all. Interceptors wrap the
//! handler as a nested chain: each receives a [`Next`] it may call before,
//! after, several times, or not at all.
//!
//! Guards and interceptors are referenced through [`Binding`]s. A binding is
//! either a ready instance or a named type which a [`Resolver`] looks up,
//! falling back to the binding's own constructor.

use std::any::type_name;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use crate::capability::CapabilityKind;
use crate::error::McpError;
use crate::types::JsonRpcRequest;

// ── Context ──

/// Per-invocation scratch map shared by guards, interceptors and the handler
/// chain. Dropped together with its [`ExecutionContext`].
#[derive(Debug, Default)]
pub struct McpContext {
    values: Mutex<HashMap<String, Value>>,
}

impl McpContext {
    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.lock().get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.values.lock().insert(key.into(), value);
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.values.lock().remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.lock().contains_key(key)
    }
}

/// Everything known about one capability invocation.
#[derive(Debug)]
pub struct ExecutionContext {
    kind: CapabilityKind,
    request: JsonRpcRequest,
    target: String,
    args: Vec<Value>,
    context: McpContext,
}

impl ExecutionContext {
    pub fn new(
        kind: CapabilityKind,
        request: JsonRpcRequest,
        target: impl Into<String>,
        args: Vec<Value>,
    ) -> Self {
        ExecutionContext {
            kind,
            request,
            target: target.into(),
            args,
            context: McpContext::default(),
        }
    }

    pub fn kind(&self) -> CapabilityKind {
        self.kind
    }

    pub fn request(&self) -> &JsonRpcRequest {
        &self.request
    }

    /// Tool / prompt name, or resource URI / URI template.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Key identifying the invoked operation, e.g. `tool:search`.
    pub fn operation_key(&self) -> String {
        format!("{}:{}", self.kind, self.target)
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn context(&self) -> &McpContext {
        &self.context
    }
}

// ── Guards and interceptors ──

/// Pre-invocation access check.
///
/// Returning `Ok(false)` denies with a Forbidden error naming the guard.
/// Forbidden / RateLimit / Timeout errors propagate unchanged; any other
/// error is reported as a Forbidden denial.
#[async_trait]
pub trait Guard: Send + Sync {
    async fn can_activate(&self, ctx: &ExecutionContext) -> Result<bool, McpError>;
}

/// Invocation-wrapping middleware.
#[async_trait]
pub trait Interceptor: Send + Sync {
    async fn intercept(&self, ctx: &ExecutionContext, next: Next) -> Result<Value, McpError>;
}

/// Boxed result of a capability handler.
pub type HandlerFuture = BoxFuture<'static, Result<Value, McpError>>;

/// Terminal handler at the end of an interceptor chain. Callable repeatedly.
pub type Terminal = Arc<dyn Fn() -> HandlerFuture + Send + Sync>;

/// Wrap a repeatable async closure as a [`Terminal`].
pub fn terminal<F, Fut>(f: F) -> Terminal
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, McpError>> + Send + 'static,
{
    Arc::new(move || -> HandlerFuture { f().boxed() })
}

/// The remainder of an interceptor chain.
#[derive(Clone)]
pub struct Next {
    chain: Arc<[Arc<dyn Interceptor>]>,
    index: usize,
    terminal: Terminal,
}

impl Next {
    /// Invoke the next interceptor, or the handler once the chain is exhausted.
    pub fn run<'a>(&'a self, ctx: &'a ExecutionContext) -> BoxFuture<'a, Result<Value, McpError>> {
        match self.chain.get(self.index) {
            Some(interceptor) => interceptor.intercept(
                ctx,
                Next {
                    chain: Arc::clone(&self.chain),
                    index: self.index + 1,
                    terminal: Arc::clone(&self.terminal),
                },
            ),
            None => (self.terminal)(),
        }
    }
}

// ── Bindings and resolution ──

/// Reference to a guard or interceptor.
pub enum Binding<T: ?Sized> {
    /// A ready-made, shared instance.
    Instance { name: String, instance: Arc<T> },
    /// Resolved at invocation time; `construct` is the direct-construction fallback.
    Named {
        name: String,
        construct: Option<fn() -> Arc<T>>,
    },
}

pub type GuardBinding = Binding<dyn Guard>;
pub type InterceptorBinding = Binding<dyn Interceptor>;

impl<T: ?Sized> Clone for Binding<T> {
    fn clone(&self) -> Self {
        match self {
            Binding::Instance { name, instance } => Binding::Instance {
                name: name.clone(),
                instance: Arc::clone(instance),
            },
            Binding::Named { name, construct } => Binding::Named {
                name: name.clone(),
                construct: *construct,
            },
        }
    }
}

impl<T: ?Sized> fmt::Debug for Binding<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::Instance { name, .. } => f.debug_tuple("Instance").field(name).finish(),
            Binding::Named { name, construct } => f
                .debug_struct("Named")
                .field("name", name)
                .field("constructible", &construct.is_some())
                .finish(),
        }
    }
}

impl<T: ?Sized> Binding<T> {
    pub fn name(&self) -> &str {
        match self {
            Binding::Instance { name, .. } | Binding::Named { name, .. } => name,
        }
    }

    /// A binding only the resolver can satisfy.
    pub fn named(name: impl Into<String>) -> Self {
        Binding::Named {
            name: name.into(),
            construct: None,
        }
    }
}

impl Binding<dyn Guard> {
    pub fn guard<G: Guard + 'static>(guard: G) -> Self {
        Binding::Instance {
            name: short_type_name::<G>(),
            instance: Arc::new(guard),
        }
    }

    /// Bind by type: resolved by name, else built with `Default`.
    pub fn guard_type<G: Guard + Default + 'static>() -> Self {
        Binding::Named {
            name: short_type_name::<G>(),
            construct: Some(construct_guard::<G>),
        }
    }
}

impl Binding<dyn Interceptor> {
    pub fn interceptor<I: Interceptor + 'static>(interceptor: I) -> Self {
        Binding::Instance {
            name: short_type_name::<I>(),
            instance: Arc::new(interceptor),
        }
    }

    /// Bind by type: resolved by name, else built with `Default`.
    pub fn interceptor_type<I: Interceptor + Default + 'static>() -> Self {
        Binding::Named {
            name: short_type_name::<I>(),
            construct: Some(construct_interceptor::<I>),
        }
    }
}

fn construct_guard<G: Guard + Default + 'static>() -> Arc<dyn Guard> {
    Arc::new(G::default())
}

fn construct_interceptor<I: Interceptor + Default + 'static>() -> Arc<dyn Interceptor> {
    Arc::new(I::default())
}

/// `my_crate::guards::AdminGuard` -> `AdminGuard`
fn short_type_name<T: ?Sized>() -> String {
    let full = type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

/// Looks up guards and interceptors by name.
pub trait Resolver: Send + Sync {
    fn resolve_guard(&self, name: &str) -> Option<Arc<dyn Guard>>;
    fn resolve_interceptor(&self, name: &str) -> Option<Arc<dyn Interceptor>>;
}

/// Resolver backed by explicitly provided singletons.
///
/// With nothing provided it resolves nothing, so named bindings fall back to
/// direct construction.
#[derive(Default)]
pub struct DefaultResolver {
    guards: RwLock<HashMap<String, Arc<dyn Guard>>>,
    interceptors: RwLock<HashMap<String, Arc<dyn Interceptor>>>,
}

impl DefaultResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn provide_guard(&self, name: impl Into<String>, guard: Arc<dyn Guard>) {
        self.guards.write().insert(name.into(), guard);
    }

    pub fn provide_interceptor(&self, name: impl Into<String>, interceptor: Arc<dyn Interceptor>) {
        self.interceptors.write().insert(name.into(), interceptor);
    }
}

impl Resolver for DefaultResolver {
    fn resolve_guard(&self, name: &str) -> Option<Arc<dyn Guard>> {
        self.guards.read().get(name).cloned()
    }

    fn resolve_interceptor(&self, name: &str) -> Option<Arc<dyn Interceptor>> {
        self.interceptors.read().get(name).cloned()
    }
}

fn resolve<T: ?Sized>(
    binding: &Binding<T>,
    what: &str,
    lookup: impl Fn(&str) -> Option<Arc<T>>,
) -> Result<Arc<T>, McpError> {
    match binding {
        Binding::Instance { instance, .. } => Ok(Arc::clone(instance)),
        Binding::Named { name, construct } => {
            let message = format!("Unable to resolve {} '{}'", what, name);
            lookup(name)
                .or_else(|| construct.map(|construct| construct()))
                .ok_or_else(|| McpError::internal(message))
        }
    }
}

// ── Execution ──

/// Run guards in order, stopping at the first denial.
pub async fn execute_guards(
    guards: &[GuardBinding],
    ctx: &ExecutionContext,
    resolver: &dyn Resolver,
) -> Result<(), McpError> {
    for binding in guards {
        let guard = resolve(binding, "guard", |name| resolver.resolve_guard(name))?;
        match guard.can_activate(ctx).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(guard = binding.name(), op = %ctx.operation_key(), "guard denied");
                return Err(McpError::Forbidden(format!(
                    "Access denied by guard {}",
                    binding.name()
                )));
            }
            Err(err) if err.is_access_error() => return Err(err),
            Err(err) => {
                return Err(McpError::Forbidden(format!(
                    "Access denied by guard {}: {}",
                    binding.name(),
                    err
                )));
            }
        }
    }
    Ok(())
}

/// Run `terminal` wrapped by `interceptors`, first binding outermost.
pub async fn execute_interceptors(
    interceptors: &[InterceptorBinding],
    ctx: &ExecutionContext,
    terminal: Terminal,
    resolver: &dyn Resolver,
) -> Result<Value, McpError> {
    let lookup = |name: &str| resolver.resolve_interceptor(name);
    let chain = interceptors
        .iter()
        .map(|binding| resolve(binding, "interceptor", lookup))
        .collect::<Result<Vec<_>, _>>()?;

    let next = Next {
        chain: chain.into(),
        index: 0,
        terminal,
    };
    next.run(ctx).await
}

/// Guards first; the interceptor chain and handler run only if all pass.
pub async fn execute_with_guards_and_interceptors(
    guards: &[GuardBinding],
    interceptors: &[InterceptorBinding],
    ctx: &ExecutionContext,
    terminal: Terminal,
    resolver: &dyn Resolver,
) -> Result<Value, McpError> {
    execute_guards(guards, ctx, resolver).await?;
    execute_interceptors(interceptors, ctx, terminal, resolver).await
}

/// Server-wide pipeline: a resolver plus guards / interceptors applied ahead
/// of each capability's own.
pub struct Pipeline {
    resolver: Arc<dyn Resolver>,
    guards: Vec<GuardBinding>,
    interceptors: Vec<InterceptorBinding>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Pipeline::new(Arc::new(DefaultResolver::new()))
    }
}

impl Pipeline {
    pub fn new(resolver: Arc<dyn Resolver>) -> Self {
        Pipeline {
            resolver,
            guards: Vec::new(),
            interceptors: Vec::new(),
        }
    }

    pub fn with_guards(mut self, guards: Vec<GuardBinding>) -> Self {
        self.guards = guards;
        self
    }

    pub fn with_interceptors(mut self, interceptors: Vec<InterceptorBinding>) -> Self {
        self.interceptors = interceptors;
        self
    }

    pub async fn run(
        &self,
        guards: &[GuardBinding],
        interceptors: &[InterceptorBinding],
        ctx: &ExecutionContext,
        terminal: Terminal,
    ) -> Result<Value, McpError> {
        let all_guards = [self.guards.as_slice(), guards].concat();
        let all_interceptors = [self.interceptors.as_slice(), interceptors].concat();

        execute_with_guards_and_interceptors(
            &all_guards,
            &all_interceptors,
            ctx,
            terminal,
            self.resolver.as_ref(),
        )
        .await
    }
}
