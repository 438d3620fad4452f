//! In-memory capability registry.
//!
//! Three independent keyed collections: tools by name, resources by URI or
//! URI template, prompts by name. Re-registering a key overwrites the entry
//! in place and logs a warning. Listing follows registration order.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;
use regex::Regex;

use crate::capability::{Prompt, Resource, Tool};

static PLACEHOLDER: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"\{[^}]+\}"));

/// Compiled form of a `{var}` URI template.
///
/// Each placeholder becomes `[^/]+`; literal text is matched verbatim and the
/// whole URI must match.
///
/// Matching and variable binding differ for placeholders that share a path
/// segment with literal text. `file://{name}.txt` matches `file://notes.txt`,
/// but [`extract_uri_variables`] only binds whole `{var}` segments, so the
/// handler receives no `name` for it.
#[derive(Debug, Clone)]
pub struct UriTemplate {
    template: String,
    regex: Regex,
}

impl UriTemplate {
    pub fn parse(template: &str) -> Result<Self, regex::Error> {
        let placeholder = PLACEHOLDER.as_ref().map_err(Clone::clone)?;

        let mut pattern = String::from("^");
        let mut last = 0;
        for m in placeholder.find_iter(template) {
            pattern.push_str(&regex::escape(&template[last..m.start()]));
            pattern.push_str("[^/]+");
            last = m.end();
        }
        pattern.push_str(&regex::escape(&template[last..]));
        pattern.push('$');

        Ok(UriTemplate {
            template: template.to_string(),
            regex: Regex::new(&pattern)?,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    pub fn matches(&self, uri: &str) -> bool {
        self.regex.is_match(uri)
    }
}

/// Bind `{name}` segments of `template` to the matching segments of `uri`.
///
/// Both are split on `/`. Differing segment counts yield an empty map.
///
/// ```
/// use mcpcore::registry::extract_uri_variables;
///
/// let vars = extract_uri_variables("a/{x}/b/{y}", "a/1/b/2");
/// assert_eq!(vars["x"], "1");
/// assert_eq!(vars["y"], "2");
/// assert!(extract_uri_variables("a/{x}/b/{y}", "a/1").is_empty());
/// ```
pub fn extract_uri_variables(template: &str, uri: &str) -> HashMap<String, String> {
    let template_parts: Vec<&str> = template.split('/').collect();
    let uri_parts: Vec<&str> = uri.split('/').collect();
    if template_parts.len() != uri_parts.len() {
        return HashMap::new();
    }

    template_parts
        .into_iter()
        .zip(uri_parts)
        .filter_map(|(tpl, value)| {
            let name = tpl.strip_prefix('{')?.strip_suffix('}')?;
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}

// ── Collections ──

#[derive(Debug)]
struct Collection<T> {
    entries: HashMap<String, T>,
    order: Vec<String>,
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Collection {
            entries: HashMap::new(),
            order: Vec::new(),
        }
    }
}

impl<T: Clone> Collection<T> {
    /// Returns true when an existing entry was replaced.
    fn insert(&mut self, key: String, value: T) -> bool {
        if self.entries.insert(key.clone(), value).is_some() {
            return true;
        }
        self.order.push(key);
        false
    }

    fn get(&self, key: &str) -> Option<T> {
        self.entries.get(key).cloned()
    }

    fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    fn remove(&mut self, key: &str) -> bool {
        if self.entries.remove(key).is_none() {
            return false;
        }
        self.order.retain(|k| k != key);
        true
    }

    fn values(&self) -> impl Iterator<Item = &T> {
        self.order.iter().filter_map(|key| self.entries.get(key))
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

#[derive(Debug, Clone)]
struct ResourceEntry {
    resource: Arc<Resource>,
    matcher: Option<UriTemplate>,
}

/// Registry of tools, resources and prompts.
///
/// Read-mostly: lookups take a shared lock, registration an exclusive one.
#[derive(Debug, Default)]
pub struct Registry {
    tools: RwLock<Collection<Arc<Tool>>>,
    resources: RwLock<Collection<ResourceEntry>>,
    prompts: RwLock<Collection<Arc<Prompt>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Tools ──

    pub fn register_tool(&self, tool: Tool) {
        let name = tool.name.clone();
        if self.tools.write().insert(name.clone(), Arc::new(tool)) {
            tracing::warn!(
                kind = "tool",
                key = %name,
                "tool '{}' already registered, overwriting",
                name
            );
        }
    }

    pub fn register_tools(&self, tools: impl IntoIterator<Item = Tool>) {
        for tool in tools {
            self.register_tool(tool);
        }
    }

    pub fn get_tool(&self, name: &str) -> Option<Arc<Tool>> {
        self.tools.read().get(name)
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.read().contains(name)
    }

    /// Snapshot of all tools in registration order.
    pub fn tools(&self) -> Vec<Arc<Tool>> {
        self.tools.read().values().cloned().collect()
    }

    pub fn unregister_tool(&self, name: &str) -> bool {
        self.tools.write().remove(name)
    }

    pub fn tool_count(&self) -> usize {
        self.tools.read().len()
    }

    // ── Resources ──

    pub fn register_resource(&self, resource: Resource) {
        let key = resource.key().to_string();
        let matcher = match resource.uri_template() {
            Some(template) => match UriTemplate::parse(template) {
                Ok(matcher) => Some(matcher),
                Err(err) => {
                    tracing::error!(
                        template,
                        error = %err,
                        "invalid URI template, resource will not match by pattern"
                    );
                    None
                }
            },
            None => None,
        };
        let entry = ResourceEntry {
            resource: Arc::new(resource),
            matcher,
        };
        if self.resources.write().insert(key.clone(), entry) {
            tracing::warn!(
                kind = "resource",
                key = %key,
                "resource '{}' already registered, overwriting",
                key
            );
        }
    }

    pub fn register_resources(&self, resources: impl IntoIterator<Item = Resource>) {
        for resource in resources {
            self.register_resource(resource);
        }
    }

    /// Lookup by exact key (URI, or the literal URI template).
    pub fn get_resource(&self, key: &str) -> Option<Arc<Resource>> {
        self.resources.read().get(key).map(|entry| entry.resource)
    }

    pub fn has_resource(&self, key: &str) -> bool {
        self.resources.read().contains(key)
    }

    pub fn resources(&self) -> Vec<Arc<Resource>> {
        self.resources
            .read()
            .values()
            .map(|entry| Arc::clone(&entry.resource))
            .collect()
    }

    pub fn unregister_resource(&self, key: &str) -> bool {
        self.resources.write().remove(key)
    }

    pub fn resource_count(&self) -> usize {
        self.resources.read().len()
    }

    /// First templated resource, in registration order, whose template
    /// matches `uri`.
    pub fn find_resource_by_pattern(&self, uri: &str) -> Option<Arc<Resource>> {
        self.resources.read().values().find_map(|entry| {
            let matcher = entry.matcher.as_ref()?;
            matcher.matches(uri).then(|| Arc::clone(&entry.resource))
        })
    }

    // ── Prompts ──

    pub fn register_prompt(&self, prompt: Prompt) {
        let name = prompt.name.clone();
        if self.prompts.write().insert(name.clone(), Arc::new(prompt)) {
            tracing::warn!(
                kind = "prompt",
                key = %name,
                "prompt '{}' already registered, overwriting",
                name
            );
        }
    }

    pub fn register_prompts(&self, prompts: impl IntoIterator<Item = Prompt>) {
        for prompt in prompts {
            self.register_prompt(prompt);
        }
    }

    pub fn get_prompt(&self, name: &str) -> Option<Arc<Prompt>> {
        self.prompts.read().get(name)
    }

    pub fn has_prompt(&self, name: &str) -> bool {
        self.prompts.read().contains(name)
    }

    pub fn prompts(&self) -> Vec<Arc<Prompt>> {
        self.prompts.read().values().cloned().collect()
    }

    pub fn unregister_prompt(&self, name: &str) -> bool {
        self.prompts.write().remove(name)
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.read().len()
    }

    /// Empty all three collections.
    pub fn clear(&self) {
        self.tools.write().clear();
        self.resources.write().clear();
        self.prompts.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{FnPromptHandler, FnResourceHandler, FnToolHandler};
    use crate::testing::LogBuffer;
    use crate::types::{OneOrMany, PromptMessage, ResourceContent, text_result};
    use serde_json::Value;

    fn tool(name: &str, description: &str) -> Tool {
        let handler = FnToolHandler::new(|_args: Value| async move { Ok(text_result("ok")) });
        Tool::new(name, description, handler)
    }

    fn prompt(name: &str) -> Prompt {
        let handler = FnPromptHandler::new(|_args: Value| async move {
            Ok(OneOrMany::One(PromptMessage::user("hi")))
        });
        Prompt::new(name, handler)
    }

    fn resource_handler() -> Arc<dyn crate::capability::ResourceHandler> {
        FnResourceHandler::new(|uri: String, _vars| async move {
            Ok(OneOrMany::One(ResourceContent::text(uri, "text/plain", "body")))
        })
    }

    #[test]
    fn test_extract_uri_variables() {
        let vars = extract_uri_variables("a/{x}/b/{y}", "a/1/b/2");
        assert_eq!(vars.len(), 2);
        assert_eq!(vars["x"], "1");
        assert_eq!(vars["y"], "2");

        assert!(extract_uri_variables("a/{x}/b/{y}", "a/1").is_empty());
    }

    #[test]
    fn test_extract_with_scheme() {
        let vars = extract_uri_variables("users://{id}/profile", "users://42/profile");
        assert_eq!(vars["id"], "42");
    }

    #[test]
    fn test_uri_template_matching() {
        let tpl = UriTemplate::parse("users://{id}/profile").unwrap();
        assert!(tpl.matches("users://42/profile"));
        assert!(!tpl.matches("users://42/settings"));
        assert!(!tpl.matches("users://42/x/profile"));
        assert!(!tpl.matches("xusers://42/profile"));

        let dotted = UriTemplate::parse("file://{name}.txt").unwrap();
        assert!(dotted.matches("file://notes.txt"));
        assert!(!dotted.matches("file://notes_txt"));
        // Partial-segment placeholders match but bind nothing.
        assert!(extract_uri_variables("file://{name}.txt", "file://notes.txt").is_empty());
    }

    #[test]
    fn test_register_overwrites_in_place() {
        let registry = Registry::new();
        registry.register_tools([tool("a", "first"), tool("b", "second")]);
        registry.register_tool(tool("a", "replaced"));

        assert_eq!(registry.tool_count(), 2);
        let tools = registry.tools();
        assert_eq!(tools[0].name, "a");
        assert_eq!(tools[0].description, "replaced");
        assert_eq!(tools[1].name, "b");
    }

    #[test]
    fn test_overwrite_logs_warning() {
        let (logs, _guard) = LogBuffer::capture();
        let registry = Registry::new();
        registry.register_tool(tool("a", "first"));
        registry.register_resource(Resource::fixed("x://y", "y", resource_handler()));
        registry.register_prompt(prompt("p"));
        assert!(logs.contents().is_empty());

        registry.register_tool(tool("a", "second"));
        registry.register_resource(Resource::fixed("x://y", "z", resource_handler()));
        registry.register_prompt(prompt("p"));

        let logs = logs.contents();
        assert_eq!(logs.matches("WARN").count(), 3);
        assert!(logs.contains("tool 'a' already registered, overwriting"));
        assert!(logs.contains("resource 'x://y' already registered, overwriting"));
        assert!(logs.contains("prompt 'p' already registered, overwriting"));
    }

    #[test]
    fn test_unregister_tool() {
        let registry = Registry::new();
        registry.register_tool(tool("a", ""));
        assert!(registry.has_tool("a"));
        assert!(registry.unregister_tool("a"));
        assert!(!registry.unregister_tool("a"));
        assert!(registry.get_tool("a").is_none());
        assert!(registry.tools().is_empty());
    }

    #[test]
    fn test_find_resource_first_match_wins() {
        let registry = Registry::new();
        registry.register_resources([
            Resource::fixed("docs://index", "index", resource_handler()),
            Resource::template("docs://{page}", "page", resource_handler()),
            Resource::template("docs://{anything}", "fallback", resource_handler()),
        ]);

        let found = registry.find_resource_by_pattern("docs://intro").unwrap();
        assert_eq!(found.name, "page");
        assert!(registry.find_resource_by_pattern("other://intro").is_none());
    }

    #[test]
    fn test_find_resource_skips_static() {
        let registry = Registry::new();
        registry.register_resource(Resource::fixed("docs://index", "index", resource_handler()));
        assert!(registry.find_resource_by_pattern("docs://index").is_none());
        assert!(registry.get_resource("docs://index").is_some());
    }

    #[test]
    fn test_clear() {
        let registry = Registry::new();
        registry.register_tool(tool("a", ""));
        registry.register_resource(Resource::fixed("x://y", "y", resource_handler()));
        registry.register_prompt(prompt("p"));
        assert_eq!(registry.prompt_count(), 1);

        registry.clear();
        assert_eq!(registry.tool_count(), 0);
        assert_eq!(registry.resource_count(), 0);
        assert_eq!(registry.prompt_count(), 0);
    }
}
