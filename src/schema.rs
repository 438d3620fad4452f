//! Composable validation schemas for capability arguments.
//!
//! A [`Schema`] is a small type-descriptor tree (string, number, boolean,
//! array, object, enum, literal, union plus the optional / nullable / default
//! wrappers). It serves two purposes:
//!
//! - the translator walks it to produce parameter lists and JSON Schema
//!   documents for discovery responses (see [`crate::translate`]);
//! - the dispatcher walks it again at call time via [`Schema::validate`] to
//!   accept or reject concrete argument values.
//!
//! ```
//! use mcpcore::schema::Schema;
//! use serde_json::json;
//!
//! let schema = Schema::object([
//!     ("city", Schema::string().min_length(1).describe("City name")),
//!     ("days", Schema::integer().min(1.0).max(7.0).with_default(json!(3))),
//! ]);
//!
//! let parsed = schema.validate(&json!({"city": "Oslo"})).unwrap();
//! assert_eq!(parsed, json!({"city": "Oslo", "days": 3}));
//! assert!(schema.validate(&json!({"city": ""})).is_err());
//! ```

use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

/// One constructor in the schema tree.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaKind {
    String {
        min_length: Option<usize>,
        max_length: Option<usize>,
    },
    Number {
        minimum: Option<f64>,
        maximum: Option<f64>,
        integer: bool,
    },
    Boolean,
    Array {
        items: Box<Schema>,
        min_items: Option<usize>,
        max_items: Option<usize>,
    },
    /// Fields in declaration order.
    Object { fields: Vec<(String, Schema)> },
    Enum(Vec<String>),
    Literal(Value),
    Union(Vec<Schema>),
    Optional(Box<Schema>),
    Nullable(Box<Schema>),
    Default { inner: Box<Schema>, value: Value },
    /// Accepts any value. Has no dedicated JSON Schema form.
    Any,
}

/// A validation schema node with an optional human-readable description.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub kind: SchemaKind,
    pub description: Option<String>,
}

impl From<SchemaKind> for Schema {
    fn from(kind: SchemaKind) -> Self {
        Schema {
            kind,
            description: None,
        }
    }
}

impl Schema {
    pub fn string() -> Self {
        SchemaKind::String {
            min_length: None,
            max_length: None,
        }
        .into()
    }

    pub fn number() -> Self {
        SchemaKind::Number {
            minimum: None,
            maximum: None,
            integer: false,
        }
        .into()
    }

    pub fn integer() -> Self {
        SchemaKind::Number {
            minimum: None,
            maximum: None,
            integer: true,
        }
        .into()
    }

    pub fn boolean() -> Self {
        SchemaKind::Boolean.into()
    }

    pub fn array(items: Schema) -> Self {
        SchemaKind::Array {
            items: Box::new(items),
            min_items: None,
            max_items: None,
        }
        .into()
    }

    pub fn object<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Schema)>,
    {
        SchemaKind::Object {
            fields: fields.into_iter().map(|(k, s)| (k.into(), s)).collect(),
        }
        .into()
    }

    pub fn enumeration<S, I>(values: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator<Item = S>,
    {
        SchemaKind::Enum(values.into_iter().map(Into::into).collect()).into()
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        SchemaKind::Literal(value.into()).into()
    }

    pub fn union(variants: impl IntoIterator<Item = Schema>) -> Self {
        SchemaKind::Union(variants.into_iter().collect()).into()
    }

    pub fn any() -> Self {
        SchemaKind::Any.into()
    }

    // ── Wrappers ──

    pub fn optional(self) -> Self {
        SchemaKind::Optional(Box::new(self)).into()
    }

    pub fn nullable(self) -> Self {
        SchemaKind::Nullable(Box::new(self)).into()
    }

    pub fn with_default(self, value: impl Into<Value>) -> Self {
        SchemaKind::Default {
            inner: Box::new(self),
            value: value.into(),
        }
        .into()
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    // ── Constraints (no-ops on kinds they do not apply to) ──

    pub fn min_length(mut self, n: usize) -> Self {
        if let SchemaKind::String { min_length, .. } = &mut self.kind {
            *min_length = Some(n);
        }
        self
    }

    pub fn max_length(mut self, n: usize) -> Self {
        if let SchemaKind::String { max_length, .. } = &mut self.kind {
            *max_length = Some(n);
        }
        self
    }

    pub fn min(mut self, n: f64) -> Self {
        if let SchemaKind::Number { minimum, .. } = &mut self.kind {
            *minimum = Some(n);
        }
        self
    }

    pub fn max(mut self, n: f64) -> Self {
        if let SchemaKind::Number { maximum, .. } = &mut self.kind {
            *maximum = Some(n);
        }
        self
    }

    pub fn min_items(mut self, n: usize) -> Self {
        if let SchemaKind::Array { min_items, .. } = &mut self.kind {
            *min_items = Some(n);
        }
        self
    }

    pub fn max_items(mut self, n: usize) -> Self {
        if let SchemaKind::Array { max_items, .. } = &mut self.kind {
            *max_items = Some(n);
        }
        self
    }

    /// Validate `value`, returning it with defaults filled in and undeclared
    /// object keys removed.
    pub fn validate(&self, value: &Value) -> Result<Value, Vec<ValidationIssue>> {
        let mut issues = Vec::new();
        let parsed = self.check(Some(value), "", &mut issues);
        if issues.is_empty() {
            Ok(parsed.unwrap_or(Value::Null))
        } else {
            Err(issues)
        }
    }

    /// `None` input means the key was absent; `None` output means "leave absent".
    fn check(
        &self,
        value: Option<&Value>,
        path: &str,
        issues: &mut Vec<ValidationIssue>,
    ) -> Option<Value> {
        match &self.kind {
            SchemaKind::Optional(inner) => match value {
                None => None,
                Some(v) => inner.check(Some(v), path, issues),
            },
            SchemaKind::Nullable(inner) => match value {
                Some(Value::Null) => Some(Value::Null),
                other => inner.check(other, path, issues),
            },
            SchemaKind::Default {
                inner,
                value: default,
            } => match value {
                None => Some(default.clone()),
                Some(v) => inner.check(Some(v), path, issues),
            },
            SchemaKind::Any => value.cloned(),
            _ => {
                let Some(v) = value else {
                    issues.push(ValidationIssue::new(path, "Required"));
                    return None;
                };
                self.check_present(v, path, issues)
            }
        }
    }

    fn check_present(
        &self,
        value: &Value,
        path: &str,
        issues: &mut Vec<ValidationIssue>,
    ) -> Option<Value> {
        match &self.kind {
            SchemaKind::String {
                min_length,
                max_length,
            } => {
                let Some(s) = value.as_str() else {
                    issues.push(ValidationIssue::expected(path, "string", value));
                    return None;
                };
                let len = s.chars().count();
                if let Some(min) = min_length.filter(|min| len < *min) {
                    issues.push(ValidationIssue::new(
                        path,
                        format!("String must contain at least {} character(s)", min),
                    ));
                }
                if let Some(max) = max_length.filter(|max| len > *max) {
                    issues.push(ValidationIssue::new(
                        path,
                        format!("String must contain at most {} character(s)", max),
                    ));
                }
                Some(value.clone())
            }
            SchemaKind::Number {
                minimum,
                maximum,
                integer,
            } => {
                let Some(n) = value.as_f64() else {
                    issues.push(ValidationIssue::expected(path, "number", value));
                    return None;
                };
                if *integer && n.fract() != 0.0 {
                    issues.push(ValidationIssue::expected(path, "integer", value));
                }
                if let Some(min) = minimum.filter(|min| n < *min) {
                    issues.push(ValidationIssue::new(
                        path,
                        format!("Number must be greater than or equal to {}", min),
                    ));
                }
                if let Some(max) = maximum.filter(|max| n > *max) {
                    issues.push(ValidationIssue::new(
                        path,
                        format!("Number must be less than or equal to {}", max),
                    ));
                }
                Some(value.clone())
            }
            SchemaKind::Boolean => {
                if !value.is_boolean() {
                    issues.push(ValidationIssue::expected(path, "boolean", value));
                    return None;
                }
                Some(value.clone())
            }
            SchemaKind::Array {
                items,
                min_items,
                max_items,
            } => {
                let Some(arr) = value.as_array() else {
                    issues.push(ValidationIssue::expected(path, "array", value));
                    return None;
                };
                if let Some(min) = min_items.filter(|min| arr.len() < *min) {
                    issues.push(ValidationIssue::new(
                        path,
                        format!("Array must contain at least {} element(s)", min),
                    ));
                }
                if let Some(max) = max_items.filter(|max| arr.len() > *max) {
                    issues.push(ValidationIssue::new(
                        path,
                        format!("Array must contain at most {} element(s)", max),
                    ));
                }
                let parsed = arr
                    .iter()
                    .enumerate()
                    .map(|(i, item)| {
                        items
                            .check(Some(item), &format!("{}[{}]", path, i), issues)
                            .unwrap_or(Value::Null)
                    })
                    .collect();
                Some(Value::Array(parsed))
            }
            SchemaKind::Object { fields } => {
                let Some(obj) = value.as_object() else {
                    issues.push(ValidationIssue::expected(path, "object", value));
                    return None;
                };
                let mut out = Map::new();
                for (name, field) in fields {
                    let field_path = if path.is_empty() {
                        name.clone()
                    } else {
                        format!("{}.{}", path, name)
                    };
                    if let Some(v) = field.check(obj.get(name), &field_path, issues) {
                        out.insert(name.clone(), v);
                    }
                }
                Some(Value::Object(out))
            }
            SchemaKind::Enum(allowed) => {
                match value.as_str() {
                    Some(s) if allowed.iter().any(|a| a == s) => {}
                    _ => issues.push(ValidationIssue::new(
                        path,
                        format!("Expected one of [{}]", allowed.join(", ")),
                    )),
                }
                Some(value.clone())
            }
            SchemaKind::Literal(expected) => {
                if value != expected {
                    issues.push(ValidationIssue::new(
                        path,
                        format!("Expected literal {}", expected),
                    ));
                }
                Some(value.clone())
            }
            SchemaKind::Union(variants) => {
                for variant in variants {
                    let mut scratch = Vec::new();
                    let parsed = variant.check(Some(value), path, &mut scratch);
                    if scratch.is_empty() {
                        return parsed;
                    }
                }
                issues.push(ValidationIssue::new(path, "Input matched no union variant"));
                None
            }
            // Wrappers and Any are handled in `check`.
            SchemaKind::Optional(_)
            | SchemaKind::Nullable(_)
            | SchemaKind::Default { .. }
            | SchemaKind::Any => self.check(Some(value), path, issues),
        }
    }
}

/// A single validation failure, addressed by a dotted path (`user.tags[0]`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationIssue {
    pub path: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationIssue {
            path: path.into(),
            message: message.into(),
        }
    }

    fn expected(path: &str, expected: &str, got: &Value) -> Self {
        let message = format!("Expected {}, received {}", expected, type_name(got));
        ValidationIssue::new(path, message)
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
