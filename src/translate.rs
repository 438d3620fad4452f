//! Translation of [`Schema`] trees into discovery shapes.
//!
//! Two outputs are produced from the same tree:
//! - a flat [`ParamDef`] list (one entry per top-level object field), and
//! - a JSON-Schema-shaped document for `tools/list` style responses.
//!
//! Both functions are total: every schema shape translates, unknown shapes
//! fall back to `{"type": "object"}` / [`ParamType::Object`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::schema::{Schema, SchemaKind};

/// Parameter type in the flat parameter list.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Boolean,
    Object,
    Array,
}

impl ParamType {
    pub fn as_str(self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Object => "object",
            ParamType::Array => "array",
        }
    }
}

fn default_required() -> bool {
    true
}

/// A single declared parameter of a tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParamDef {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
}

impl ParamDef {
    /// A required parameter with no description.
    pub fn new(name: impl Into<String>, param_type: ParamType) -> Self {
        ParamDef {
            name: name.into(),
            param_type,
            description: None,
            required: true,
            default: None,
            enum_values: None,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn with_enum(mut self, values: impl IntoIterator<Item = Value>) -> Self {
        self.enum_values = Some(values.into_iter().collect());
        self
    }
}

/// Flatten an object schema into its field list, in declaration order.
///
/// Non-object schemas yield an empty list.
pub fn schema_to_flat_params(schema: &Schema) -> Vec<ParamDef> {
    let SchemaKind::Object { fields } = &unwrap_wrappers(schema).kind else {
        return Vec::new();
    };

    fields
        .iter()
        .map(|(name, field)| {
            let mut required = true;
            let mut default = None;
            let mut description = field.description.clone();
            let mut node = field;
            loop {
                let inner = match &node.kind {
                    SchemaKind::Optional(inner) => {
                        required = false;
                        &**inner
                    }
                    SchemaKind::Nullable(inner) => &**inner,
                    SchemaKind::Default { inner, value } => {
                        required = false;
                        if default.is_none() {
                            default = Some(value.clone());
                        }
                        &**inner
                    }
                    _ => break,
                };
                if description.is_none() {
                    description = inner.description.clone();
                }
                node = inner;
            }

            let (param_type, enum_values) = match &node.kind {
                SchemaKind::String { .. } => (ParamType::String, None),
                SchemaKind::Number { .. } => (ParamType::Number, None),
                SchemaKind::Boolean => (ParamType::Boolean, None),
                SchemaKind::Array { .. } => (ParamType::Array, None),
                SchemaKind::Enum(values) => (
                    ParamType::String,
                    Some(values.iter().cloned().map(Value::String).collect()),
                ),
                SchemaKind::Literal(value) => (literal_param_type(value), None),
                _ => (ParamType::Object, None),
            };

            ParamDef {
                name: name.clone(),
                param_type,
                description,
                required,
                default,
                enum_values,
            }
        })
        .collect()
}

/// Translate a schema into a JSON Schema document.
pub fn schema_to_json_schema(schema: &Schema) -> Value {
    let mut node = match &schema.kind {
        SchemaKind::String {
            min_length,
            max_length,
        } => {
            let mut out = json!({"type": "string"});
            if let Some(n) = min_length {
                out["minLength"] = json!(n);
            }
            if let Some(n) = max_length {
                out["maxLength"] = json!(n);
            }
            out
        }
        SchemaKind::Number { minimum, maximum, .. } => {
            let mut out = json!({"type": "number"});
            if let Some(n) = minimum {
                out["minimum"] = json!(n);
            }
            if let Some(n) = maximum {
                out["maximum"] = json!(n);
            }
            out
        }
        SchemaKind::Boolean => json!({"type": "boolean"}),
        SchemaKind::Array {
            items,
            min_items,
            max_items,
        } => {
            let mut out = json!({"type": "array", "items": schema_to_json_schema(items)});
            if let Some(n) = min_items {
                out["minItems"] = json!(n);
            }
            if let Some(n) = max_items {
                out["maxItems"] = json!(n);
            }
            out
        }
        SchemaKind::Object { fields } => {
            let mut properties = Map::new();
            let mut required = Vec::new();
            for (name, field) in fields {
                properties.insert(name.clone(), schema_to_json_schema(field));
                if !is_omittable(field) {
                    required.push(Value::String(name.clone()));
                }
            }
            json!({"type": "object", "properties": properties, "required": required})
        }
        SchemaKind::Enum(values) => json!({"type": "string", "enum": values}),
        SchemaKind::Literal(value) => json!({"type": json_type_of(value), "const": value}),
        SchemaKind::Union(variants) => {
            json!({"oneOf": variants.iter().map(schema_to_json_schema).collect::<Vec<_>>()})
        }
        SchemaKind::Optional(inner) => schema_to_json_schema(inner),
        SchemaKind::Nullable(inner) => {
            let mut out = schema_to_json_schema(inner);
            out["nullable"] = json!(true);
            out
        }
        SchemaKind::Default { inner, value } => {
            let mut out = schema_to_json_schema(inner);
            out["default"] = value.clone();
            out
        }
        SchemaKind::Any => json!({"type": "object"}),
    };

    if let Some(description) = &schema.description {
        node["description"] = json!(description);
    }
    node
}

/// Build the `inputSchema` object advertised for a flat parameter list.
pub fn params_to_input_schema(params: &[ParamDef]) -> Value {
    let mut properties = Map::new();
    for param in params {
        let mut prop = json!({"type": param.param_type.as_str()});
        if let Some(description) = &param.description {
            prop["description"] = json!(description);
        }
        if let Some(values) = &param.enum_values {
            prop["enum"] = json!(values);
        }
        if let Some(default) = &param.default {
            prop["default"] = default.clone();
        }
        properties.insert(param.name.clone(), prop);
    }
    let required: Vec<&str> = params
        .iter()
        .filter(|p| p.required)
        .map(|p| p.name.as_str())
        .collect();

    json!({"type": "object", "properties": properties, "required": required})
}

fn unwrap_wrappers(schema: &Schema) -> &Schema {
    match &schema.kind {
        SchemaKind::Optional(inner) | SchemaKind::Nullable(inner) => unwrap_wrappers(inner),
        SchemaKind::Default { inner, .. } => unwrap_wrappers(inner),
        _ => schema,
    }
}

/// True when a field may be left out of its parent object.
fn is_omittable(schema: &Schema) -> bool {
    match &schema.kind {
        SchemaKind::Optional(_) | SchemaKind::Default { .. } => true,
        SchemaKind::Nullable(inner) => is_omittable(inner),
        _ => false,
    }
}

fn literal_param_type(value: &Value) -> ParamType {
    match value {
        Value::String(_) => ParamType::String,
        Value::Number(_) => ParamType::Number,
        Value::Bool(_) => ParamType::Boolean,
        Value::Array(_) => ParamType::Array,
        _ => ParamType::Object,
    }
}

fn json_type_of(value: &Value) -> &'static str {
    match value {
        Value::String(_) => "string",
        Value::Number(_) => "number",
        Value::Bool(_) => "boolean",
        Value::Null => "null",
        Value::Array(_) | Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weather_schema() -> Schema {
        Schema::object([
            ("city", Schema::string().min_length(1).describe("City name")),
            (
                "units",
                Schema::enumeration(["metric", "imperial"])
                    .describe("Unit system")
                    .with_default("metric"),
            ),
            ("days", Schema::number().max(7.0).optional()),
            ("verbose", Schema::boolean().nullable()),
        ])
    }

    #[test]
    fn test_flat_params() {
        let params = schema_to_flat_params(&weather_schema());
        assert_eq!(params.len(), 4);

        assert_eq!(params[0].name, "city");
        assert_eq!(params[0].param_type, ParamType::String);
        assert!(params[0].required);
        assert_eq!(params[0].description.as_deref(), Some("City name"));

        assert_eq!(params[1].name, "units");
        assert!(!params[1].required);
        assert_eq!(params[1].default, Some(json!("metric")));
        assert_eq!(params[1].description.as_deref(), Some("Unit system"));
        assert_eq!(
            params[1].enum_values,
            Some(vec![json!("metric"), json!("imperial")])
        );

        assert_eq!(params[2].param_type, ParamType::Number);
        assert!(!params[2].required);

        assert_eq!(params[3].param_type, ParamType::Boolean);
        assert!(params[3].required);
    }

    #[test]
    fn test_flat_params_outer_description_wins() {
        let query = Schema::string()
            .describe("inner")
            .optional()
            .describe("outer");
        let schema = Schema::object([("q", query)]);
        let params = schema_to_flat_params(&schema);
        assert_eq!(params[0].description.as_deref(), Some("outer"));
    }

    #[test]
    fn test_flat_params_non_object() {
        assert!(schema_to_flat_params(&Schema::string()).is_empty());
    }

    #[test]
    fn test_json_schema() {
        let doc = schema_to_json_schema(&weather_schema());
        assert_eq!(
            doc,
            json!({
                "type": "object",
                "properties": {
                    "city": {"type": "string", "minLength": 1, "description": "City name"},
                    "units": {
                        "type": "string",
                        "enum": ["metric", "imperial"],
                        "description": "Unit system",
                        "default": "metric"
                    },
                    "days": {"type": "number", "maximum": 7.0},
                    "verbose": {"type": "boolean", "nullable": true}
                },
                "required": ["city", "verbose"]
            })
        );
    }

    #[test]
    fn test_json_schema_literal_union_array() {
        let schema = Schema::union([
            Schema::literal(1),
            Schema::array(Schema::string()).min_items(1).max_items(3),
        ]);
        assert_eq!(
            schema_to_json_schema(&schema),
            json!({"oneOf": [
                {"type": "number", "const": 1},
                {"type": "array", "items": {"type": "string"}, "minItems": 1, "maxItems": 3}
            ]})
        );
    }

    #[test]
    fn test_json_schema_any_falls_back_to_object() {
        assert_eq!(
            schema_to_json_schema(&Schema::any()),
            json!({"type": "object"})
        );
    }

    #[test]
    fn test_translation_is_total_at_depth_five() {
        let leaves = vec![
            Schema::string(),
            Schema::number(),
            Schema::boolean(),
            Schema::enumeration(["a"]),
            Schema::literal(json!(null)),
            Schema::any(),
        ];
        for leaf in leaves {
            let mut node = leaf;
            for depth in 0..5 {
                node = match depth % 5 {
                    0 => Schema::array(node).nullable(),
                    1 => Schema::object([("f", node.optional())]),
                    2 => Schema::union([node, Schema::string()]),
                    3 => node.with_default(json!(1)),
                    _ => Schema::object([("g", node)]),
                };
            }
            let doc = schema_to_json_schema(&node);
            assert!(doc.is_object());
            let _ = schema_to_flat_params(&node);
        }
    }

    #[test]
    fn test_params_to_input_schema() {
        let params = vec![
            ParamDef::new("a", ParamType::String).describe("first"),
            ParamDef::new("b", ParamType::Number)
                .optional()
                .with_default(2),
        ];
        assert_eq!(
            params_to_input_schema(&params),
            json!({
                "type": "object",
                "properties": {
                    "a": {"type": "string", "description": "first"},
                    "b": {"type": "number", "default": 2}
                },
                "required": ["a"]
            })
        );
    }

    #[test]
    fn test_param_def_deserialize_defaults_required() {
        let p: ParamDef = serde_json::from_str(r#"{"name":"x","type":"boolean"}"#).unwrap();
        assert!(p.required);
        assert_eq!(p.param_type, ParamType::Boolean);
    }
}
