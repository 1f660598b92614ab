use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use thiserror::Error;

use orderdesk_db::RepositoryError;

use crate::llm::ToolSchema;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldType {
    String,
    PositiveInteger,
    ObjectArray(Vec<FieldSpec>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub field_type: FieldType,
    pub required: bool,
    pub description: &'static str,
}

impl FieldSpec {
    pub fn required(name: &'static str, field_type: FieldType, description: &'static str) -> Self {
        Self { name, field_type, required: true, description }
    }

    pub fn optional(name: &'static str, field_type: FieldType, description: &'static str) -> Self {
        Self { name, field_type, required: false, description }
    }

    fn json_schema(&self) -> Value {
        match &self.field_type {
            FieldType::String => json!({"type": "string", "description": self.description}),
            FieldType::PositiveInteger => {
                json!({"type": "integer", "minimum": 1, "description": self.description})
            }
            FieldType::ObjectArray(fields) => json!({
                "type": "array",
                "description": self.description,
                "items": object_schema(fields),
            }),
        }
    }
}

/// Declared shape of a tool, rendered to JSON Schema for the model and used
/// to validate arguments before the handler runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub fields: Vec<FieldSpec>,
}

impl ToolSpec {
    pub fn json_schema(&self) -> Value {
        object_schema(&self.fields)
    }

    pub fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name.to_string(),
            description: self.description.to_string(),
            parameters: self.json_schema(),
        }
    }
}

fn object_schema(fields: &[FieldSpec]) -> Value {
    let properties = fields
        .iter()
        .map(|field| (field.name.to_string(), field.json_schema()))
        .collect::<Map<_, _>>();
    let required = fields.iter().filter(|field| field.required).map(|field| field.name).collect::<Vec<_>>();

    json!({"type": "object", "properties": properties, "required": required})
}

/// Per-turn facts a handler may need beyond its arguments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolContext {
    pub sender_id: String,
    pub correlation_id: String,
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid tool call: {0}")]
    Validation(String),
    #[error("tool backend failed: {0}")]
    Backend(String),
}

impl From<RepositoryError> for ToolError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Validation(message) => Self::Validation(message),
            other => Self::Backend(other.to_string()),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("tool name must not be empty")]
    EmptyName,
    #[error("tool `{0}` is already registered")]
    DuplicateTool(String),
    #[error("tool `{tool}` declares an invalid field: {reason}")]
    InvalidField { tool: String, reason: String },
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn spec(&self) -> ToolSpec;

    /// Receives arguments that already passed validation against `spec()`.
    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<Value, ToolError>;
}

struct RegisteredTool {
    spec: ToolSpec,
    handler: Arc<dyn Tool>,
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, RegisteredTool>,
}

impl ToolRegistry {
    pub fn register<T>(&mut self, tool: T) -> Result<(), RegistryError>
    where
        T: Tool + 'static,
    {
        let spec = tool.spec();
        validate_spec(&spec)?;
        if self.tools.contains_key(spec.name) {
            return Err(RegistryError::DuplicateTool(spec.name.to_string()));
        }

        self.tools.insert(spec.name.to_string(), RegisteredTool { spec, handler: Arc::new(tool) });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools.values().map(|tool| tool.spec.schema()).collect()
    }

    pub async fn dispatch(
        &self,
        ctx: &ToolContext,
        name: &str,
        args: Value,
    ) -> Result<Value, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::Validation(format!("unknown tool `{name}`")))?;
        validate_object(&tool.spec.fields, &args, name)?;

        tool.handler.execute(ctx, args).await
    }
}

fn validate_spec(spec: &ToolSpec) -> Result<(), RegistryError> {
    if spec.name.trim().is_empty() {
        return Err(RegistryError::EmptyName);
    }
    validate_field_list(spec.name, &spec.fields)
}

fn validate_field_list(tool: &str, fields: &[FieldSpec]) -> Result<(), RegistryError> {
    let mut seen = HashSet::new();
    for field in fields {
        let invalid = |reason: String| RegistryError::InvalidField { tool: tool.to_string(), reason };

        if field.name.trim().is_empty() {
            return Err(invalid("field name must not be empty".to_string()));
        }
        if !seen.insert(field.name) {
            return Err(invalid(format!("field `{}` is declared twice", field.name)));
        }
        if let FieldType::ObjectArray(element_fields) = &field.field_type {
            if element_fields.is_empty() {
                return Err(invalid(format!("array field `{}` declares no element fields", field.name)));
            }
            validate_field_list(tool, element_fields)?;
        }
    }
    Ok(())
}

/// Unknown keys are ignored; only declared fields are checked.
fn validate_object(fields: &[FieldSpec], value: &Value, path: &str) -> Result<(), ToolError> {
    let object = value
        .as_object()
        .ok_or_else(|| ToolError::Validation(format!("`{path}` arguments must be an object")))?;

    for field in fields {
        let field_path = format!("{path}.{}", field.name);
        match object.get(field.name) {
            None | Some(Value::Null) if field.required => {
                return Err(ToolError::Validation(format!("`{field_path}` is required")));
            }
            None | Some(Value::Null) => {}
            Some(present) => validate_value(&field.field_type, present, &field_path)?,
        }
    }
    Ok(())
}

fn validate_value(field_type: &FieldType, value: &Value, path: &str) -> Result<(), ToolError> {
    match field_type {
        FieldType::String => {
            if !value.is_string() {
                return Err(ToolError::Validation(format!("`{path}` must be a string")));
            }
        }
        FieldType::PositiveInteger => {
            positive_u32(value)
                .ok_or_else(|| ToolError::Validation(format!("`{path}` must be a positive integer")))?;
        }
        FieldType::ObjectArray(element_fields) => {
            let items = value
                .as_array()
                .ok_or_else(|| ToolError::Validation(format!("`{path}` must be an array")))?;
            for (index, item) in items.iter().enumerate() {
                validate_object(element_fields, item, &format!("{path}[{index}]"))?;
            }
        }
    }
    Ok(())
}

fn positive_u32(value: &Value) -> Option<u32> {
    value.as_u64().filter(|number| *number > 0).and_then(|number| u32::try_from(number).ok())
}

pub(crate) fn string_arg<'a>(args: &'a Value, name: &str) -> Result<&'a str, ToolError> {
    args.get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::Validation(format!("`{name}` must be a string")))
}

pub(crate) fn optional_string_arg<'a>(args: &'a Value, name: &str) -> Option<&'a str> {
    args.get(name).and_then(Value::as_str)
}

pub(crate) fn positive_arg(args: &Value, name: &str) -> Result<u32, ToolError> {
    args.get(name)
        .and_then(positive_u32)
        .ok_or_else(|| ToolError::Validation(format!("`{name}` must be a positive integer")))
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::{
        FieldSpec, FieldType, RegistryError, Tool, ToolContext, ToolError, ToolRegistry, ToolSpec,
    };

    struct EchoTool {
        spec: ToolSpec,
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn spec(&self) -> ToolSpec {
            self.spec.clone()
        }

        async fn execute(&self, _ctx: &ToolContext, args: Value) -> Result<Value, ToolError> {
            Ok(json!({"echo": args}))
        }
    }

    fn items_spec(name: &'static str) -> ToolSpec {
        ToolSpec {
            name,
            description: "echo",
            fields: vec![FieldSpec::required(
                "items",
                FieldType::ObjectArray(vec![
                    FieldSpec::required("productId", FieldType::String, "id"),
                    FieldSpec::required("quantity", FieldType::PositiveInteger, "qty"),
                ]),
                "lines",
            )],
        }
    }

    fn ctx() -> ToolContext {
        ToolContext { sender_id: "5511".to_string(), correlation_id: "turn-1".to_string() }
    }

    #[test]
    fn registration_rejects_bad_specs() {
        let mut registry = ToolRegistry::default();
        registry.register(EchoTool { spec: items_spec("echo") }).expect("first registration");

        let duplicate = registry.register(EchoTool { spec: items_spec("echo") });
        assert_eq!(duplicate, Err(RegistryError::DuplicateTool("echo".to_string())));

        let empty = registry.register(EchoTool { spec: items_spec("  ") });
        assert_eq!(empty, Err(RegistryError::EmptyName));

        let twice = ToolSpec {
            name: "twice",
            description: "",
            fields: vec![
                FieldSpec::required("query", FieldType::String, ""),
                FieldSpec::optional("query", FieldType::String, ""),
            ],
        };
        assert!(matches!(
            registry.register(EchoTool { spec: twice }),
            Err(RegistryError::InvalidField { .. })
        ));

        let bare_array = ToolSpec {
            name: "bare",
            description: "",
            fields: vec![FieldSpec::required("items", FieldType::ObjectArray(Vec::new()), "")],
        };
        assert!(matches!(
            registry.register(EchoTool { spec: bare_array }),
            Err(RegistryError::InvalidField { .. })
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn renders_nested_json_schema() {
        let schema = items_spec("echo").json_schema();

        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"], json!(["items"]));
        assert_eq!(schema["properties"]["items"]["type"], "array");
        assert_eq!(schema["properties"]["items"]["items"]["properties"]["quantity"]["minimum"], 1);
    }

    #[tokio::test]
    async fn argument_validation_catches_shape_errors() {
        let mut registry = ToolRegistry::default();
        registry.register(EchoTool { spec: items_spec("echo") }).expect("register");

        let cases = [
            json!("not an object"),
            json!({}),
            json!({"items": "p1"}),
            json!({"items": [{"productId": 1, "quantity": 1}]}),
            json!({"items": [{"productId": "p1", "quantity": 0}]}),
            json!({"items": [{"productId": "p1", "quantity": -2}]}),
            json!({"items": [{"productId": "p1", "quantity": 1.5}]}),
            json!({"items": [{"productId": "p1"}]}),
        ];
        for args in cases {
            let result = registry.dispatch(&ctx(), "echo", args.clone()).await;
            assert!(matches!(result, Err(ToolError::Validation(_))), "accepted {args}");
        }

        let valid = json!({"items": [{"productId": "p1", "quantity": 2}], "extra": true});
        registry.dispatch(&ctx(), "echo", valid).await.expect("valid arguments");
    }

    #[tokio::test]
    async fn dispatch_fails_fast_for_unknown_and_invalid_calls() {
        let mut registry = ToolRegistry::default();
        registry.register(EchoTool { spec: items_spec("echo") }).expect("register");

        let unknown = registry.dispatch(&ctx(), "drop_tables", json!({})).await;
        assert!(matches!(unknown, Err(ToolError::Validation(_))));

        let invalid = registry.dispatch(&ctx(), "echo", json!({"items": [{}]})).await;
        assert!(matches!(invalid, Err(ToolError::Validation(_))));

        let args = json!({"items": [{"productId": "p1", "quantity": 3}]});
        let output = registry.dispatch(&ctx(), "echo", args.clone()).await.expect("dispatch");
        assert_eq!(output, json!({"echo": args}));
    }
}
