//! Declared tool input schemas.
//!
//! A [`ToolSchema`] is a flat list of fields with primitive or array types
//! and optional numeric bounds. It serves two purposes:
//! - rendered as JSON Schema and sent to the model verbatim
//! - used by the executor to reject malformed arguments before dispatch

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// The type of a single input field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Number,
    Integer,
    Boolean,
    Array(Box<FieldKind>),
}

impl FieldKind {
    fn json_type(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Number => "number",
            FieldKind::Integer => "integer",
            FieldKind::Boolean => "boolean",
            FieldKind::Array(_) => "array",
        }
    }

    fn to_json_schema(&self) -> Value {
        match self {
            FieldKind::Array(item) => json!({
                "type": "array",
                "items": item.to_json_schema(),
            }),
            other => json!({ "type": other.json_type() }),
        }
    }

    /// Does `value` have this type? Integers accept floats with no
    /// fractional part, since some providers emit `5.0`.
    fn matches(&self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Number => value.is_number(),
            FieldKind::Integer => as_integer(value).is_some(),
            FieldKind::Boolean => value.is_boolean(),
            FieldKind::Array(item) => value
                .as_array()
                .is_some_and(|items| items.iter().all(|v| item.matches(v))),
        }
    }
}

fn as_integer(value: &Value) -> Option<f64> {
    if value.is_i64() || value.is_u64() {
        return value.as_f64();
    }
    value.as_f64().filter(|f| f.fract() == 0.0)
}

/// One named input field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
    pub description: String,

    /// Inclusive lower bound for numeric fields (or numeric array items).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,

    /// Inclusive upper bound for numeric fields (or numeric array items).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
}

impl FieldSpec {
    pub fn required(name: impl Into<String>, kind: FieldKind, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
            description: description.into(),
            minimum: None,
            maximum: None,
        }
    }

    pub fn optional(name: impl Into<String>, kind: FieldKind, description: impl Into<String>) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind, description)
        }
    }

    /// Restrict the field to `[min, max]`.
    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.minimum = Some(min);
        self.maximum = Some(max);
        self
    }

    pub fn min(mut self, min: f64) -> Self {
        self.minimum = Some(min);
        self
    }

    fn check_bounds(&self, value: &Value) -> Result<(), String> {
        let numbers: Vec<f64> = match value {
            Value::Array(items) => items.iter().filter_map(Value::as_f64).collect(),
            other => other.as_f64().into_iter().collect(),
        };
        for n in numbers {
            if let Some(min) = self.minimum.filter(|min| n < *min) {
                return Err(format!("field '{}' must be >= {min}, got {n}", self.name));
            }
            if let Some(max) = self.maximum.filter(|max| n > *max) {
                return Err(format!("field '{}' must be <= {max}, got {n}", self.name));
            }
        }
        Ok(())
    }
}

/// The full input schema of a tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub fields: Vec<FieldSpec>,
}

impl ToolSchema {
    /// A schema with no fields (the tool takes no input).
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    /// Render as a JSON Schema object.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        for field in &self.fields {
            let mut prop = field.kind.to_json_schema();
            prop["description"] = Value::String(field.description.clone());
            let bounded = match &field.kind {
                FieldKind::Array(_) => &mut prop["items"],
                _ => &mut prop,
            };
            if let Some(min) = field.minimum {
                bounded["minimum"] = json!(min);
            }
            if let Some(max) = field.maximum {
                bounded["maximum"] = json!(max);
            }
            properties.insert(field.name.clone(), prop);
        }
        let required: Vec<&str> = self
            .fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.as_str())
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Check `arguments` against the schema. Unknown extra fields are
    /// ignored; `null` counts as absent.
    pub fn validate(&self, arguments: &Value) -> Result<(), String> {
        let Some(object) = arguments.as_object() else {
            return Err(format!(
                "arguments must be a JSON object, got {}",
                type_name(arguments)
            ));
        };

        for field in &self.fields {
            match object.get(&field.name) {
                None | Some(Value::Null) => {
                    if field.required {
                        return Err(format!("missing required field '{}'", field.name));
                    }
                }
                Some(value) => {
                    if !field.kind.matches(value) {
                        return Err(format!(
                            "field '{}' must be of type {}, got {}",
                            field.name,
                            describe_kind(&field.kind),
                            type_name(value)
                        ));
                    }
                    field.check_bounds(value)?;
                }
            }
        }
        Ok(())
    }
}

fn describe_kind(kind: &FieldKind) -> String {
    match kind {
        FieldKind::Array(item) => format!("array of {}", describe_kind(item)),
        other => other.json_type().to_string(),
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
