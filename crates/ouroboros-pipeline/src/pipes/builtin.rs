//! Built-in pipes

use super::{ArgumentMetadata, PipeTransform};
use crate::error::{PipelineError, PipelineResult, ValidationError, ValidationErrors};
use async_trait::async_trait;
use serde_json::Value;

fn invalid(metadata: &ArgumentMetadata, message: &str, error_type: &str) -> PipelineError {
    let mut errors = ValidationErrors::new();
    errors.add(ValidationError::new(
        metadata.location(),
        metadata.field(),
        message,
        error_type,
    ));
    PipelineError::Validation(errors)
}

/// Parses a numeric string (or passes an integer through) into an integer.
#[derive(Debug, Default, Clone, Copy)]
pub struct ParseIntPipe;

#[async_trait]
impl PipeTransform for ParseIntPipe {
    async fn transform(&self, value: Value, metadata: &ArgumentMetadata) -> PipelineResult<Value> {
        let parsed = match &value {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        parsed
            .map(Value::from)
            .ok_or_else(|| invalid(metadata, "Validation failed (numeric string is expected)", "int_parsing"))
    }
}

/// Parses `"true"`/`"false"` (or passes a boolean through).
#[derive(Debug, Default, Clone, Copy)]
pub struct ParseBoolPipe;

#[async_trait]
impl PipeTransform for ParseBoolPipe {
    async fn transform(&self, value: Value, metadata: &ArgumentMetadata) -> PipelineResult<Value> {
        match value {
            Value::Bool(b) => Ok(Value::Bool(b)),
            Value::String(ref s) if s == "true" => Ok(Value::Bool(true)),
            Value::String(ref s) if s == "false" => Ok(Value::Bool(false)),
            _ => Err(invalid(
                metadata,
                "Validation failed (boolean string is expected)",
                "bool_parsing",
            )),
        }
    }
}

/// Substitutes a default for a `null` value.
#[derive(Debug, Clone)]
pub struct DefaultValuePipe {
    default: Value,
}

impl DefaultValuePipe {
    pub fn new(default: impl Into<Value>) -> Self {
        Self {
            default: default.into(),
        }
    }
}

#[async_trait]
impl PipeTransform for DefaultValuePipe {
    async fn transform(&self, value: Value, _metadata: &ArgumentMetadata) -> PipelineResult<Value> {
        if value.is_null() {
            Ok(self.default.clone())
        } else {
            Ok(value)
        }
    }
}

/// JSON type a validated field must have
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Integer => "integer",
            ValueType::Number => "number",
            ValueType::Boolean => "boolean",
            ValueType::Array => "array",
            ValueType::Object => "object",
        }
    }

    pub fn matches(&self, value: &Value) -> bool {
        match self {
            ValueType::String => value.is_string(),
            ValueType::Integer => value.is_i64() || value.is_u64(),
            ValueType::Number => value.is_number(),
            ValueType::Boolean => value.is_boolean(),
            ValueType::Array => value.is_array(),
            ValueType::Object => value.is_object(),
        }
    }
}

#[derive(Debug, Clone)]
struct FieldRule {
    name: String,
    value_type: Option<ValueType>,
    required: bool,
}

/// Checks an object argument against a field list.
///
/// Every failing field is reported, not only the first.
#[derive(Debug, Clone, Default)]
pub struct ValidationPipe {
    fields: Vec<FieldRule>,
}

impl ValidationPipe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Field must be present and non-null.
    pub fn required(mut self, name: impl Into<String>) -> Self {
        self.fields.push(FieldRule {
            name: name.into(),
            value_type: None,
            required: true,
        });
        self
    }

    /// Field must be present, non-null and of `value_type`.
    pub fn required_typed(mut self, name: impl Into<String>, value_type: ValueType) -> Self {
        self.fields.push(FieldRule {
            name: name.into(),
            value_type: Some(value_type),
            required: true,
        });
        self
    }

    /// Field is optional but must be of `value_type` when present.
    pub fn optional(mut self, name: impl Into<String>, value_type: ValueType) -> Self {
        self.fields.push(FieldRule {
            name: name.into(),
            value_type: Some(value_type),
            required: false,
        });
        self
    }
}

#[async_trait]
impl PipeTransform for ValidationPipe {
    async fn transform(&self, value: Value, metadata: &ArgumentMetadata) -> PipelineResult<Value> {
        let location = metadata.location();
        let object = match value.as_object() {
            Some(object) => object,
            None => return Err(invalid(metadata, "Validation failed (object is expected)", "type_error")),
        };

        let mut errors = ValidationErrors::new();
        for rule in &self.fields {
            match object.get(&rule.name) {
                None | Some(Value::Null) if rule.required => errors.add(ValidationError::new(
                    location,
                    &rule.name,
                    "field required",
                    "missing",
                )),
                None | Some(Value::Null) => {}
                Some(field) => {
                    if let Some(expected) = rule.value_type {
                        if !expected.matches(field) {
                            errors.add(ValidationError::new(
                                location,
                                &rule.name,
                                format!("value is not a valid {}", expected.as_str()),
                                "type_error",
                            ));
                        }
                    }
                }
            }
        }
        errors.into_result()?;
        Ok(value)
    }
}
