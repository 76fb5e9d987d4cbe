//! Field definitions

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field definition in a model schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field name
    pub name: String,

    /// Field type (uuid, string, number, boolean, datetime, json)
    #[serde(rename = "type")]
    pub field_type: FieldType,

    /// Required on create and replace
    #[serde(default)]
    pub required: bool,

    /// Values must be distinct across rows
    #[serde(default)]
    pub unique: bool,

    /// Clients may not write this field
    #[serde(default)]
    pub read_only: bool,

    /// Accepted on input, never returned
    #[serde(default)]
    pub write_only: bool,

    /// Default value applied on create when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl FieldDef {
    /// Optional field of the given type
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
            unique: false,
            read_only: false,
            write_only: false,
            default: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn write_only(mut self) -> Self {
        self.write_only = true;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }
}

/// Field types supported by the schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Uuid,
    String,
    Number,
    Integer,
    Boolean,
    Datetime,
    Json,
}

impl FieldType {
    /// Validate a JSON value against this field type
    pub fn validate(&self, value: &Value) -> bool {
        match self {
            FieldType::Uuid => value
                .as_str()
                .map(|s| uuid::Uuid::parse_str(s).is_ok())
                .unwrap_or(false),
            FieldType::String => value.is_string(),
            FieldType::Number => value.is_number(),
            FieldType::Integer => value.is_i64() || value.is_u64(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Datetime => value
                .as_str()
                .map(|s| chrono::DateTime::parse_from_rfc3339(s).is_ok())
                .unwrap_or(false),
            FieldType::Json => value.is_object() || value.is_array(),
        }
    }

    /// Convert a query-string value into this type, if it parses
    pub fn coerce(&self, value: &Value) -> Option<Value> {
        let Some(raw) = value.as_str() else {
            return self.validate(value).then(|| value.clone());
        };
        match self {
            FieldType::Number => raw
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(|n| match raw.parse::<i64>() {
                    Ok(i) => Value::from(i),
                    Err(_) => Value::Number(n),
                }),
            FieldType::Integer => raw.parse::<i64>().ok().map(Value::from),
            FieldType::Boolean => match raw {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            FieldType::Json => serde_json::from_str(raw).ok(),
            _ => self.validate(value).then(|| value.clone()),
        }
    }

    /// Lowercase name as written in configuration
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Uuid => "uuid",
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Integer => "integer",
            FieldType::Boolean => "boolean",
            FieldType::Datetime => "datetime",
            FieldType::Json => "json",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_type_validation() {
        assert!(FieldType::Uuid.validate(&json!("550e8400-e29b-41d4-a716-446655440000")));
        assert!(!FieldType::Uuid.validate(&json!("not-a-uuid")));
        assert!(FieldType::Datetime.validate(&json!("2024-01-15T10:30:00Z")));
        assert!(!FieldType::Datetime.validate(&json!("yesterday")));
        assert!(FieldType::Integer.validate(&json!(3)));
        assert!(!FieldType::Integer.validate(&json!(3.5)));
        assert!(FieldType::Json.validate(&json!({"a": 1})));
        assert!(!FieldType::Json.validate(&json!("{}")));
    }

    #[test]
    fn test_coerce_query_values() {
        assert_eq!(FieldType::Integer.coerce(&json!("42")), Some(json!(42)));
        assert_eq!(FieldType::Number.coerce(&json!("1.5")), Some(json!(1.5)));
        assert_eq!(FieldType::Boolean.coerce(&json!("true")), Some(json!(true)));
        assert_eq!(FieldType::Boolean.coerce(&json!("yes")), None);
        assert_eq!(FieldType::String.coerce(&json!("x")), Some(json!("x")));
        assert_eq!(FieldType::Integer.coerce(&json!(7)), Some(json!(7)));
    }

    #[test]
    fn test_field_def_deserialize() {
        let field: FieldDef =
            serde_json::from_value(json!({"name": "email", "type": "string", "unique": true}))
                .unwrap();
        assert_eq!(field.field_type, FieldType::String);
        assert!(field.unique);
        assert!(!field.required);
    }
}
