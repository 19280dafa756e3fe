//! Command payload contracts.

use serde_json::Value;

/// Validates a command payload before its handler runs.
///
/// A failure becomes a permanent `CommandSchemaValidationError`.
pub trait Schema: Send + Sync {
    fn validate(&self, data: &Value) -> Result<(), String>;
}

/// Accepts any JSON object.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyObject;

impl Schema for AnyObject {
    fn validate(&self, data: &Value) -> Result<(), String> {
        if data.is_object() {
            Ok(())
        } else {
            Err("data must be an object".to_string())
        }
    }
}

/// JSON type a field must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Any,
    String,
    Number,
    Bool,
    Object,
    Array,
}

impl FieldType {
    fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldType::Any => true,
            FieldType::String => value.is_string(),
            FieldType::Number => value.is_number(),
            FieldType::Bool => value.is_boolean(),
            FieldType::Object => value.is_object(),
            FieldType::Array => value.is_array(),
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            FieldType::Any => "any",
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Bool => "boolean",
            FieldType::Object => "object",
            FieldType::Array => "array",
        }
    }
}

#[derive(Debug, Clone)]
struct FieldRule {
    name: String,
    kind: FieldType,
    required: bool,
}

/// Object schema with typed top-level fields.
///
/// ```
/// use domain::schema::{FieldType, ObjectSchema, Schema};
///
/// let schema = ObjectSchema::new()
///     .required("hello", FieldType::String)
///     .optional("count", FieldType::Number);
/// assert!(schema.validate(&serde_json::json!({"hello": "world"})).is_ok());
/// assert!(schema.validate(&serde_json::json!({"count": 1})).is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ObjectSchema {
    fields: Vec<FieldRule>,
    deny_unknown: bool,
}

impl ObjectSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, name: impl Into<String>, kind: FieldType) -> Self {
        self.fields.push(FieldRule {
            name: name.into(),
            kind,
            required: true,
        });
        self
    }

    pub fn optional(mut self, name: impl Into<String>, kind: FieldType) -> Self {
        self.fields.push(FieldRule {
            name: name.into(),
            kind,
            required: false,
        });
        self
    }

    /// Rejects fields that have no rule.
    pub fn deny_unknown(mut self) -> Self {
        self.deny_unknown = true;
        self
    }
}

impl Schema for ObjectSchema {
    fn validate(&self, data: &Value) -> Result<(), String> {
        let Some(object) = data.as_object() else {
            return Err("data must be an object".to_string());
        };

        for rule in &self.fields {
            match object.get(&rule.name) {
                None if rule.required => return Err(format!("\"{}\" is required", rule.name)),
                None => {}
                Some(value) if !rule.kind.accepts(value) => {
                    return Err(format!(
                        "\"{}\" must be of type {}",
                        rule.name,
                        rule.kind.as_str()
                    ));
                }
                Some(_) => {}
            }
        }

        if self.deny_unknown
            && let Some(unknown) = object
                .keys()
                .find(|key| !self.fields.iter().any(|rule| &rule.name == *key))
        {
            return Err(format!("\"{unknown}\" is not allowed"));
        }

        Ok(())
    }
}

/// Schema backed by a validation function.
pub struct SchemaFn<F>(F);

impl<F> Schema for SchemaFn<F>
where
    F: Fn(&Value) -> Result<(), String> + Send + Sync,
{
    fn validate(&self, data: &Value) -> Result<(), String> {
        (self.0)(data)
    }
}

/// Wraps a validation function as a [`Schema`].
pub fn schema_fn<F>(f: F) -> SchemaFn<F>
where
    F: Fn(&Value) -> Result<(), String> + Send + Sync,
{
    SchemaFn(f)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_any_object_rejects_non_objects() {
        assert!(AnyObject.validate(&json!({})).is_ok());
        assert!(AnyObject.validate(&json!("nope")).is_err());
    }

    #[test]
    fn test_object_schema_checks_required_and_types() {
        let schema = ObjectSchema::new()
            .required("hello", FieldType::String)
            .optional("count", FieldType::Number);

        assert!(schema.validate(&json!({"hello": "world", "extra": 1})).is_ok());
        assert_eq!(
            schema.validate(&json!({})).unwrap_err(),
            "\"hello\" is required"
        );
        assert_eq!(
            schema
                .validate(&json!({"hello": "world", "count": "1"}))
                .unwrap_err(),
            "\"count\" must be of type number"
        );
    }

    #[test]
    fn test_object_schema_can_deny_unknown_fields() {
        let schema = ObjectSchema::new()
            .required("hello", FieldType::String)
            .deny_unknown();
        assert_eq!(
            schema
                .validate(&json!({"hello": "world", "extra": 1}))
                .unwrap_err(),
            "\"extra\" is not allowed"
        );
    }

    #[test]
    fn test_schema_fn_delegates() {
        let schema = schema_fn(|data: &Value| {
            if data.get("forbidden").is_some() {
                Err("forbidden".to_string())
            } else {
                Ok(())
            }
        });
        assert!(schema.validate(&json!({})).is_ok());
        assert!(schema.validate(&json!({"forbidden": true})).is_err());
    }
}
