//! Validation against a declared schema.

use serde_json::Value;

use crate::declaration::{Schema, SchemaType};

/// One validation failure, anchored to a JSON-pointer-ish path.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Issue {
    /// Location of the failure (`$`, `$.emails[2].subject`, ...).
    pub path: String,
    /// What was wrong there.
    pub message: String,
}

impl std::fmt::Display for Issue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Validate a value against a schema, collecting every issue.
#[must_use]
pub fn validate(value: &Value, schema: &Schema) -> Vec<Issue> {
    let mut issues = Vec::new();
    check(value, schema, "$", &mut issues);
    issues
}

fn check(value: &Value, schema: &Schema, path: &str, issues: &mut Vec<Issue>) {
    let matches_type = match schema.schema_type {
        SchemaType::String => value.is_string(),
        SchemaType::Number => value.is_number(),
        SchemaType::Boolean => value.is_boolean(),
        SchemaType::Array => value.is_array(),
        SchemaType::Object => value.is_object(),
    };
    if !matches_type {
        issues.push(Issue {
            path: path.to_owned(),
            message: format!(
                "expected {expected}, got {got}",
                expected = schema.schema_type,
                got = json_type(value)
            ),
        });
        return;
    }

    if let Some(allowed) = &schema.enum_values {
        if !allowed.contains(value) {
            issues.push(Issue {
                path: path.to_owned(),
                message: format!("value {value} is not one of the allowed values"),
            });
        }
    }

    match (schema.schema_type, value) {
        (SchemaType::Array, Value::Array(items)) => {
            if let Some(item_schema) = &schema.items {
                for (index, item) in items.iter().enumerate() {
                    check(item, item_schema, &format!("{path}[{index}]"), issues);
                }
            }
        }
        (SchemaType::Object, Value::Object(map)) => {
            if let Some(required) = &schema.required {
                for name in required {
                    if !map.contains_key(name) {
                        issues.push(Issue {
                            path: path.to_owned(),
                            message: format!("missing required property {name:?}"),
                        });
                    }
                }
            }
            if let Some(properties) = &schema.properties {
                for (name, prop_schema) in properties {
                    match map.get(name) {
                        Some(prop_value) => {
                            // Missing optionals are filled with null by the
                            // coercer; a null optional is accepted here.
                            if prop_value.is_null() && !schema.is_required(name) {
                                continue;
                            }
                            check(prop_value, prop_schema, &format!("{path}.{name}"), issues);
                        }
                        None if schema.is_required(name) => {} // reported above
                        None => issues.push(Issue {
                            path: format!("{path}.{name}"),
                            message: format!("missing property {name:?}"),
                        }),
                    }
                }
            }
        }
        _ => {}
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
