//! Schema declarations.
//!
//! The subset accepted here mirrors what extraction and cognition nodes
//! declare in their configs: a `type`, optional `enum`, and the
//! `properties`/`required`/`items` combinators.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SchemaError;

/// The five supported schema types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    /// A JSON string.
    String,
    /// A JSON number (integer or float).
    Number,
    /// A JSON boolean.
    Boolean,
    /// A JSON array with an `items` schema.
    Array,
    /// A JSON object with `properties`.
    Object,
}

impl std::fmt::Display for SchemaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        };
        f.write_str(name)
    }
}

/// A parsed schema declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// The expected JSON type.
    #[serde(rename = "type")]
    pub schema_type: SchemaType,

    /// Closed set of allowed values.
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,

    /// Property schemas for objects, in declaration order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<IndexMap<String, Schema>>,

    /// Property names that must be present on objects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,

    /// Element schema for arrays.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Schema>>,
}

impl Schema {
    /// Parse a schema from its JSON declaration.
    pub fn from_value(decl: &Value) -> Result<Self, SchemaError> {
        serde_json::from_value(decl.clone()).map_err(|err| SchemaError::InvalidDeclaration {
            reason: err.to_string(),
        })
    }

    /// Whether `name` is listed in `required`.
    #[must_use]
    pub fn is_required(&self, name: &str) -> bool {
        self.required
            .as_ref()
            .is_some_and(|required| required.iter().any(|r| r == name))
    }
}
