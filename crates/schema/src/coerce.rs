//! The fixed coercion set.
//!
//! Each repair is mechanical and type-directed; nothing here guesses at
//! semantics. Applied coercions are reported so validation errors can
//! say what was attempted.

use serde_json::{Map, Value};

use crate::declaration::{Schema, SchemaType};

/// One applied repair, anchored to the location it happened at.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Coercion {
    /// An object keyed `"0".."n-1"` was rebuilt as an array.
    ObjectToArray {
        /// Where the repair happened.
        path: String,
        /// Number of elements recovered.
        len: usize,
    },
    /// A numeric string became a number.
    StringToNumber {
        /// Where the repair happened.
        path: String,
    },
    /// A `"true"`/`"false"` string (any case) became a boolean.
    StringToBoolean {
        /// Where the repair happened.
        path: String,
    },
    /// An object key differing from a declared property only by case was
    /// renamed to the canonical spelling.
    KeyCaseCorrected {
        /// Where the repair happened.
        path: String,
        /// The key as received.
        from: String,
        /// The canonical property name.
        to: String,
    },
    /// A missing non-required property was filled with `null`.
    FilledMissingOptional {
        /// The object the property was added to.
        path: String,
        /// The property name.
        name: String,
    },
}

/// Apply the fixed coercion set to `value`, directed by `schema`.
///
/// Returns the repaired value and the list of repairs, in application
/// order. Idempotent: coercing an already-coerced value applies nothing.
#[must_use]
pub fn coerce(value: &Value, schema: &Schema) -> (Value, Vec<Coercion>) {
    let mut applied = Vec::new();
    let coerced = coerce_at(value, schema, "$", &mut applied);
    (coerced, applied)
}

fn coerce_at(value: &Value, schema: &Schema, path: &str, applied: &mut Vec<Coercion>) -> Value {
    match schema.schema_type {
        SchemaType::Array => coerce_array(value, schema, path, applied),
        SchemaType::Number => coerce_number(value, path, applied),
        SchemaType::Boolean => coerce_boolean(value, path, applied),
        SchemaType::Object => coerce_object(value, schema, path, applied),
        SchemaType::String => value.clone(),
    }
}

fn coerce_array(value: &Value, schema: &Schema, path: &str, applied: &mut Vec<Coercion>) -> Value {
    let items: Vec<Value> = match value {
        Value::Array(items) => items.clone(),
        Value::Object(map) => match numeric_keyed_elements(map) {
            Some(elements) => {
                applied.push(Coercion::ObjectToArray {
                    path: path.to_owned(),
                    len: elements.len(),
                });
                elements
            }
            None => return value.clone(),
        },
        _ => return value.clone(),
    };

    match &schema.items {
        Some(item_schema) => Value::Array(
            items
                .iter()
                .enumerate()
                .map(|(index, item)| {
                    coerce_at(item, item_schema, &format!("{path}[{index}]"), applied)
                })
                .collect(),
        ),
        None => Value::Array(items),
    }
}

/// Recover elements from an object whose keys are exactly the decimal
/// strings `"0".."n-1"`, in numeric order.
fn numeric_keyed_elements(map: &Map<String, Value>) -> Option<Vec<Value>> {
    if map.is_empty() {
        return Some(Vec::new());
    }
    let mut indexed: Vec<(usize, &Value)> = Vec::with_capacity(map.len());
    for (key, item) in map {
        let index = key.parse::<usize>().ok()?;
        // Reject "01"-style keys so the reconstruction is unambiguous.
        if key != &index.to_string() {
            return None;
        }
        indexed.push((index, item));
    }
    indexed.sort_by_key(|(index, _)| *index);
    if indexed
        .iter()
        .enumerate()
        .any(|(expected, (index, _))| expected != *index)
    {
        return None;
    }
    Some(indexed.into_iter().map(|(_, item)| item.clone()).collect())
}

fn coerce_number(value: &Value, path: &str, applied: &mut Vec<Coercion>) -> Value {
    let Value::String(s) = value else {
        return value.clone();
    };
    let trimmed = s.trim();
    let number = trimmed
        .parse::<i64>()
        .map(serde_json::Number::from)
        .ok()
        .or_else(|| trimmed.parse::<f64>().ok().and_then(serde_json::Number::from_f64));
    match number {
        Some(n) => {
            applied.push(Coercion::StringToNumber {
                path: path.to_owned(),
            });
            Value::Number(n)
        }
        None => value.clone(),
    }
}

fn coerce_boolean(value: &Value, path: &str, applied: &mut Vec<Coercion>) -> Value {
    let Value::String(s) = value else {
        return value.clone();
    };
    let b = if s.eq_ignore_ascii_case("true") {
        true
    } else if s.eq_ignore_ascii_case("false") {
        false
    } else {
        return value.clone();
    };
    applied.push(Coercion::StringToBoolean {
        path: path.to_owned(),
    });
    Value::Bool(b)
}

fn coerce_object(value: &Value, schema: &Schema, path: &str, applied: &mut Vec<Coercion>) -> Value {
    let Value::Object(map) = value else {
        return value.clone();
    };
    let Some(properties) = &schema.properties else {
        return value.clone();
    };

    // Case-correct keys toward the canonical property names.
    let mut corrected = Map::with_capacity(map.len());
    for (key, item) in map {
        let canonical = if properties.contains_key(key) {
            None
        } else {
            properties
                .keys()
                .find(|name| name.eq_ignore_ascii_case(key))
                .cloned()
        };
        match canonical {
            Some(name) if !map.contains_key(&name) => {
                applied.push(Coercion::KeyCaseCorrected {
                    path: path.to_owned(),
                    from: key.clone(),
                    to: name.clone(),
                });
                corrected.insert(name, item.clone());
            }
            _ => {
                corrected.insert(key.clone(), item.clone());
            }
        }
    }

    // Recurse into known properties, then fill missing optionals.
    let mut result = Map::with_capacity(corrected.len());
    for (key, item) in &corrected {
        match properties.get(key) {
            Some(prop_schema) if !item.is_null() => {
                result.insert(
                    key.clone(),
                    coerce_at(item, prop_schema, &format!("{path}.{key}"), applied),
                );
            }
            _ => {
                result.insert(key.clone(), item.clone());
            }
        }
    }
    for name in properties.keys() {
        if !result.contains_key(name) && !schema.is_required(name) {
            applied.push(Coercion::FilledMissingOptional {
                path: path.to_owned(),
                name: name.clone(),
            });
            result.insert(name.clone(), Value::Null);
        }
    }

    Value::Object(result)
}
