//! Resolution context for template evaluation.
//!
//! Holds the data a `{{path}}` can address, layered by precedence:
//!
//! 1. iteration bindings (innermost scope first)
//! 2. the current record (`current.*`)
//! 3. records by id (`email_001.*`)
//! 4. node-namespaced globals (`alias.field`, flat key paths)
//! 5. direct globals (`apiKey`)
//!
//! The engine snapshots store contents into a context before resolving a
//! node's inputs; iterate and route nodes push and pop binding scopes as
//! they enter and leave their bodies.

use std::collections::HashMap;

use serde_json::Value;
use webpilot_core::record_id;

use crate::error::ExpressionError;
use crate::path::{Path, PathSegment};

/// Layered lookup context for `{{path}}` resolution.
#[derive(Debug, Clone, Default)]
pub struct ResolveContext {
    /// Binding scopes, outermost first. Lookup walks them in reverse.
    scopes: Vec<HashMap<String, Value>>,
    /// Merged view of the current iteration's record, if any.
    current_record: Option<Value>,
    /// Merged record views by record id.
    records: HashMap<String, Value>,
    /// Global store entries keyed by their key path
    /// (`apiKey`, `extract_emails.count`).
    globals: serde_json::Map<String, Value>,
}

impl ResolveContext {
    /// Create an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the global entries (flat key-path map).
    pub fn set_globals(&mut self, globals: serde_json::Map<String, Value>) {
        self.globals = globals;
    }

    /// Insert a single global entry by key path.
    pub fn set_global(&mut self, key: impl Into<String>, value: Value) {
        self.globals.insert(key.into(), value);
    }

    /// Insert a record's merged view under its id.
    pub fn set_record(&mut self, id: impl Into<String>, view: Value) {
        self.records.insert(id.into(), view);
    }

    /// Set the current iteration record's merged view.
    pub fn set_current_record(&mut self, view: Value) {
        self.current_record = Some(view);
    }

    /// Clear the current iteration record.
    pub fn clear_current_record(&mut self) {
        self.current_record = None;
    }

    /// Whether a current record is in scope.
    #[must_use]
    pub fn has_current_record(&self) -> bool {
        self.current_record.is_some()
    }

    /// Push a fresh binding scope. Bindings added afterwards shadow
    /// outer scopes until [`pop_scope`](Self::pop_scope).
    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    /// Pop the innermost binding scope, discarding its bindings.
    pub fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    /// Bind a name in the innermost scope. Pushes a scope if none exists.
    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        if self.scopes.is_empty() {
            self.scopes.push(HashMap::new());
        }
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.into(), value);
        }
    }

    /// Look up a binding by name, innermost scope first.
    #[must_use]
    pub fn binding(&self, name: &str) -> Option<&Value> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    /// Resolve a parsed path against this context.
    pub fn lookup(&self, path: &Path) -> Result<Value, ExpressionError> {
        let segments = path.segments();
        let Some(head) = path.head() else {
            return Err(ExpressionError::unresolved(
                path.source(),
                "path must start with an identifier",
            ));
        };

        // 1. Iteration bindings win over everything.
        if let Some(value) = self.binding(head) {
            return descend(path, value, &segments[1..]);
        }

        // 2. Current record shorthand.
        if head == "current" {
            if let Some(view) = &self.current_record {
                return descend(path, view, &segments[1..]);
            }
            return Err(ExpressionError::unresolved(
                path.source(),
                "no current record in scope",
            ));
        }

        // 3. Record-id pattern, only when such a record exists.
        if record_id::is_record_id(head) {
            if let Some(view) = self.records.get(head) {
                return descend(path, view, &segments[1..]);
            }
        }

        // 4. Node-namespaced global: the first two key segments form the
        //    flat key path (`alias.field`).
        if let (Some(PathSegment::Key(first)), Some(PathSegment::Key(second))) =
            (segments.first(), segments.get(1))
        {
            let flat = format!("{first}.{second}");
            if let Some(value) = self.globals.get(&flat) {
                return descend(path, value, &segments[2..]);
            }
        }

        // 5. Direct global.
        if let Some(value) = self.globals.get(head) {
            return descend(path, value, &segments[1..]);
        }

        Err(ExpressionError::unresolved(
            path.source(),
            format!("{head:?} is not a binding, record, or variable"),
        ))
    }
}

/// Walk the remaining segments into a value, cloning the result.
fn descend(
    path: &Path,
    value: &Value,
    segments: &[PathSegment],
) -> Result<Value, ExpressionError> {
    let mut cursor = value;
    for segment in segments {
        cursor = match (segment, cursor) {
            (PathSegment::Key(key), Value::Object(map)) => map.get(key).ok_or_else(|| {
                ExpressionError::unresolved(path.source(), format!("missing field {key:?}"))
            })?,
            (PathSegment::Index(index), Value::Array(items)) => {
                items.get(*index).ok_or_else(|| {
                    ExpressionError::unresolved(
                        path.source(),
                        format!("index {index} out of bounds (len {})", items.len()),
                    )
                })?
            }
            (PathSegment::Key(key), other) => {
                return Err(ExpressionError::unresolved(
                    path.source(),
                    format!("cannot access field {key:?} on {}", type_name(other)),
                ));
            }
            (PathSegment::Index(index), other) => {
                return Err(ExpressionError::unresolved(
                    path.source(),
                    format!("cannot index [{index}] into {}", type_name(other)),
                ));
            }
        };
    }
    Ok(cursor.clone())
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
