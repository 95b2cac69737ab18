//! Schema errors.

use serde_json::Value;

use crate::coerce::Coercion;
use crate::declaration::Schema;
use crate::validate::Issue;

/// How many validation issues a [`SchemaError::ValidationFailed`] carries.
const MAX_REPORTED_ISSUES: usize = 3;

/// Errors from schema parsing and validation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SchemaError {
    /// The schema declaration itself was malformed.
    #[error("invalid schema declaration: {reason}")]
    InvalidDeclaration {
        /// What was wrong with the declaration.
        reason: String,
    },

    /// The value failed validation even after coercion.
    #[error("schema validation failed: {}", format_issues(issues))]
    ValidationFailed {
        /// The schema the value was validated against.
        expected: Box<Schema>,
        /// The value as received, before coercion.
        received: Box<Value>,
        /// The first few validation issues (at most three).
        issues: Vec<Issue>,
        /// The coercions that were attempted before giving up.
        coercions_attempted: Vec<Coercion>,
    },
}

impl SchemaError {
    /// Build a [`SchemaError::ValidationFailed`], truncating the issue list.
    #[must_use]
    pub fn validation_failed(
        expected: Schema,
        received: Value,
        mut issues: Vec<Issue>,
        coercions_attempted: Vec<Coercion>,
    ) -> Self {
        issues.truncate(MAX_REPORTED_ISSUES);
        Self::ValidationFailed {
            expected: Box::new(expected),
            received: Box::new(received),
            issues,
            coercions_attempted,
        }
    }
}

fn format_issues(issues: &[Issue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declaration::Schema;
    use serde_json::json;

    #[test]
    fn validation_failed_truncates_issues_to_three() {
        let schema = Schema::from_value(&json!({"type": "string"})).unwrap();
        let issues = (0..5)
            .map(|i| Issue {
                path: format!("$[{i}]"),
                message: "bad".into(),
            })
            .collect();
        let err = SchemaError::validation_failed(schema, json!(null), issues, Vec::new());
        match err {
            SchemaError::ValidationFailed { issues, .. } => assert_eq!(issues.len(), 3),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn display_lists_issue_paths() {
        let schema = Schema::from_value(&json!({"type": "number"})).unwrap();
        let err = SchemaError::validation_failed(
            schema,
            json!("x"),
            vec![Issue {
                path: "$".into(),
                message: "expected number, got string".into(),
            }],
            Vec::new(),
        );
        assert!(err.to_string().contains("expected number"));
    }
}
