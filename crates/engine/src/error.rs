//! Engine errors and node-failure details.
//!
//! [`EngineError`] covers failures that reject an execution before (or
//! outside) node dispatch. Failures *of* a node never raise -- they
//! become a [`NodeFailure`] inside the node's report entry, and
//! stop-on-error handles the rest.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use webpilot_ai::AiError;
use webpilot_browser::BrowserError;
use webpilot_expression::ExpressionError;
use webpilot_schema::SchemaError;
use webpilot_store::StoreError;
use webpilot_workflow::WorkflowError;

/// Errors that reject an execution request outright.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Another execution of this workflow is already in flight.
    #[error("an execution is already in flight for this workflow")]
    Busy,

    /// Structural failure (bad selection, unknown alias, ...).
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    /// Store failure outside node dispatch.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Browser failure outside node dispatch (session reset).
    #[error(transparent)]
    Browser(#[from] BrowserError),
}

/// Structured failure carried by a node's report entry.
///
/// `code` follows the wire error-code set (`selector_failed`,
/// `ai_schema_violation`, `timeout`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeFailure {
    /// Machine-readable code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Structured context (attempted coercions, validation issues, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl NodeFailure {
    /// Build a failure with a code and message.
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    /// Attach structured details.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Whether this failure is a timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.code == "timeout"
    }

    /// Whether this failure is a cancellation.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        self.code == "cancelled"
    }

    /// The cancellation failure.
    #[must_use]
    pub fn cancelled() -> Self {
        Self::new("cancelled", "execution cancelled")
    }
}

impl From<ExpressionError> for NodeFailure {
    fn from(err: ExpressionError) -> Self {
        let code = match &err {
            ExpressionError::UnresolvedPath(_) => "unresolved_template",
            ExpressionError::InvalidCondition { .. }
            | ExpressionError::IncomparableOperands { .. } => "invalid_condition",
            _ => "invalid_template",
        };
        Self::new(code, err.to_string())
    }
}

impl From<BrowserError> for NodeFailure {
    fn from(err: BrowserError) -> Self {
        match &err {
            BrowserError::TabNotFound { .. } => Self::new("tab_not_found", err.to_string()),
            BrowserError::SelectorFailed { .. } => Self::new("selector_failed", err.to_string()),
            BrowserError::NavigationFailed { .. } => {
                Self::new("navigation_failed", err.to_string())
            }
            BrowserError::Timeout { .. } => Self::new("timeout", err.to_string()),
            BrowserError::Ai(ai) => Self::from(ai.clone()),
            BrowserError::Store(store) => Self::from(store.clone()),
            BrowserError::InvalidOperation { .. } | BrowserError::Driver { .. } => {
                Self::new("browser_failed", err.to_string())
            }
        }
    }
}

impl From<AiError> for NodeFailure {
    fn from(err: AiError) -> Self {
        let code = match &err {
            AiError::Timeout { .. } => "timeout",
            _ => "ai_failed",
        };
        Self::new(code, err.to_string())
    }
}

impl From<StoreError> for NodeFailure {
    fn from(err: StoreError) -> Self {
        Self::new("store_failed", err.to_string())
    }
}

impl From<WorkflowError> for NodeFailure {
    fn from(err: WorkflowError) -> Self {
        let code = match &err {
            WorkflowError::AliasNotFound { .. } => "alias_not_found",
            WorkflowError::DuplicateAlias { .. } => "duplicate_alias",
            WorkflowError::RangeInvalid { .. } => "range_invalid",
            WorkflowError::BadSelection { .. } => "bad_selection",
            _ => "invalid_reference",
        };
        Self::new(code, err.to_string())
    }
}

impl From<SchemaError> for NodeFailure {
    fn from(err: SchemaError) -> Self {
        match err {
            SchemaError::InvalidDeclaration { ref reason } => {
                Self::new("invalid_schema", reason.clone())
            }
            SchemaError::ValidationFailed {
                ref expected,
                ref received,
                ref issues,
                ref coercions_attempted,
            } => Self::new("ai_schema_violation", err.to_string()).with_details(
                serde_json::json!({
                    "expected": expected,
                    "received": received,
                    "issues": issues,
                    "coercions_attempted": coercions_attempted,
                }),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expression_errors_map_to_codes() {
        let failure = NodeFailure::from(ExpressionError::unresolved("x", "missing"));
        assert_eq!(failure.code, "unresolved_template");
    }

    #[test]
    fn browser_errors_map_to_codes() {
        let failure = NodeFailure::from(BrowserError::SelectorFailed {
            selector: "#x".into(),
            reason: "gone".into(),
        });
        assert_eq!(failure.code, "selector_failed");

        let failure = NodeFailure::from(BrowserError::Timeout {
            op: "click".into(),
            deadline: std::time::Duration::from_secs(30),
        });
        assert!(failure.is_timeout());
    }

    #[test]
    fn schema_violation_carries_details() {
        let schema = webpilot_schema::Schema::from_value(&serde_json::json!({"type": "number"}))
            .unwrap();
        let err = SchemaError::validation_failed(
            schema,
            serde_json::json!("x"),
            vec![webpilot_schema::Issue {
                path: "$".into(),
                message: "expected number, got string".into(),
            }],
            Vec::new(),
        );
        let failure = NodeFailure::from(err);
        assert_eq!(failure.code, "ai_schema_violation");
        assert!(failure.details.is_some());
    }
}
