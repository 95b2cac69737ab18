//! The wire error shape.
//!
//! Every command failure surfaces as `{ code, message, details? }`. The
//! codes are stable: structural errors (`duplicate_alias`,
//! `alias_not_found`, `range_invalid`), execution errors
//! (`selector_failed`, `navigation_failed`, `ai_schema_violation`,
//! `busy`, `cancelled`, `timeout`), and request errors (`bad_request`,
//! `workflow_not_found`, `record_not_found`).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use webpilot_browser::BrowserError;
use webpilot_engine::{EngineError, NodeFailure};
use webpilot_schema::SchemaError;
use webpilot_store::StoreError;
use webpilot_workflow::WorkflowError;

/// A command failure as serialized on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    /// Machine-readable code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Structured context, when available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ApiError {
    /// Build an error from a code and message.
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

    /// A malformed request.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("bad_request", message)
    }

    /// The workflow does not exist.
    #[must_use]
    pub fn workflow_not_found(id: &str) -> Self {
        Self::new("workflow_not_found", format!("no workflow {id:?}"))
    }
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        let code = match &err {
            WorkflowError::DuplicateAlias { .. } => "duplicate_alias",
            WorkflowError::AliasNotFound { .. } => "alias_not_found",
            WorkflowError::RangeInvalid { .. } => "range_invalid",
            WorkflowError::PositionOutOfRange { .. } => "invalid_alias",
            WorkflowError::BadSelection { .. } => "bad_selection",
            WorkflowError::BadTarget { .. } | WorkflowError::NonContiguousReplace { .. } => {
                "bad_request"
            }
            WorkflowError::InvalidNode { .. } => "invalid_alias",
        };
        Self::new(code, err.to_string())
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Busy => Self::new("busy", err.to_string()),
            EngineError::Workflow(inner) => inner.into(),
            EngineError::Store(inner) => inner.into(),
            EngineError::Browser(inner) => inner.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let code = match &err {
            StoreError::RecordNotFound { .. } => "record_not_found",
            StoreError::DuplicateRecord { .. } => "duplicate_record",
            StoreError::Backend { .. } => "store_failed",
        };
        Self::new(code, err.to_string())
    }
}

impl From<BrowserError> for ApiError {
    fn from(err: BrowserError) -> Self {
        let failure = NodeFailure::from(err);
        Self {
            code: failure.code,
            message: failure.message,
            details: failure.details,
        }
    }
}

impl From<NodeFailure> for ApiError {
    fn from(failure: NodeFailure) -> Self {
        Self {
            code: failure.code,
            message: failure.message,
            details: failure.details,
        }
    }
}

impl From<SchemaError> for ApiError {
    fn from(err: SchemaError) -> Self {
        match &err {
            SchemaError::InvalidDeclaration { .. } => Self::new("bad_request", err.to_string()),
            SchemaError::ValidationFailed {
                coercions_attempted,
                ..
            } => {
                let code = if coercions_attempted.is_empty() {
                    "validation_failed"
                } else {
                    "coercion_failed"
                };
                let failure = NodeFailure::from(err.clone());
                Self::new(code, failure.message).with_details(
                    failure.details.unwrap_or(Value::Null),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use webpilot_core::Alias;

    #[test]
    fn workflow_errors_map_to_wire_codes() {
        let err = ApiError::from(WorkflowError::DuplicateAlias {
            alias: Alias::new("x").unwrap(),
        });
        assert_eq!(err.code, "duplicate_alias");

        let err = ApiError::from(WorkflowError::BadSelection {
            selection: "??".into(),
            reason: "nope".into(),
        });
        assert_eq!(err.code, "bad_selection");
    }

    #[test]
    fn busy_maps_to_busy() {
        assert_eq!(ApiError::from(EngineError::Busy).code, "busy");
    }

    #[test]
    fn serializes_without_empty_details() {
        let err = ApiError::new("timeout", "too slow");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"code": "timeout", "message": "too slow"})
        );
    }
}
