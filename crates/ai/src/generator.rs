//! The text-generation port.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AiError;

/// One generation request.
///
/// `schema` is advisory for the provider (most honor a JSON-output
/// hint); authoritative validation happens in the engine against the
/// same declaration after the value comes back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// The instruction to follow.
    pub instruction: String,
    /// Additional structured inputs, already template-resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<Value>,
    /// Declared output schema, when the caller wants structured output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
}

impl GenerateRequest {
    /// A plain-text request.
    #[must_use]
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
            inputs: None,
            schema: None,
        }
    }

    /// Attach inputs.
    #[must_use]
    pub fn with_inputs(mut self, inputs: Value) -> Self {
        self.inputs = Some(inputs);
        self
    }

    /// Attach an output schema.
    #[must_use]
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }
}

/// Port trait for external text generation.
///
/// Implemented by the deployment against a concrete LLM provider and
/// injected into the engine; tests use scripted implementations.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a value for the request.
    ///
    /// With a schema the provider should return structured JSON; without
    /// one, a JSON string.
    async fn generate(&self, request: &GenerateRequest) -> Result<Value, AiError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn request_builder() {
        let request = GenerateRequest::new("Classify this email")
            .with_inputs(json!({"subject": "A"}))
            .with_schema(json!({"type": "string", "enum": ["investor", "other"]}));
        assert_eq!(request.instruction, "Classify this email");
        assert!(request.inputs.is_some());
        assert!(request.schema.is_some());
    }

    #[test]
    fn request_serde_skips_absent_fields() {
        let request = GenerateRequest::new("hi");
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json, json!({"instruction": "hi"}));
    }
}
