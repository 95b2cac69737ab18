#![forbid(unsafe_code)]

//! # Webpilot Schema
//!
//! Validation and coercion of AI-produced values against a declared
//! JSON-Schema subset (`string`, `number`, `boolean`, `array`, `object`;
//! `enum`, `properties`, `required`, `items`).
//!
//! AI models return almost-right shapes often enough that a fixed set of
//! mechanical repairs is worth applying before rejecting: numeric-keyed
//! objects become arrays, `"42"` becomes `42`, `"TRUE"` becomes `true`,
//! mis-cased object keys are renamed to their canonical spelling, and
//! missing optional properties are filled with `null`. Anything beyond
//! that fails fast with a structured [`SchemaError`] carrying the
//! expected schema, the received value, the first few validation issues,
//! and the coercions that were attempted.

pub mod coerce;
pub mod declaration;
pub mod error;
pub mod validate;

pub use coerce::{Coercion, coerce};
pub use declaration::{Schema, SchemaType};
pub use error::SchemaError;
pub use validate::{Issue, validate};

use serde_json::Value;

/// Validate `value` against `schema`, coercing if plain validation fails.
///
/// Returns the accepted (possibly repaired) value together with the
/// coercions that were applied. Validation is always re-run after
/// coercion; a value that still fails produces [`SchemaError::ValidationFailed`].
pub fn validate_and_coerce(
    value: Value,
    schema: &Schema,
) -> Result<(Value, Vec<Coercion>), SchemaError> {
    let issues = validate(&value, schema);
    if issues.is_empty() {
        return Ok((value, Vec::new()));
    }

    let (coerced, applied) = coerce(&value, schema);
    let remaining = validate(&coerced, schema);
    if remaining.is_empty() {
        return Ok((coerced, applied));
    }

    Err(SchemaError::validation_failed(
        schema.clone(),
        value,
        remaining,
        applied,
    ))
}
