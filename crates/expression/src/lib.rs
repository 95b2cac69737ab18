#![forbid(unsafe_code)]

//! # Webpilot Expression
//!
//! The `{{path}}` template resolver and the condition mini-language used
//! by route nodes.
//!
//! Templates are resolved against a layered [`ResolveContext`]:
//! iteration bindings shadow the current record (`current.*`), which
//! shadows record-id paths (`email_001.*`), which shadow node-namespaced
//! globals (`alias.field`), which shadow direct globals. A template that
//! is exactly one `{{expr}}` preserves the resolved value's type; mixed
//! templates concatenate into a string.
//!
//! Conditions are intentionally small -- `path OP value` with a handful
//! of comparison operators -- and complex logic is expected to be
//! computed upstream by cognition nodes.

pub mod condition;
pub mod context;
pub mod error;
pub mod path;
pub mod resolve;
pub mod template;

pub use condition::{Condition, evaluate_condition};
pub use context::ResolveContext;
pub use error::{ExpressionError, Unresolved};
pub use path::{Path, PathSegment};
pub use resolve::{resolve_lenient, resolve_string, resolve_value};
pub use template::Template;
