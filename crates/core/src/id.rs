//! Unique identifiers for Webpilot entities.
//!
//! Strongly-typed UUID identifiers built on
//! [`domain-key`](https://crates.io/crates/domain-key) `Uuid<D>` wrappers.
//! Each identifier type is parameterized by a unique domain marker, so a
//! `WorkflowId` can never be passed where an `ExecutionId` is expected.
//!
//! All ID types are `Copy` (16 bytes, stack-allocated) and support `v4()`,
//! `nil()`, `parse(&str)`, full serde (UUID string), `Display`, `FromStr`,
//! `Eq`, `Ord`, and `Hash`.

use domain_key::define_uuid;

// Re-export for downstream parse error handling
pub use domain_key::UuidParseError;

define_uuid!(pub WorkflowIdDomain => WorkflowId);
define_uuid!(pub ExecutionIdDomain => ExecutionId);
