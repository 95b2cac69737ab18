#![forbid(unsafe_code)]

//! # Webpilot Store
//!
//! The workflow-scoped persistence port. Two logical buckets back every
//! workflow: **globals** (direct variables and node-namespaced results,
//! keyed by their key path) and **records** (persistent per-entity
//! objects that accumulate data contributed by multiple nodes under
//! per-node sub-namespaces). The store also holds the plan and
//! description version chains and the current browser-state snapshot.
//!
//! [`StoreBackend`] is the injected port; [`MemoryStore`] is the
//! in-process backend used by tests and single-node deployments. A
//! store operation is atomic per key -- callers must not rely on
//! multi-key atomicity -- and any store failure is fatal to the node
//! that triggered it.

pub mod backend;
pub mod error;
pub mod memory;
pub mod record;

pub use backend::{RecordPatch, StoreBackend};
pub use error::StoreError;
pub use memory::MemoryStore;
pub use record::{Record, RecordStatus};
