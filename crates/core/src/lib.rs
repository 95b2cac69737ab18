#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Webpilot Core
//!
//! Identifier types shared by every Webpilot crate.
//!
//! - [`WorkflowId`] / [`ExecutionId`] -- strongly-typed UUID identifiers
//! - [`Alias`] -- validated symbolic node name, used for references and
//!   for namespacing stored data
//! - [`Position`] -- 1-based node ordinal within a workflow
//! - [`record_id`] -- record identifier pattern helpers

pub mod alias;
pub mod id;
pub mod position;
pub mod record_id;

pub use alias::{Alias, AliasError};
pub use id::{ExecutionId, WorkflowId};
pub use position::Position;
