#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Webpilot Workflow
//!
//! The workflow program model: nodes as a tagged union over `type`, the
//! alias ↔ position bijection, structural edits with atomic reference
//! re-resolution, execution selections, and plan/description versions.
//!
//! This crate is pure data and invariants -- it does not execute
//! anything. The engine crate interprets these definitions.

pub mod edit;
pub mod error;
pub mod index;
pub mod node;
pub mod plan;
pub mod selection;
pub mod workflow;

pub use edit::{EditTarget, NodeLocator, add_or_replace_nodes, delete_nodes};
pub use error::WorkflowError;
pub use index::AliasIndex;
pub use node::{
    AiActConfig, AiExtractConfig, BrowserActionConfig, BrowserOp, BrowserQueryConfig,
    CognitionConfig, ContextConfig, CreateRecordsSpec, EffectsSpec, IterateConfig, Node,
    NodeConfig, NodeDraft, NodeRef, NodeType, OnError, QueryKind, RouteBranch, RouteConfig,
    StoreSpec, ValidationConfig, ValidationRule,
};
pub use plan::{DescriptionVersion, Phase, Plan, PlanVersion, Task, TaskStatus};
pub use selection::parse_selection;
pub use workflow::{Workflow, resolve_refs};
