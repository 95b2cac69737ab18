#![forbid(unsafe_code)]

//! # Webpilot Engine
//!
//! The node execution engine: a state machine that executes one node at
//! a time against the shared browser session and store.
//!
//! For each node the executor resolves symbolic references, resolves
//! `{{ }}` templates in `params` and `config` (unresolved paths are
//! fatal), dispatches by node type, applies post-execution effects
//! (intentional store mapping, record creation, record attribution),
//! and reports a structured outcome. Execution is strictly sequential
//! with stop-on-error; cancellation is cooperative and checked at node
//! boundaries and around suspension points.

pub mod context;
pub mod control;
pub mod effects;
pub mod error;
pub mod executor;
pub mod report;

pub use context::ExecutionScope;
pub use error::{EngineError, NodeFailure};
pub use executor::Executor;
pub use report::{EffectsSummary, ExecutionReport, NodeReport, NodeStatus, RunStatus};
