//! Workflow model errors.
//!
//! Structural errors are rejected at edit time with no side effects; the
//! API layer maps them onto wire error codes (`duplicate_alias`,
//! `alias_not_found`, `range_invalid`, ...).

use webpilot_core::{Alias, Position};

/// Errors from workflow definition, editing, and selection parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowError {
    /// Two nodes would share an alias.
    #[error("duplicate alias: {alias}")]
    DuplicateAlias {
        /// The conflicting alias.
        alias: Alias,
    },

    /// A referenced alias does not exist in the workflow.
    #[error("alias not found: {alias}")]
    AliasNotFound {
        /// The missing alias.
        alias: Alias,
    },

    /// A referenced position is outside the workflow.
    #[error("position {position} out of range (workflow has {len} nodes)")]
    PositionOutOfRange {
        /// The out-of-range position.
        position: Position,
        /// Current workflow length.
        len: usize,
    },

    /// A range whose end precedes its start.
    #[error("invalid range: end {end} precedes start {start}")]
    RangeInvalid {
        /// Position of the range start.
        start: Position,
        /// Position of the range end.
        end: Position,
    },

    /// A selection string that could not be parsed.
    #[error("invalid selection {selection:?}: {reason}")]
    BadSelection {
        /// The selection as given.
        selection: String,
        /// What went wrong.
        reason: String,
    },

    /// An edit target that could not be interpreted.
    #[error("invalid edit target: {reason}")]
    BadTarget {
        /// What went wrong.
        reason: String,
    },

    /// `replace` was given a set of nodes that is not contiguous.
    #[error("replace targets must be contiguous positions, got {positions:?}")]
    NonContiguousReplace {
        /// The resolved positions, in order.
        positions: Vec<u32>,
    },

    /// A node definition that fails its type-specific checks.
    #[error("invalid node {alias}: {reason}")]
    InvalidNode {
        /// The offending node's alias.
        alias: Alias,
        /// What was wrong.
        reason: String,
    },
}
