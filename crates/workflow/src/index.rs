//! The alias index: a bijection between aliases and positions.

use std::collections::{BTreeMap, HashMap};

use webpilot_core::{Alias, Position};

use crate::error::WorkflowError;
use crate::node::Node;

/// Bijective alias ↔ position maps for one workflow.
///
/// Rebuilt from the node list after every structural edit; lookups during
/// execution go through this index so symbolic references always reflect
/// the current shape of the workflow.
#[derive(Debug, Clone, Default)]
pub struct AliasIndex {
    alias_to_position: HashMap<Alias, Position>,
    position_to_alias: BTreeMap<Position, Alias>,
}

impl AliasIndex {
    /// Build the index from an ordered node list.
    ///
    /// Fails on the first duplicate alias.
    pub fn from_nodes(nodes: &[Node]) -> Result<Self, WorkflowError> {
        let mut index = Self::default();
        for node in nodes {
            if index.alias_to_position.contains_key(&node.alias) {
                return Err(WorkflowError::DuplicateAlias {
                    alias: node.alias.clone(),
                });
            }
            index
                .alias_to_position
                .insert(node.alias.clone(), node.position);
            index
                .position_to_alias
                .insert(node.position, node.alias.clone());
        }
        Ok(index)
    }

    /// Position of an alias.
    #[must_use]
    pub fn position_of(&self, alias: &Alias) -> Option<Position> {
        self.alias_to_position.get(alias).copied()
    }

    /// Position of an alias, or a structured error.
    pub fn require_position(&self, alias: &Alias) -> Result<Position, WorkflowError> {
        self.position_of(alias)
            .ok_or_else(|| WorkflowError::AliasNotFound {
                alias: alias.clone(),
            })
    }

    /// Alias at a position.
    #[must_use]
    pub fn alias_at(&self, position: Position) -> Option<&Alias> {
        self.position_to_alias.get(&position)
    }

    /// Number of indexed nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.alias_to_position.len()
    }

    /// Whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.alias_to_position.is_empty()
    }

    /// All positions in ascending order.
    pub fn positions(&self) -> impl Iterator<Item = Position> + '_ {
        self.position_to_alias.keys().copied()
    }
}
