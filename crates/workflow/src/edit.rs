//! Structural edits.
//!
//! Edits are atomic: they are applied to a scratch copy of the workflow
//! and committed only if every invariant holds afterwards -- including
//! re-resolution of all iterate bodies and route branches, so an edit
//! that would leave a dangling reference is rejected with no side
//! effects.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use webpilot_core::{Alias, Position};

use crate::error::WorkflowError;
use crate::node::NodeDraft;
use crate::workflow::Workflow;

/// A reference to an existing node: by alias or by position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeLocator {
    /// By alias.
    Alias(Alias),
    /// By 1-based position.
    Position(Position),
}

impl NodeLocator {
    fn resolve(&self, workflow: &Workflow) -> Result<Position, WorkflowError> {
        match self {
            Self::Alias(alias) => workflow.index()?.require_position(alias),
            Self::Position(position) => {
                if position.index() < workflow.len() {
                    Ok(*position)
                } else {
                    Err(WorkflowError::PositionOutOfRange {
                        position: *position,
                        len: workflow.len(),
                    })
                }
            }
        }
    }
}

impl Serialize for NodeLocator {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Alias(alias) => serializer.serialize_str(alias.as_str()),
            Self::Position(position) => serializer.serialize_u32(position.get()),
        }
    }
}

impl<'de> Deserialize<'de> for NodeLocator {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        locator_from_value(&value).map_err(D::Error::custom)
    }
}

fn locator_from_value(value: &Value) -> Result<NodeLocator, String> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .and_then(Position::new)
            .map(NodeLocator::Position)
            .ok_or_else(|| format!("invalid position {n}")),
        Value::String(s) => s
            .parse::<Alias>()
            .map(NodeLocator::Alias)
            .map_err(|e| e.to_string()),
        other => Err(format!("node locator must be an alias or position, got {other}")),
    }
}

/// Where `add_or_replace_nodes` puts its nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditTarget {
    /// Append after the last node.
    End,
    /// Insert at a position, shifting later nodes.
    At(Position),
    /// Insert before a node.
    Before(NodeLocator),
    /// Insert after a node.
    After(NodeLocator),
    /// Replace a contiguous set of nodes.
    Replace(Vec<NodeLocator>),
}

impl Serialize for EditTarget {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        match self {
            Self::End => serializer.serialize_str("end"),
            Self::At(position) => serializer.serialize_u32(position.get()),
            Self::Before(locator) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("before", locator)?;
                map.end()
            }
            Self::After(locator) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("after", locator)?;
                map.end()
            }
            Self::Replace(locators) => {
                // A single alias replace round-trips through its shorthand.
                if let [NodeLocator::Alias(alias)] = locators.as_slice() {
                    return serializer.serialize_str(alias.as_str());
                }
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("replace", locators)?;
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for EditTarget {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        match &value {
            Value::String(s) if s == "end" => Ok(Self::End),
            Value::String(s) => {
                // A bare alias means "replace the node with that alias".
                let alias = s
                    .parse::<Alias>()
                    .map_err(|e| D::Error::custom(format!("invalid target alias: {e}")))?;
                Ok(Self::Replace(vec![NodeLocator::Alias(alias)]))
            }
            Value::Number(n) => n
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .and_then(Position::new)
                .map(Self::At)
                .ok_or_else(|| D::Error::custom(format!("invalid target position {n}"))),
            Value::Object(map) => {
                if map.len() != 1 {
                    return Err(D::Error::custom(
                        "target object must have exactly one of before/after/replace",
                    ));
                }
                let (key, inner) = map.iter().next().expect("len checked above");
                match key.as_str() {
                    "before" => locator_from_value(inner)
                        .map(Self::Before)
                        .map_err(D::Error::custom),
                    "after" => locator_from_value(inner)
                        .map(Self::After)
                        .map_err(D::Error::custom),
                    "replace" => {
                        let items = inner.as_array().ok_or_else(|| {
                            D::Error::custom("replace target must be an array")
                        })?;
                        let locators = items
                            .iter()
                            .map(locator_from_value)
                            .collect::<Result<Vec<_>, _>>()
                            .map_err(D::Error::custom)?;
                        if locators.is_empty() {
                            return Err(D::Error::custom("replace target must not be empty"));
                        }
                        Ok(Self::Replace(locators))
                    }
                    other => Err(D::Error::custom(format!("unknown target key {other:?}"))),
                }
            }
            other => Err(D::Error::custom(format!("invalid edit target {other}"))),
        }
    }
}

/// Insert or replace nodes at a target, maintaining all invariants.
///
/// Returns the positions the new nodes ended up at.
pub fn add_or_replace_nodes(
    workflow: &mut Workflow,
    target: &EditTarget,
    drafts: Vec<NodeDraft>,
) -> Result<Vec<Position>, WorkflowError> {
    // Drafts must not collide among themselves.
    for (i, draft) in drafts.iter().enumerate() {
        if drafts[..i].iter().any(|d| d.alias == draft.alias) {
            return Err(WorkflowError::DuplicateAlias {
                alias: draft.alias.clone(),
            });
        }
    }

    let mut scratch = workflow.clone();
    let (splice_at, remove_count) = splice_range(&scratch, target)?;

    // New aliases must not collide with surviving nodes.
    let removed: Vec<Alias> = scratch.nodes[splice_at..splice_at + remove_count]
        .iter()
        .map(|node| node.alias.clone())
        .collect();
    for draft in &drafts {
        let collides = scratch
            .nodes
            .iter()
            .any(|node| node.alias == draft.alias && !removed.contains(&node.alias));
        if collides {
            return Err(WorkflowError::DuplicateAlias {
                alias: draft.alias.clone(),
            });
        }
    }

    let inserted = drafts.len();
    let placed: Vec<crate::node::Node> = drafts
        .into_iter()
        .map(|draft| draft.at(Position::FIRST)) // renumbered below
        .collect();
    scratch
        .nodes
        .splice(splice_at..splice_at + remove_count, placed);
    scratch.renumber();
    scratch.resolve_references()?;
    scratch.validate()?;

    *workflow = scratch;
    Ok(workflow.nodes[splice_at..splice_at + inserted]
        .iter()
        .map(|node| node.position)
        .collect())
}

/// Delete the referenced nodes, maintaining all invariants.
pub fn delete_nodes(
    workflow: &mut Workflow,
    locators: &[NodeLocator],
) -> Result<(), WorkflowError> {
    let mut scratch = workflow.clone();

    let mut indices: Vec<usize> = locators
        .iter()
        .map(|locator| locator.resolve(&scratch).map(Position::index))
        .collect::<Result<_, _>>()?;
    indices.sort_unstable();
    indices.dedup();

    for index in indices.into_iter().rev() {
        scratch.nodes.remove(index);
    }
    scratch.renumber();
    scratch.resolve_references()?;
    scratch.validate()?;

    *workflow = scratch;
    Ok(())
}

/// Resolve an edit target into a `(start index, removed count)` splice.
fn splice_range(
    workflow: &Workflow,
    target: &EditTarget,
) -> Result<(usize, usize), WorkflowError> {
    match target {
        EditTarget::End => Ok((workflow.len(), 0)),
        EditTarget::At(position) => {
            let index = position.index();
            if index > workflow.len() {
                return Err(WorkflowError::PositionOutOfRange {
                    position: *position,
                    len: workflow.len(),
                });
            }
            Ok((index, 0))
        }
        EditTarget::Before(locator) => Ok((locator.resolve(workflow)?.index(), 0)),
        EditTarget::After(locator) => Ok((locator.resolve(workflow)?.index() + 1, 0)),
        EditTarget::Replace(locators) => {
            let mut indices: Vec<usize> = locators
                .iter()
                .map(|locator| locator.resolve(workflow).map(Position::index))
                .collect::<Result<_, _>>()?;
            indices.sort_unstable();
            indices.dedup();
            let first = indices[0];
            let contiguous = indices
                .iter()
                .enumerate()
                .all(|(offset, index)| *index == first + offset);
            if !contiguous {
                return Err(WorkflowError::NonContiguousReplace {
                    positions: indices.iter().map(|i| *i as u32 + 1).collect(),
                });
            }
            Ok((first, indices.len()))
        }
    }
}
