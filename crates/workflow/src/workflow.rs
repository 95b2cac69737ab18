//! The workflow: an ordered node list with maintained invariants.

use serde::{Deserialize, Serialize};
use webpilot_core::{Alias, Position, WorkflowId};

use crate::error::WorkflowError;
use crate::index::AliasIndex;
use crate::node::{Node, NodeConfig, NodeRef};

/// An ordered sequence of nodes with contiguous 1-based positions and
/// unique aliases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// The workflow's identifier.
    pub id: WorkflowId,
    /// Nodes in position order.
    pub nodes: Vec<Node>,
}

impl Workflow {
    /// Create an empty workflow.
    #[must_use]
    pub fn new(id: WorkflowId) -> Self {
        Self {
            id,
            nodes: Vec::new(),
        }
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the workflow has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The node at a position.
    #[must_use]
    pub fn node_at(&self, position: Position) -> Option<&Node> {
        self.nodes.get(position.index())
    }

    /// The node with an alias.
    #[must_use]
    pub fn node_by_alias(&self, alias: &Alias) -> Option<&Node> {
        self.nodes.iter().find(|node| &node.alias == alias)
    }

    /// Build a fresh alias index. Fails on duplicate aliases.
    pub fn index(&self) -> Result<AliasIndex, WorkflowError> {
        AliasIndex::from_nodes(&self.nodes)
    }

    /// Check the structural invariants: contiguous positions starting at
    /// 1, and unique aliases.
    pub fn validate(&self) -> Result<(), WorkflowError> {
        for (i, node) in self.nodes.iter().enumerate() {
            let expected = i + 1;
            if node.position.get() as usize != expected {
                return Err(WorkflowError::InvalidNode {
                    alias: node.alias.clone(),
                    reason: format!(
                        "position {actual} at ordinal {expected}",
                        actual = node.position
                    ),
                });
            }
        }
        self.index().map(|_| ())
    }

    /// Renumber nodes so positions are contiguous from 1, in list order.
    pub(crate) fn renumber(&mut self) {
        for (i, node) in self.nodes.iter_mut().enumerate() {
            // i + 1 >= 1, so the unwrap cannot fire.
            node.position = Position::new(i as u32 + 1).expect("1-based position");
        }
    }

    /// Re-resolve every iterate body and route branch into position
    /// arrays against the current index, persisting both forms.
    ///
    /// Called after every structural edit so symbolic references and
    /// their resolved positions never drift apart.
    pub fn resolve_references(&mut self) -> Result<(), WorkflowError> {
        let index = self.index()?;
        for node in &mut self.nodes {
            match &mut node.config {
                NodeConfig::Iterate(config) => {
                    let positions = resolve_refs(config.body(), &index)?;
                    config.set_body_positions(positions);
                }
                NodeConfig::Route(config) => {
                    for branch in config.branches_mut() {
                        branch.branch_positions = Some(resolve_refs(&branch.branch, &index)?);
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Resolve symbolic node references into positions against an index.
///
/// Ranges expand inclusively by position; a range whose end precedes its
/// start is rejected, as is any unknown alias.
pub fn resolve_refs(
    refs: &[NodeRef],
    index: &AliasIndex,
) -> Result<Vec<Position>, WorkflowError> {
    let mut positions = Vec::with_capacity(refs.len());
    for node_ref in refs {
        match node_ref {
            NodeRef::Alias(alias) => positions.push(index.require_position(alias)?),
            NodeRef::Position(position) => {
                if index.alias_at(*position).is_none() {
                    return Err(WorkflowError::PositionOutOfRange {
                        position: *position,
                        len: index.len(),
                    });
                }
                positions.push(*position);
            }
            NodeRef::Range { start, end } => {
                let start_pos = index.require_position(start)?;
                let end_pos = index.require_position(end)?;
                if end_pos < start_pos {
                    return Err(WorkflowError::RangeInvalid {
                        start: start_pos,
                        end: end_pos,
                    });
                }
                let mut cursor = start_pos;
                loop {
                    positions.push(cursor);
                    if cursor == end_pos {
                        break;
                    }
                    cursor = cursor.next();
                }
            }
        }
    }
    Ok(positions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{ContextConfig, IterateConfig, NodeDraft, OnError};
    use pretty_assertions::assert_eq;

    fn draft(alias: &str) -> NodeDraft {
        NodeDraft {
            alias: Alias::new(alias).unwrap(),
            config: NodeConfig::Context(ContextConfig {
                variables: indexmap::IndexMap::new(),
            }),
            params: None,
        }
    }

    fn iterate_draft(alias: &str, body: Vec<NodeRef>) -> NodeDraft {
        NodeDraft {
            alias: Alias::new(alias).unwrap(),
            config: NodeConfig::Iterate(IterateConfig::Items {
                over: "{{items}}".into(),
                variable: "item".into(),
                body,
                body_positions: None,
                on_error: OnError::Abort,
            }),
            params: None,
        }
    }

    fn workflow(drafts: Vec<NodeDraft>) -> Workflow {
        let mut wf = Workflow::new(WorkflowId::nil());
        wf.nodes = drafts
            .into_iter()
            .enumerate()
            .map(|(i, d)| d.at(Position::new(i as u32 + 1).unwrap()))
            .collect();
        wf
    }

    #[test]
    fn validate_accepts_contiguous_positions() {
        let wf = workflow(vec![draft("a"), draft("b")]);
        assert!(wf.validate().is_ok());
    }

    #[test]
    fn validate_rejects_gap() {
        let mut wf = workflow(vec![draft("a"), draft("b")]);
        wf.nodes[1].position = Position::new(5).unwrap();
        assert!(wf.validate().is_err());
    }

    #[test]
    fn resolve_refs_expands_ranges() {
        let wf = workflow(vec![draft("a"), draft("b"), draft("c"), draft("d")]);
        let index = wf.index().unwrap();
        let refs = vec![NodeRef::Range {
            start: Alias::new("b").unwrap(),
            end: Alias::new("d").unwrap(),
        }];
        let positions = resolve_refs(&refs, &index).unwrap();
        assert_eq!(
            positions.iter().map(|p| p.get()).collect::<Vec<_>>(),
            vec![2, 3, 4]
        );
    }

    #[test]
    fn resolve_refs_single_element_range() {
        let wf = workflow(vec![draft("a"), draft("b")]);
        let index = wf.index().unwrap();
        let refs = vec![NodeRef::Range {
            start: Alias::new("b").unwrap(),
            end: Alias::new("b").unwrap(),
        }];
        let positions = resolve_refs(&refs, &index).unwrap();
        assert_eq!(positions, vec![Position::new(2).unwrap()]);
    }

    #[test]
    fn resolve_refs_rejects_backwards_range() {
        let wf = workflow(vec![draft("a"), draft("b")]);
        let index = wf.index().unwrap();
        let refs = vec![NodeRef::Range {
            start: Alias::new("b").unwrap(),
            end: Alias::new("a").unwrap(),
        }];
        assert!(matches!(
            resolve_refs(&refs, &index),
            Err(WorkflowError::RangeInvalid { .. })
        ));
    }

    #[test]
    fn resolve_refs_rejects_unknown_alias() {
        let wf = workflow(vec![draft("a")]);
        let index = wf.index().unwrap();
        let refs = vec![NodeRef::Alias(Alias::new("ghost").unwrap())];
        assert!(matches!(
            resolve_refs(&refs, &index),
            Err(WorkflowError::AliasNotFound { .. })
        ));
    }

    #[test]
    fn resolve_references_fills_body_positions() {
        let mut wf = workflow(vec![
            iterate_draft(
                "loop",
                vec![
                    NodeRef::Alias(Alias::new("a").unwrap()),
                    NodeRef::Alias(Alias::new("b").unwrap()),
                ],
            ),
            draft("a"),
            draft("b"),
        ]);
        wf.resolve_references().unwrap();
        let NodeConfig::Iterate(config) = &wf.nodes[0].config else {
            panic!("wrong config");
        };
        assert_eq!(
            config.body_positions().unwrap(),
            &[Position::new(2).unwrap(), Position::new(3).unwrap()]
        );
    }
}
