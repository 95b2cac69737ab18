//! Execution selection parsing.
//!
//! A selection picks the nodes to execute: `"all"`, or a comma-separated
//! list where each item is an alias, a position, an alias range
//! (`first..last`), or a position range (`2-5`). Duplicates are
//! coalesced and the result is ordered by position.

use webpilot_core::{Alias, Position};

use crate::error::WorkflowError;
use crate::index::AliasIndex;

/// Parse a selection string against an alias index.
pub fn parse_selection(
    selection: &str,
    index: &AliasIndex,
) -> Result<Vec<Position>, WorkflowError> {
    let trimmed = selection.trim();
    if trimmed.is_empty() {
        return Err(bad(selection, "empty selection"));
    }

    if trimmed == "all" {
        return Ok(index.positions().collect());
    }

    let mut positions = Vec::new();
    for item in trimmed.split(',') {
        let item = item.trim();
        if item.is_empty() {
            return Err(bad(selection, "empty item between commas"));
        }
        positions.extend(parse_item(selection, item, index)?);
    }

    positions.sort_unstable();
    positions.dedup();
    Ok(positions)
}

fn parse_item(
    selection: &str,
    item: &str,
    index: &AliasIndex,
) -> Result<Vec<Position>, WorkflowError> {
    // Alias range: `first..last`.
    if let Some((start, end)) = item.split_once("..") {
        let start = resolve_endpoint(selection, start.trim(), index)?;
        let end = resolve_endpoint(selection, end.trim(), index)?;
        return expand_range(start, end);
    }

    // Position range: `n-m` (both sides all digits; aliases may contain
    // dashes, so anything else falls through to single-item parsing).
    if let Some((low, high)) = item.split_once('-') {
        if !low.is_empty()
            && !high.is_empty()
            && low.bytes().all(|b| b.is_ascii_digit())
            && high.bytes().all(|b| b.is_ascii_digit())
        {
            let start = parse_position(selection, low, index)?;
            let end = parse_position(selection, high, index)?;
            return expand_range(start, end);
        }
    }

    Ok(vec![resolve_endpoint(selection, item, index)?])
}

/// A single alias or position.
fn resolve_endpoint(
    selection: &str,
    item: &str,
    index: &AliasIndex,
) -> Result<Position, WorkflowError> {
    if item.bytes().all(|b| b.is_ascii_digit()) {
        return parse_position(selection, item, index);
    }
    let alias = item
        .parse::<Alias>()
        .map_err(|e| bad(selection, format!("{item:?}: {e}")))?;
    index.require_position(&alias)
}

fn parse_position(
    selection: &str,
    digits: &str,
    index: &AliasIndex,
) -> Result<Position, WorkflowError> {
    let ordinal: u32 = digits
        .parse()
        .map_err(|_| bad(selection, format!("invalid position {digits:?}")))?;
    let position = Position::new(ordinal)
        .ok_or_else(|| bad(selection, "positions are 1-based"))?;
    if index.alias_at(position).is_none() {
        return Err(WorkflowError::PositionOutOfRange {
            position,
            len: index.len(),
        });
    }
    Ok(position)
}

fn expand_range(start: Position, end: Position) -> Result<Vec<Position>, WorkflowError> {
    if end < start {
        return Err(WorkflowError::RangeInvalid { start, end });
    }
    let mut positions = Vec::with_capacity((end.get() - start.get() + 1) as usize);
    let mut cursor = start;
    loop {
        positions.push(cursor);
        if cursor == end {
            break;
        }
        cursor = cursor.next();
    }
    Ok(positions)
}

fn bad(selection: &str, reason: impl Into<String>) -> WorkflowError {
    WorkflowError::BadSelection {
        selection: selection.to_owned(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{ContextConfig, Node, NodeConfig};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn index(aliases: &[&str]) -> AliasIndex {
        let nodes: Vec<Node> = aliases
            .iter()
            .enumerate()
            .map(|(i, alias)| Node {
                position: Position::new(i as u32 + 1).unwrap(),
                alias: Alias::new(*alias).unwrap(),
                config: NodeConfig::Context(ContextConfig {
                    variables: indexmap::IndexMap::new(),
                }),
                params: None,
            })
            .collect();
        AliasIndex::from_nodes(&nodes).unwrap()
    }

    fn ordinals(positions: &[Position]) -> Vec<u32> {
        positions.iter().map(|p| p.get()).collect()
    }

    #[test]
    fn all_selects_every_position_in_order() {
        let idx = index(&["a", "b", "c"]);
        assert_eq!(ordinals(&parse_selection("all", &idx).unwrap()), vec![1, 2, 3]);
    }

    #[rstest]
    #[case("a", vec![1])]
    #[case("2", vec![2])]
    #[case("a,c", vec![1, 3])]
    #[case("c, a", vec![1, 3])] // ordered by position, not input order
    #[case("a..c", vec![1, 2, 3])]
    #[case("1-2", vec![1, 2])]
    #[case("a,a,1", vec![1])] // duplicates coalesced
    #[case("b..b", vec![2])] // single-element range
    fn selection_forms(#[case] input: &str, #[case] expected: Vec<u32>) {
        let idx = index(&["a", "b", "c"]);
        assert_eq!(ordinals(&parse_selection(input, &idx).unwrap()), expected);
    }

    #[test]
    fn dashed_alias_is_not_a_position_range() {
        let idx = index(&["step-2", "b"]);
        assert_eq!(ordinals(&parse_selection("step-2", &idx).unwrap()), vec![1]);
    }

    #[test]
    fn backwards_range_rejected() {
        let idx = index(&["a", "b"]);
        assert!(matches!(
            parse_selection("b..a", &idx),
            Err(WorkflowError::RangeInvalid { .. })
        ));
    }

    #[test]
    fn unknown_alias_rejected() {
        let idx = index(&["a"]);
        assert!(matches!(
            parse_selection("ghost", &idx),
            Err(WorkflowError::AliasNotFound { .. })
        ));
    }

    #[test]
    fn out_of_range_position_rejected() {
        let idx = index(&["a"]);
        assert!(matches!(
            parse_selection("4", &idx),
            Err(WorkflowError::PositionOutOfRange { .. })
        ));
    }

    #[rstest]
    #[case("")]
    #[case("  ")]
    #[case("a,,b")]
    #[case("0")]
    fn malformed_selections_rejected(#[case] input: &str) {
        let idx = index(&["a", "b"]);
        assert!(parse_selection(input, &idx).is_err());
    }
}
