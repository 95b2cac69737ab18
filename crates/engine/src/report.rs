//! Execution reports.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use webpilot_core::{Alias, ExecutionId, Position};
use webpilot_workflow::NodeType;

use crate::error::NodeFailure;

/// Terminal status of a single node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// The node ran and succeeded.
    Success,
    /// The node ran and failed.
    Error,
    /// The node was never reached (stop-on-error, cancellation).
    Skipped,
    /// The node was interrupted by cancellation.
    Cancelled,
    /// The node exceeded a deadline.
    Timeout,
}

impl NodeStatus {
    /// Whether this status halts the remaining selection.
    #[must_use]
    pub fn halts_execution(self) -> bool {
        !matches!(self, Self::Success)
    }
}

/// What a node wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectsSummary {
    /// Global keys written (full key paths).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables_written: Vec<String>,
    /// Record ids created.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub records_created: Vec<String>,
    /// Record ids updated.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub records_updated: Vec<String>,
}

impl EffectsSummary {
    /// Whether nothing was written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.variables_written.is_empty()
            && self.records_created.is_empty()
            && self.records_updated.is_empty()
    }

    /// Fold another summary into this one.
    pub fn absorb(&mut self, other: Self) {
        self.variables_written.extend(other.variables_written);
        self.records_created.extend(other.records_created);
        self.records_updated.extend(other.records_updated);
    }
}

/// Report entry for one executed (or skipped) node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeReport {
    /// The node's position at execution time.
    pub position: Position,
    /// The node's alias.
    pub alias: Alias,
    /// The node's type.
    pub node_type: NodeType,
    /// Terminal status.
    pub status: NodeStatus,
    /// Wall-clock duration.
    pub duration_ms: u64,
    /// The node's result, if it produced one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure detail when status is not `success`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<NodeFailure>,
    /// What the node wrote.
    #[serde(default, skip_serializing_if = "EffectsSummary::is_empty")]
    pub effects: EffectsSummary,
}

impl NodeReport {
    /// A skipped-node entry.
    #[must_use]
    pub fn skipped(position: Position, alias: Alias, node_type: NodeType) -> Self {
        Self {
            position,
            alias,
            node_type,
            status: NodeStatus::Skipped,
            duration_ms: 0,
            result: None,
            error: None,
            effects: EffectsSummary::default(),
        }
    }
}

/// Terminal status of an execution run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every selected node succeeded.
    Completed,
    /// A node failed and the rest were skipped.
    Failed,
    /// The run was cancelled.
    Cancelled,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// The full report of one `execute_nodes` run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// The execution run's id.
    pub execution_id: ExecutionId,
    /// Terminal status.
    pub status: RunStatus,
    /// Wall-clock duration of the whole run.
    pub duration_ms: u64,
    /// Per-node entries, in execution order.
    pub nodes: Vec<NodeReport>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn only_success_continues_execution() {
        assert!(!NodeStatus::Success.halts_execution());
        for status in [
            NodeStatus::Error,
            NodeStatus::Skipped,
            NodeStatus::Cancelled,
            NodeStatus::Timeout,
        ] {
            assert!(status.halts_execution());
        }
    }

    #[test]
    fn effects_absorb_concatenates() {
        let mut a = EffectsSummary {
            variables_written: vec!["x.count".into()],
            ..EffectsSummary::default()
        };
        a.absorb(EffectsSummary {
            records_created: vec!["email_001".into()],
            ..EffectsSummary::default()
        });
        assert_eq!(a.variables_written, vec!["x.count"]);
        assert_eq!(a.records_created, vec!["email_001"]);
    }

    #[test]
    fn report_serde_roundtrip() {
        let report = NodeReport::skipped(
            Position::new(3).unwrap(),
            Alias::new("classify").unwrap(),
            NodeType::Cognition,
        );
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], serde_json::json!("skipped"));
        let back: NodeReport = serde_json::from_value(json).unwrap();
        assert_eq!(back, report);
    }
}
