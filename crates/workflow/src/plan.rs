//! Plan and description versions.
//!
//! The description is the authoritative contract for the workflow, kept
//! as opaque versioned text; the plan is ordered phases of ordered
//! tasks. Both are append-only version chains -- every update creates a
//! new version.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use webpilot_core::Alias;

/// Status of a plan task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not yet started.
    Pending,
    /// Currently being worked.
    InProgress,
    /// Finished successfully.
    Completed,
    /// Attempted and failed.
    Failed,
}

/// One task within a phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// What the task is.
    pub description: String,
    /// Current status.
    pub status: TaskStatus,
    /// Nodes implementing this task, if known.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<Alias>,
}

/// One ordered phase of the plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    /// Phase title.
    pub title: String,
    /// Ordered tasks.
    pub tasks: Vec<Task>,
}

/// The plan: ordered phases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// Ordered phases.
    pub phases: Vec<Phase>,
}

/// One version of the plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanVersion {
    /// Monotonically increasing version number, starting at 1.
    pub version: u32,
    /// The plan at this version.
    pub plan: Plan,
    /// Why this version was created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// When this version was created.
    pub updated_at: DateTime<Utc>,
}

/// One version of the workflow description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptionVersion {
    /// Monotonically increasing version number, starting at 1.
    pub version: u32,
    /// The description text (opaque to the engine).
    pub text: String,
    /// Why this version was created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// When this version was created.
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn plan_serde_roundtrip() {
        let plan = Plan {
            phases: vec![Phase {
                title: "Setup".into(),
                tasks: vec![Task {
                    description: "Log in".into(),
                    status: TaskStatus::Completed,
                    nodes: vec![Alias::new("login").unwrap()],
                }],
            }],
        };
        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json["phases"][0]["tasks"][0]["status"], json!("completed"));
        let back: Plan = serde_json::from_value(json).unwrap();
        assert_eq!(back, plan);
    }

    #[test]
    fn task_nodes_default_to_empty() {
        let task: Task =
            serde_json::from_value(json!({"description": "x", "status": "pending"})).unwrap();
        assert!(task.nodes.is_empty());
    }
}
