//! The storage port trait.

use async_trait::async_trait;
use serde_json::Value;
use webpilot_core::WorkflowId;
use webpilot_workflow::{DescriptionVersion, Plan, PlanVersion};

use crate::error::StoreError;
use crate::record::{Record, RecordStatus};

/// A partial update to a record.
///
/// `merge_data` merges fields into `data` under the caller-specified
/// node alias; other namespaces are never touched. `clear_error` resets
/// `error_message` (used when a record recovers on retry).
#[derive(Debug, Clone, Default)]
pub struct RecordPatch {
    /// `(alias, fields)` to merge into `data[alias]`.
    pub merge_data: Option<(String, serde_json::Map<String, Value>)>,
    /// New lifecycle status.
    pub status: Option<RecordStatus>,
    /// New failure detail.
    pub error_message: Option<String>,
    /// Reset `error_message` to none.
    pub clear_error: bool,
}

impl RecordPatch {
    /// A patch that merges fields under an alias.
    #[must_use]
    pub fn merge(alias: impl Into<String>, fields: serde_json::Map<String, Value>) -> Self {
        Self {
            merge_data: Some((alias.into(), fields)),
            ..Self::default()
        }
    }

    /// A patch that only changes the status.
    #[must_use]
    pub fn status(status: RecordStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Add a status change to this patch.
    #[must_use]
    pub fn with_status(mut self, status: RecordStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Add an error message to this patch.
    #[must_use]
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}

/// Workflow-scoped persistence: globals, records, plan/description
/// versions, and the browser-state snapshot.
///
/// Implementations must make each operation atomic per key. Writes made
/// during an execution are visible to subsequent reads of the same
/// workflow immediately.
#[async_trait]
pub trait StoreBackend: Send + Sync {
    /// Read a global by key path.
    async fn get_global(
        &self,
        workflow: WorkflowId,
        key: &str,
    ) -> Result<Option<Value>, StoreError>;

    /// Upsert a global by key path.
    async fn set_global(
        &self,
        workflow: WorkflowId,
        key: &str,
        value: Value,
    ) -> Result<(), StoreError>;

    /// Delete a global. Deleting a variable never touches records.
    async fn delete_global(&self, workflow: WorkflowId, key: &str) -> Result<(), StoreError>;

    /// Clear every global. Records are untouched.
    async fn clear_globals(&self, workflow: WorkflowId) -> Result<(), StoreError>;

    /// All globals whose key path starts with `prefix` (all of them when
    /// `None`), keyed by their full key path.
    async fn scan_globals(
        &self,
        workflow: WorkflowId,
        prefix: Option<&str>,
    ) -> Result<serde_json::Map<String, Value>, StoreError>;

    /// Create a record. Fails if the id already exists.
    async fn create_record(&self, workflow: WorkflowId, record: Record) -> Result<(), StoreError>;

    /// Read a record by id.
    async fn get_record(
        &self,
        workflow: WorkflowId,
        record_id: &str,
    ) -> Result<Option<Record>, StoreError>;

    /// Apply a partial update to a record.
    async fn update_record(
        &self,
        workflow: WorkflowId,
        record_id: &str,
        patch: RecordPatch,
    ) -> Result<Record, StoreError>;

    /// Delete a record by id.
    async fn delete_record(
        &self,
        workflow: WorkflowId,
        record_id: &str,
    ) -> Result<(), StoreError>;

    /// Records whose id matches the pattern (`email_*`, exact id, or
    /// `*`), in creation order.
    async fn list_records(
        &self,
        workflow: WorkflowId,
        pattern: &str,
    ) -> Result<Vec<Record>, StoreError>;

    /// Delete every record of the workflow.
    async fn clear_records(&self, workflow: WorkflowId) -> Result<(), StoreError>;

    /// The latest description version, if any.
    async fn description(
        &self,
        workflow: WorkflowId,
    ) -> Result<Option<DescriptionVersion>, StoreError>;

    /// Append a description version; returns the created version.
    async fn append_description(
        &self,
        workflow: WorkflowId,
        text: String,
        reason: Option<String>,
    ) -> Result<DescriptionVersion, StoreError>;

    /// The latest plan version, if any.
    async fn plan(&self, workflow: WorkflowId) -> Result<Option<PlanVersion>, StoreError>;

    /// Append a plan version; returns the created version.
    async fn append_plan(
        &self,
        workflow: WorkflowId,
        plan: Plan,
        reason: Option<String>,
    ) -> Result<PlanVersion, StoreError>;

    /// The persisted browser-state snapshot, if any.
    async fn browser_state(&self, workflow: WorkflowId) -> Result<Option<Value>, StoreError>;

    /// Replace the persisted browser-state snapshot.
    async fn set_browser_state(
        &self,
        workflow: WorkflowId,
        state: Value,
    ) -> Result<(), StoreError>;
}
