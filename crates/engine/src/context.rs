//! Execution scopes and context snapshots.
//!
//! Iteration bindings live in an [`ExecutionScope`] owned by the
//! executor; before resolving a node's inputs the executor snapshots the
//! store (globals + records) and the scope into a fresh
//! [`ResolveContext`], so every node sees the data as of its own start,
//! including writes made by earlier nodes and earlier iterations.

use std::collections::HashMap;

use serde_json::Value;
use webpilot_core::WorkflowId;
use webpilot_expression::ResolveContext;
use webpilot_store::{StoreBackend, StoreError};

/// The stack of iteration binding frames plus the current-record stack.
#[derive(Debug, Default)]
pub struct ExecutionScope {
    frames: Vec<HashMap<String, Value>>,
    current_records: Vec<String>,
}

impl ExecutionScope {
    /// An empty scope.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a binding frame (entering an iterate body or route branch).
    pub fn push_frame(&mut self) {
        self.frames.push(HashMap::new());
    }

    /// Pop the innermost frame, discarding its bindings.
    pub fn pop_frame(&mut self) {
        self.frames.pop();
    }

    /// Bind a name in the innermost frame.
    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        if self.frames.is_empty() {
            self.frames.push(HashMap::new());
        }
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name.into(), value);
        }
    }

    /// Enter a record's scope (record-mode iteration).
    pub fn enter_record(&mut self, record_id: impl Into<String>) {
        self.current_records.push(record_id.into());
    }

    /// Leave the innermost record scope.
    pub fn leave_record(&mut self) {
        self.current_records.pop();
    }

    /// The innermost current record id, if any.
    #[must_use]
    pub fn current_record(&self) -> Option<&str> {
        self.current_records.last().map(String::as_str)
    }
}

/// Snapshot the store and scope into a resolve context.
pub async fn snapshot_context(
    store: &dyn StoreBackend,
    workflow_id: WorkflowId,
    scope: &ExecutionScope,
) -> Result<ResolveContext, StoreError> {
    let mut ctx = ResolveContext::new();
    ctx.set_globals(store.scan_globals(workflow_id, None).await?);

    let records = store.list_records(workflow_id, "*").await?;
    for record in &records {
        ctx.set_record(record.record_id.clone(), record.merged_view());
    }
    if let Some(current_id) = scope.current_record() {
        if let Some(record) = records.iter().find(|r| r.record_id == current_id) {
            ctx.set_current_record(record.merged_view());
        }
    }

    for frame in &scope.frames {
        ctx.push_scope();
        for (name, value) in frame {
            ctx.bind(name.clone(), value.clone());
        }
    }
    Ok(ctx)
}
