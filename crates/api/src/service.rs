//! The transport-agnostic command service.
//!
//! One [`WorkflowService`] serves many workflows; each workflow gets
//! its own browser session and executor on first use. Every command
//! here maps one-to-one onto a wire endpoint, and all request/response
//! bodies are plain serde types so the service works over HTTP+JSON,
//! JSON-RPC, or in-process calls alike.

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};
use webpilot_ai::TextGenerator;
use webpilot_expression::{ResolveContext, resolve_lenient};
use webpilot_browser::{BrowserDriver, BrowserSession};
use webpilot_core::{Position, WorkflowId};
use webpilot_engine::{ExecutionReport, Executor};
use webpilot_schema::Schema;
use webpilot_store::{RecordPatch, RecordStatus, StoreBackend};
use webpilot_telemetry::{EventBus, EventSubscriber, MetricsRegistry, WorkflowEvent};
use webpilot_workflow::{
    EditTarget, Node, NodeDraft, NodeLocator, Plan, Workflow, add_or_replace_nodes, delete_nodes,
    parse_selection,
};

use crate::error::ApiError;
use crate::render;

/// Creates one browser driver per workflow session.
pub type DriverFactory = Arc<dyn Fn() -> Arc<dyn BrowserDriver> + Send + Sync>;

struct WorkflowEntry {
    workflow: tokio::sync::RwLock<Workflow>,
    executor: Executor,
}

/// The command service.
pub struct WorkflowService {
    store: Arc<dyn StoreBackend>,
    events: Arc<EventBus>,
    metrics: Arc<MetricsRegistry>,
    driver_factory: DriverFactory,
    generator: Arc<dyn TextGenerator>,
    workflows: DashMap<WorkflowId, Arc<WorkflowEntry>>,
    create_lock: tokio::sync::Mutex<()>,
}

impl WorkflowService {
    /// Create a service over injected collaborators.
    pub fn new(
        store: Arc<dyn StoreBackend>,
        driver_factory: DriverFactory,
        generator: Arc<dyn TextGenerator>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            store,
            events,
            metrics: Arc::new(MetricsRegistry::new()),
            driver_factory,
            generator,
            workflows: DashMap::new(),
            create_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Subscribe to the observability event stream.
    #[must_use]
    pub fn subscribe(&self) -> EventSubscriber {
        self.events.subscribe()
    }

    /// The metrics registry.
    #[must_use]
    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    async fn entry(&self, workflow_id: WorkflowId) -> Result<Arc<WorkflowEntry>, ApiError> {
        if let Some(entry) = self.workflows.get(&workflow_id) {
            return Ok(entry.clone());
        }

        let _guard = self.create_lock.lock().await;
        if let Some(entry) = self.workflows.get(&workflow_id) {
            return Ok(entry.clone());
        }

        let session = BrowserSession::open(
            (self.driver_factory)(),
            self.store.clone(),
            self.events.clone(),
            workflow_id,
        )
        .await?;
        let executor = Executor::new(
            workflow_id,
            self.store.clone(),
            Arc::new(session),
            self.generator.clone(),
            self.events.clone(),
            self.metrics.clone(),
        );
        let entry = Arc::new(WorkflowEntry {
            workflow: tokio::sync::RwLock::new(Workflow::new(workflow_id)),
            executor,
        });
        self.workflows.insert(workflow_id, entry.clone());
        Ok(entry)
    }

    /// Insert or replace nodes at a target.
    pub async fn add_or_replace_nodes(
        &self,
        workflow_id: WorkflowId,
        request: AddOrReplaceRequest,
    ) -> Result<AddOrReplaceResponse, ApiError> {
        let entry = self.entry(workflow_id).await?;
        let mut workflow = entry.workflow.write().await;
        let positions = add_or_replace_nodes(&mut workflow, &request.target, request.nodes)?;
        info!(workflow = %workflow_id, placed = positions.len(), "nodes edited");
        Ok(AddOrReplaceResponse { positions })
    }

    /// Delete nodes by alias or position.
    pub async fn delete_nodes(
        &self,
        workflow_id: WorkflowId,
        request: DeleteNodesRequest,
    ) -> Result<(), ApiError> {
        let entry = self.entry(workflow_id).await?;
        let mut workflow = entry.workflow.write().await;
        delete_nodes(&mut workflow, &request.node_ids)?;
        info!(workflow = %workflow_id, deleted = request.node_ids.len(), "nodes deleted");
        Ok(())
    }

    /// Read back node definitions, optionally filtered by a selection.
    pub async fn get_workflow_nodes(
        &self,
        workflow_id: WorkflowId,
        request: GetNodesRequest,
    ) -> Result<GetNodesResponse, ApiError> {
        let entry = self.entry(workflow_id).await?;
        let workflow = entry.workflow.read().await;
        let nodes = match &request.selection {
            None => workflow.nodes.clone(),
            Some(selection) => {
                let index = workflow.index()?;
                parse_selection(selection, &index)?
                    .into_iter()
                    .filter_map(|position| workflow.node_at(position).cloned())
                    .collect()
            }
        };
        Ok(GetNodesResponse { nodes })
    }

    /// Execute a selection of nodes.
    pub async fn execute_nodes(
        &self,
        workflow_id: WorkflowId,
        request: ExecuteRequest,
    ) -> Result<ExecutionReport, ApiError> {
        let entry = self.entry(workflow_id).await?;
        let workflow = entry.workflow.read().await;
        let report = entry
            .executor
            .execute(&workflow, &request.selection, request.reset_browser_first)
            .await?;
        Ok(report)
    }

    /// Cancel the in-flight execution, if any.
    pub async fn cancel_execution(
        &self,
        workflow_id: WorkflowId,
    ) -> Result<CancelResponse, ApiError> {
        let entry = self.entry(workflow_id).await?;
        Ok(CancelResponse {
            cancelled: entry.executor.cancel(),
        })
    }

    /// The report of the most recently finished execution.
    pub async fn get_execution_report(
        &self,
        workflow_id: WorkflowId,
    ) -> Result<Option<ExecutionReport>, ApiError> {
        let entry = self.entry(workflow_id).await?;
        Ok(entry.executor.last_report())
    }

    /// A compact, LLM-oriented slice of the store plus the raw data.
    pub async fn get_workflow_data(
        &self,
        workflow_id: WorkflowId,
        request: WorkflowDataRequest,
    ) -> Result<WorkflowDataResponse, ApiError> {
        let pattern = request.pattern.as_deref();
        match request.bucket.as_deref() {
            None | Some("global") => {
                let globals = self.store.scan_globals(workflow_id, pattern).await?;
                Ok(WorkflowDataResponse {
                    rendered: render::render_globals(&globals),
                    raw: Value::Object(globals),
                })
            }
            Some("records") => {
                let records = self
                    .store
                    .list_records(workflow_id, pattern.unwrap_or("*"))
                    .await?;
                Ok(WorkflowDataResponse {
                    rendered: render::render_records(&records),
                    raw: serde_json::to_value(&records)
                        .map_err(|e| ApiError::new("store_failed", e.to_string()))?,
                })
            }
            Some("all") => {
                let globals = self.store.scan_globals(workflow_id, None).await?;
                let records = self
                    .store
                    .list_records(workflow_id, pattern.unwrap_or("*"))
                    .await?;
                let rendered = format!(
                    "## Variables\n{}\n## Records\n{}",
                    render::render_globals(&globals),
                    render::render_records(&records)
                );
                Ok(WorkflowDataResponse {
                    rendered,
                    raw: serde_json::json!({
                        "global": globals,
                        "records": records,
                    }),
                })
            }
            Some(record_id) => {
                let record = self
                    .store
                    .get_record(workflow_id, record_id)
                    .await?
                    .ok_or_else(|| {
                        ApiError::new("record_not_found", format!("no record {record_id:?}"))
                    })?;
                Ok(WorkflowDataResponse {
                    rendered: render::render_record(&record),
                    raw: serde_json::to_value(&record)
                        .map_err(|e| ApiError::new("store_failed", e.to_string()))?,
                })
            }
        }
    }

    /// Set a direct global variable, optionally schema-checked.
    pub async fn set_variable(
        &self,
        workflow_id: WorkflowId,
        request: SetVariableRequest,
    ) -> Result<(), ApiError> {
        let value = match &request.schema {
            Some(decl) => {
                let schema = Schema::from_value(decl)?;
                webpilot_schema::validate_and_coerce(request.value.clone(), &schema)?.0
            }
            None => request.value,
        };
        info!(workflow = %workflow_id, name = %request.name, reason = %request.reason, "set variable");
        self.store
            .set_global(workflow_id, &request.name, value)
            .await?;
        Ok(())
    }

    /// Delete a direct global variable. Records are untouched.
    pub async fn clear_variable(
        &self,
        workflow_id: WorkflowId,
        request: ClearVariableRequest,
    ) -> Result<(), ApiError> {
        info!(workflow = %workflow_id, name = %request.name, reason = %request.reason, "clear variable");
        self.store.delete_global(workflow_id, &request.name).await?;
        Ok(())
    }

    /// Clear every global variable. Records are untouched.
    pub async fn clear_all_variables(
        &self,
        workflow_id: WorkflowId,
        request: ClearAllVariablesRequest,
    ) -> Result<(), ApiError> {
        info!(workflow = %workflow_id, reason = %request.reason, "clear all variables");
        self.store.clear_globals(workflow_id).await?;
        Ok(())
    }

    /// Reset workflow data: globals, and records when asked.
    pub async fn reset_workflow_data(
        &self,
        workflow_id: WorkflowId,
        request: ResetWorkflowDataRequest,
    ) -> Result<(), ApiError> {
        info!(
            workflow = %workflow_id,
            include_records = request.include_records,
            reason = %request.reason,
            "reset workflow data"
        );
        self.store.clear_globals(workflow_id).await?;
        if request.include_records {
            self.store.clear_records(workflow_id).await?;
        }
        Ok(())
    }

    /// Delete one record.
    pub async fn delete_record(
        &self,
        workflow_id: WorkflowId,
        request: DeleteRecordRequest,
    ) -> Result<(), ApiError> {
        info!(workflow = %workflow_id, record = %request.record_id, reason = %request.reason, "delete record");
        self.store
            .delete_record(workflow_id, &request.record_id)
            .await?;
        Ok(())
    }

    /// Patch a record's lifecycle status.
    pub async fn update_record_status(
        &self,
        workflow_id: WorkflowId,
        request: UpdateRecordStatusRequest,
    ) -> Result<(), ApiError> {
        let mut patch = RecordPatch::status(request.status);
        match request.error_message {
            Some(message) => patch.error_message = Some(message),
            None => patch.clear_error = true,
        }
        self.store
            .update_record(workflow_id, &request.record_id, patch)
            .await?;
        Ok(())
    }

    /// Append a plan version and announce it.
    ///
    /// `{{ }}` references inside plan text resolve against the current
    /// store where they can; unresolved ones stay as written (they are
    /// non-fatal here, unlike in node inputs).
    pub async fn update_plan(
        &self,
        workflow_id: WorkflowId,
        request: UpdatePlanRequest,
    ) -> Result<VersionResponse, ApiError> {
        let plan = self.resolve_plan_text(workflow_id, request.plan).await?;
        let version = self
            .store
            .append_plan(workflow_id, plan, request.reason)
            .await?;
        self.events.emit(WorkflowEvent::PlanUpdated {
            workflow_id: workflow_id.to_string(),
            version: version.version,
        });
        Ok(VersionResponse {
            version: version.version,
        })
    }

    async fn resolve_plan_text(
        &self,
        workflow_id: WorkflowId,
        plan: Plan,
    ) -> Result<Plan, ApiError> {
        let mut ctx = ResolveContext::new();
        ctx.set_globals(self.store.scan_globals(workflow_id, None).await?);
        for record in self.store.list_records(workflow_id, "*").await? {
            ctx.set_record(record.record_id.clone(), record.merged_view());
        }

        let raw = serde_json::to_value(&plan)
            .map_err(|err| ApiError::new("bad_request", err.to_string()))?;
        let (resolved, diagnostics) = resolve_lenient(&raw, &ctx);
        if !diagnostics.is_empty() {
            debug!(
                workflow = %workflow_id,
                unresolved = diagnostics.len(),
                "plan text kept unresolved references"
            );
        }
        serde_json::from_value(resolved)
            .map_err(|err| ApiError::new("bad_request", err.to_string()))
    }

    /// Append a description version.
    pub async fn update_workflow_description(
        &self,
        workflow_id: WorkflowId,
        request: UpdateDescriptionRequest,
    ) -> Result<VersionResponse, ApiError> {
        let version = self
            .store
            .append_description(workflow_id, request.text, request.reason)
            .await?;
        Ok(VersionResponse {
            version: version.version,
        })
    }

    /// Execute a one-off browser operation without creating a node.
    pub async fn debug_action(
        &self,
        workflow_id: WorkflowId,
        request: DebugActionRequest,
    ) -> Result<DebugActionResponse, ApiError> {
        info!(workflow = %workflow_id, reason = %request.reason, "debug action");
        let entry = self.entry(workflow_id).await?;
        let result = entry.executor.debug_action(&request.config).await?;
        let browser_state = self.store.browser_state(workflow_id).await?;
        Ok(DebugActionResponse {
            result,
            browser_state: browser_state.unwrap_or(Value::Null),
        })
    }

    /// The current browser-state snapshot.
    pub async fn get_browser_state(&self, workflow_id: WorkflowId) -> Result<Value, ApiError> {
        Ok(self
            .store
            .browser_state(workflow_id)
            .await?
            .unwrap_or(Value::Null))
    }

    /// Compact accessibility-tree snapshot of a tab.
    pub async fn inspect_tab(
        &self,
        workflow_id: WorkflowId,
        request: InspectTabRequest,
    ) -> Result<Value, ApiError> {
        let entry = self.entry(workflow_id).await?;
        Ok(entry
            .executor
            .session()
            .inspect_tab(request.tab.as_deref())
            .await?)
    }

    /// Full attribute set and ranked selectors for a snapshot element.
    pub async fn expand_dom_selector(
        &self,
        workflow_id: WorkflowId,
        request: ExpandSelectorRequest,
    ) -> Result<Value, ApiError> {
        let entry = self.entry(workflow_id).await?;
        Ok(entry
            .executor
            .session()
            .expand_element(&request.element_id, request.tab.as_deref())
            .await?)
    }
}

// ── Request / response bodies ──────────────────────────────────────────

/// `add_or_replace_nodes` request.
#[derive(Debug, Deserialize)]
pub struct AddOrReplaceRequest {
    /// Where the nodes go.
    pub target: EditTarget,
    /// The node definitions.
    pub nodes: Vec<NodeDraft>,
}

/// `add_or_replace_nodes` response.
#[derive(Debug, Serialize)]
pub struct AddOrReplaceResponse {
    /// Positions the new nodes landed at.
    pub positions: Vec<Position>,
}

/// `delete_nodes` request.
#[derive(Debug, Deserialize)]
pub struct DeleteNodesRequest {
    /// Nodes to delete, by alias or position.
    pub node_ids: Vec<NodeLocator>,
}

/// `get_workflow_nodes` request.
#[derive(Debug, Default, Deserialize)]
pub struct GetNodesRequest {
    /// Optional selection filter.
    #[serde(default)]
    pub selection: Option<String>,
}

/// `get_workflow_nodes` response.
#[derive(Debug, Serialize)]
pub struct GetNodesResponse {
    /// The node definitions, in position order.
    pub nodes: Vec<Node>,
}

/// `execute_nodes` request.
#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    /// What to run.
    pub selection: String,
    /// Reset the browser session before running.
    #[serde(default)]
    pub reset_browser_first: bool,
}

/// `cancel_execution` response.
#[derive(Debug, Serialize)]
pub struct CancelResponse {
    /// Whether an in-flight execution was cancelled.
    pub cancelled: bool,
}

/// `get_workflow_data` request.
#[derive(Debug, Default, Deserialize)]
pub struct WorkflowDataRequest {
    /// `"global"` (default), `"records"`, `"all"`, or a record id.
    #[serde(default)]
    pub bucket: Option<String>,
    /// Key-prefix filter for globals, id pattern for records.
    #[serde(default)]
    pub pattern: Option<String>,
}

/// `get_workflow_data` response.
#[derive(Debug, Serialize)]
pub struct WorkflowDataResponse {
    /// Compact, truncated rendering for an LLM context.
    pub rendered: String,
    /// The raw structured slice.
    pub raw: Value,
}

/// `set_variable` request.
#[derive(Debug, Deserialize)]
pub struct SetVariableRequest {
    /// The variable name (direct global key).
    pub name: String,
    /// The value to store.
    pub value: Value,
    /// Why (logged, not stored).
    pub reason: String,
    /// Optional schema the value must satisfy.
    #[serde(default)]
    pub schema: Option<Value>,
}

/// `clear_variable` request.
#[derive(Debug, Deserialize)]
pub struct ClearVariableRequest {
    /// The variable name.
    pub name: String,
    /// Why (logged, not stored).
    pub reason: String,
}

/// `clear_all_variables` request.
#[derive(Debug, Deserialize)]
pub struct ClearAllVariablesRequest {
    /// Why (logged, not stored).
    pub reason: String,
}

/// `reset_workflow_data` request.
#[derive(Debug, Deserialize)]
pub struct ResetWorkflowDataRequest {
    /// Also delete every record.
    #[serde(default)]
    pub include_records: bool,
    /// Why (logged, not stored).
    pub reason: String,
}

/// `delete_record` request.
#[derive(Debug, Deserialize)]
pub struct DeleteRecordRequest {
    /// The record to delete.
    pub record_id: String,
    /// Why (logged, not stored).
    pub reason: String,
}

/// `update_record_status` request.
#[derive(Debug, Deserialize)]
pub struct UpdateRecordStatusRequest {
    /// The record to patch.
    pub record_id: String,
    /// The new status.
    pub status: RecordStatus,
    /// Failure detail for `failed`; clears the previous one otherwise.
    #[serde(default)]
    pub error_message: Option<String>,
}

/// `update_plan` request.
#[derive(Debug, Deserialize)]
pub struct UpdatePlanRequest {
    /// The new plan.
    pub plan: Plan,
    /// Why (stored with the version).
    #[serde(default)]
    pub reason: Option<String>,
}

/// `update_workflow_description` request.
#[derive(Debug, Deserialize)]
pub struct UpdateDescriptionRequest {
    /// The new description text.
    pub text: String,
    /// Why (stored with the version).
    #[serde(default)]
    pub reason: Option<String>,
}

/// Version-bearing response for plan/description updates.
#[derive(Debug, Serialize)]
pub struct VersionResponse {
    /// The newly created version number.
    pub version: u32,
}

/// `debug_action` request.
#[derive(Debug, Deserialize)]
pub struct DebugActionRequest {
    /// The browser op config (same shape as a `browser_action` config).
    pub config: Value,
    /// Why (logged, not stored).
    pub reason: String,
}

/// `debug_action` response.
#[derive(Debug, Serialize)]
pub struct DebugActionResponse {
    /// The operation's result, if any.
    pub result: Value,
    /// The browser state after the operation.
    pub browser_state: Value,
}

/// `inspect_tab` request.
#[derive(Debug, Default, Deserialize)]
pub struct InspectTabRequest {
    /// Tab to inspect; the active tab when omitted.
    #[serde(default)]
    pub tab: Option<String>,
}

/// `expand_dom_selector` request.
#[derive(Debug, Deserialize)]
pub struct ExpandSelectorRequest {
    /// Element id from a prior `inspect_tab` snapshot.
    pub element_id: String,
    /// Tab the snapshot came from; the active tab when omitted.
    #[serde(default)]
    pub tab: Option<String>,
}
