//! The node executor.
//!
//! Executes one selection of nodes at a time against the shared browser
//! session and store: resolves references and templates, dispatches by
//! node type, applies post-execution effects, and enforces
//! stop-on-error. At most one execution per workflow is in flight; a
//! concurrent attempt fails with `busy`.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use webpilot_ai::{GenerateRequest, RetryStrategy, TextGenerator, retry_generate};
use webpilot_browser::{BrowserSession, ClickTarget};
use webpilot_core::{ExecutionId, WorkflowId};
use webpilot_expression::{ResolveContext, resolve_value};
use webpilot_schema::Schema;
use webpilot_store::StoreBackend;
use webpilot_telemetry::{EventBus, MetricsRegistry, WorkflowEvent};
use webpilot_workflow::{
    AiActConfig, AiExtractConfig, BrowserActionConfig, BrowserOp, BrowserQueryConfig,
    CognitionConfig, ContextConfig, EffectsSpec, Node, NodeConfig, QueryKind, ValidationConfig,
    ValidationRule, Workflow, parse_selection,
};

use crate::context::{ExecutionScope, snapshot_context};
use crate::effects::{apply_create_records, apply_store};
use crate::error::{EngineError, NodeFailure};
use crate::report::{EffectsSummary, ExecutionReport, NodeReport, NodeStatus, RunStatus};

/// The outcome of one node dispatch: an optional result plus effects.
pub(crate) type DispatchOutcome = Result<(Option<Value>, EffectsSummary), NodeFailure>;

/// The node execution engine for one workflow.
///
/// All collaborators are injected; the executor holds no process-global
/// state and owns no threads. Dropping it releases nothing external.
pub struct Executor {
    pub(crate) workflow_id: WorkflowId,
    pub(crate) store: Arc<dyn StoreBackend>,
    pub(crate) session: Arc<BrowserSession>,
    pub(crate) generator: Arc<dyn TextGenerator>,
    pub(crate) events: Arc<EventBus>,
    pub(crate) metrics: Arc<MetricsRegistry>,
    pub(crate) retry: RetryStrategy,
    run_lock: tokio::sync::Mutex<()>,
    active_cancel: parking_lot::Mutex<Option<CancellationToken>>,
    last_report: parking_lot::Mutex<Option<ExecutionReport>>,
}

impl Executor {
    /// Create an executor with the given collaborators.
    pub fn new(
        workflow_id: WorkflowId,
        store: Arc<dyn StoreBackend>,
        session: Arc<BrowserSession>,
        generator: Arc<dyn TextGenerator>,
        events: Arc<EventBus>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            workflow_id,
            store,
            session,
            generator,
            events,
            metrics,
            retry: RetryStrategy::default(),
            run_lock: tokio::sync::Mutex::new(()),
            active_cancel: parking_lot::Mutex::new(None),
            last_report: parking_lot::Mutex::new(None),
        }
    }

    /// Override the AI retry strategy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryStrategy) -> Self {
        self.retry = retry;
        self
    }

    /// Request cancellation of the in-flight execution, if any.
    ///
    /// Returns whether there was one to cancel. The running node is
    /// allowed to complete its current operation; everything after it
    /// is skipped.
    pub fn cancel(&self) -> bool {
        match self.active_cancel.lock().as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// The report of the most recently finished execution.
    #[must_use]
    pub fn last_report(&self) -> Option<ExecutionReport> {
        self.last_report.lock().clone()
    }

    /// The browser session this executor drives.
    #[must_use]
    pub fn session(&self) -> &BrowserSession {
        &self.session
    }

    /// Execute a selection of nodes with stop-on-error.
    pub async fn execute(
        &self,
        workflow: &Workflow,
        selection: &str,
        reset_browser_first: bool,
    ) -> Result<ExecutionReport, EngineError> {
        let Ok(_guard) = self.run_lock.try_lock() else {
            return Err(EngineError::Busy);
        };

        let index = workflow.index()?;
        let positions = parse_selection(selection, &index)?;

        if reset_browser_first {
            self.session.reset().await?;
        }

        let cancel = CancellationToken::new();
        *self.active_cancel.lock() = Some(cancel.clone());

        let execution_id = ExecutionId::v4();
        let started = Instant::now();
        info!(
            workflow = %self.workflow_id,
            execution = %execution_id,
            selection,
            nodes = positions.len(),
            "execution started"
        );
        self.events.emit(WorkflowEvent::ExecutionStarted {
            workflow_id: self.workflow_id.to_string(),
            execution_id: execution_id.to_string(),
        });
        self.metrics.counter("executions_started_total").inc();

        let mut scope = ExecutionScope::new();
        let mut nodes = Vec::with_capacity(positions.len());
        let mut halted = false;

        for position in positions {
            let Some(node) = workflow.node_at(position) else {
                // parse_selection validated positions against the index.
                continue;
            };
            if halted {
                nodes.push(NodeReport::skipped(
                    position,
                    node.alias.clone(),
                    node.node_type(),
                ));
                continue;
            }
            if cancel.is_cancelled() {
                nodes.push(NodeReport::skipped(
                    position,
                    node.alias.clone(),
                    node.node_type(),
                ));
                halted = true;
                continue;
            }

            let report = self
                .run_node(workflow, node, &mut scope, &cancel, execution_id)
                .await;
            halted = report.status.halts_execution();
            nodes.push(report);
        }

        *self.active_cancel.lock() = None;

        let status = if cancel.is_cancelled()
            || nodes.iter().any(|n| n.status == NodeStatus::Cancelled)
        {
            RunStatus::Cancelled
        } else if nodes
            .iter()
            .any(|n| matches!(n.status, NodeStatus::Error | NodeStatus::Timeout))
        {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };
        let duration = started.elapsed();

        self.events.emit(WorkflowEvent::ExecutionFinished {
            workflow_id: self.workflow_id.to_string(),
            execution_id: execution_id.to_string(),
            status: status.to_string(),
            duration,
        });
        self.metrics
            .counter(match status {
                RunStatus::Completed => "executions_completed_total",
                RunStatus::Failed => "executions_failed_total",
                RunStatus::Cancelled => "executions_cancelled_total",
            })
            .inc();
        self.metrics
            .histogram("execution_duration_seconds")
            .observe(duration.as_secs_f64());
        info!(
            execution = %execution_id,
            status = %status,
            duration_ms = duration.as_millis() as u64,
            "execution finished"
        );

        let report = ExecutionReport {
            execution_id,
            status,
            duration_ms: duration.as_millis() as u64,
            nodes,
        };
        *self.last_report.lock() = Some(report.clone());
        Ok(report)
    }

    /// Execute one node and report it. Never raises: failures become
    /// the report's `error`.
    pub(crate) async fn run_node(
        &self,
        workflow: &Workflow,
        node: &Node,
        scope: &mut ExecutionScope,
        cancel: &CancellationToken,
        execution_id: ExecutionId,
    ) -> NodeReport {
        let started = Instant::now();
        debug!(alias = %node.alias, node_type = %node.node_type(), "node started");

        let outcome = if cancel.is_cancelled() {
            Err(NodeFailure::cancelled())
        } else {
            self.dispatch(workflow, node, scope, cancel, execution_id)
                .await
        };

        let duration = started.elapsed();
        let report = match outcome {
            Ok((result, effects)) => NodeReport {
                position: node.position,
                alias: node.alias.clone(),
                node_type: node.node_type(),
                status: NodeStatus::Success,
                duration_ms: duration.as_millis() as u64,
                result,
                error: None,
                effects,
            },
            Err(failure) => {
                warn!(alias = %node.alias, code = %failure.code, "node failed: {}", failure.message);
                let status = if failure.is_cancellation() {
                    NodeStatus::Cancelled
                } else if failure.is_timeout() {
                    NodeStatus::Timeout
                } else {
                    NodeStatus::Error
                };
                NodeReport {
                    position: node.position,
                    alias: node.alias.clone(),
                    node_type: node.node_type(),
                    status,
                    duration_ms: duration.as_millis() as u64,
                    result: None,
                    error: Some(failure),
                    effects: EffectsSummary::default(),
                }
            }
        };

        self.metrics.counter("nodes_executed_total").inc();
        self.metrics
            .histogram("node_duration_seconds")
            .observe(duration.as_secs_f64());
        self.events.emit(WorkflowEvent::NodeExecuted {
            workflow_id: self.workflow_id.to_string(),
            execution_id: execution_id.to_string(),
            report: serde_json::to_value(&report).unwrap_or_else(|_| json!(null)),
        });
        report
    }

    async fn dispatch(
        &self,
        workflow: &Workflow,
        node: &Node,
        scope: &mut ExecutionScope,
        cancel: &CancellationToken,
        execution_id: ExecutionId,
    ) -> DispatchOutcome {
        // Containers manage their own contexts per iteration/branch.
        match &node.config {
            NodeConfig::Iterate(config) => {
                return self
                    .run_iterate(workflow, node, config, scope, cancel, execution_id)
                    .await;
            }
            NodeConfig::Route(config) => {
                return self
                    .run_route(workflow, node, config, scope, cancel, execution_id)
                    .await;
            }
            _ => {}
        }

        let ctx = snapshot_context(self.store.as_ref(), self.workflow_id, scope).await?;
        if let Some(params) = &node.params {
            // Params are auxiliary inputs: resolved for fatality of
            // dangling references, surfaced to handlers that take them.
            resolve_value(params, &ctx)?;
        }

        match &node.config {
            NodeConfig::Context(config) => self.run_context(config, &ctx).await,
            NodeConfig::BrowserAction(config) => self.run_browser_action(node, config, &ctx, scope).await,
            NodeConfig::BrowserQuery(config) => self.run_browser_query(node, config, &ctx, scope).await,
            NodeConfig::BrowserAiExtract(config) => {
                self.run_ai_extract(node, config, &ctx, scope).await
            }
            NodeConfig::BrowserAiAct(config) => self.run_ai_act(config, &ctx).await,
            NodeConfig::Cognition(config) => self.run_cognition(node, config, &ctx, scope).await,
            NodeConfig::Validation(config) => self.run_validation(config, &ctx).await,
            NodeConfig::Iterate(_) | NodeConfig::Route(_) => unreachable!("handled above"),
        }
    }

    /// `context` -- write variables as declared, no namespacing.
    async fn run_context(&self, config: &ContextConfig, ctx: &ResolveContext) -> DispatchOutcome {
        let mut effects = EffectsSummary::default();
        let mut written = serde_json::Map::with_capacity(config.variables.len());
        for (key, value) in &config.variables {
            let resolved = resolve_value(value, ctx)?;
            self.store
                .set_global(self.workflow_id, key, resolved.clone())
                .await
                .map_err(NodeFailure::from)?;
            effects.variables_written.push(key.clone());
            written.insert(key.clone(), resolved);
        }
        Ok((Some(Value::Object(written)), effects))
    }

    /// `browser_action` -- one deterministic browser operation.
    async fn run_browser_action(
        &self,
        node: &Node,
        config: &BrowserActionConfig,
        ctx: &ResolveContext,
        scope: &ExecutionScope,
    ) -> DispatchOutcome {
        let op: BrowserOp = resolve_typed(&config.op, ctx)?;
        let result = self.perform_browser_op(&op).await?;

        let effects_spec = EffectsSpec {
            store: config.store.clone(),
            create_records: None,
            store_to_record: config.store_to_record,
        };
        let effects = self
            .apply_effects(node, &effects_spec, result.as_ref(), scope)
            .await?;
        Ok((result, effects))
    }

    /// Shared browser-op dispatch (also used by `debug_action`).
    pub(crate) async fn perform_browser_op(
        &self,
        op: &BrowserOp,
    ) -> Result<Option<Value>, NodeFailure> {
        let session = &self.session;
        match op {
            BrowserOp::Navigate {
                url,
                tab,
                validate_landing,
            } => {
                session
                    .navigate(url, tab.as_deref(), validate_landing.unwrap_or(false))
                    .await?;
                Ok(None)
            }
            BrowserOp::Click {
                selector,
                coords,
                tab,
                expect_progress,
            } => {
                let target = match (selector, coords) {
                    (Some(selector), _) => ClickTarget::Selector(selector.clone()),
                    (None, Some([x, y])) => ClickTarget::Coords { x: *x, y: *y },
                    (None, None) => {
                        return Err(NodeFailure::new(
                            "invalid_config",
                            "click needs a selector or coords",
                        ));
                    }
                };
                session.click(&target, tab.as_deref(), *expect_progress).await?;
                Ok(None)
            }
            BrowserOp::Type {
                selector,
                text,
                tab,
                expect_progress,
            } => {
                session
                    .type_text(selector, text, tab.as_deref(), *expect_progress)
                    .await?;
                Ok(None)
            }
            BrowserOp::Keypress { key, tab } => {
                session.keypress(key, tab.as_deref()).await?;
                Ok(None)
            }
            BrowserOp::Wait { selector, ms, tab } => {
                session.wait(selector.as_deref(), *ms, tab.as_deref()).await?;
                Ok(None)
            }
            BrowserOp::OpenTab { url, name } => {
                let name = session.open_tab(url.as_deref(), name.clone()).await?;
                Ok(Some(json!({ "tab": name })))
            }
            BrowserOp::CloseTab { name } => {
                session.close_tab(name).await?;
                Ok(None)
            }
            BrowserOp::SwitchTab { name } => {
                session.switch_tab(name).await?;
                Ok(None)
            }
            BrowserOp::Back { tab } => {
                session.back(tab.as_deref()).await?;
                Ok(None)
            }
            BrowserOp::Forward { tab } => {
                session.forward(tab.as_deref()).await?;
                Ok(None)
            }
            BrowserOp::Reload { tab } => {
                session.reload(tab.as_deref()).await?;
                Ok(None)
            }
            BrowserOp::Screenshot { tab, full_page } => {
                let shot = session.screenshot(tab.as_deref(), *full_page).await?;
                let value = serde_json::to_value(&shot)
                    .map_err(|err| NodeFailure::new("browser_failed", err.to_string()))?;
                Ok(Some(value))
            }
        }
    }

    /// `browser_query` -- deterministic DOM queries.
    async fn run_browser_query(
        &self,
        node: &Node,
        config: &BrowserQueryConfig,
        ctx: &ResolveContext,
        scope: &ExecutionScope,
    ) -> DispatchOutcome {
        let config: BrowserQueryConfig = resolve_typed(config, ctx)?;
        let tab = config.tab.as_deref();
        let result = match config.query {
            QueryKind::Extract => {
                let fields = config.fields.clone().unwrap_or_default();
                self.session.extract(&config.selector, &fields, tab).await?
            }
            QueryKind::Exists => {
                json!({"exists": self.session.selector_exists(&config.selector, tab).await?})
            }
            QueryKind::Absent => {
                json!({"absent": !self.session.selector_exists(&config.selector, tab).await?})
            }
            QueryKind::Count => {
                json!({"count": self.session.count(&config.selector, tab).await?})
            }
        };

        let effects = self
            .apply_effects(node, &config.effects, Some(&result), scope)
            .await?;
        Ok((Some(result), effects))
    }

    /// `browser_ai_extract` -- AI extraction validated against a schema.
    async fn run_ai_extract(
        &self,
        node: &Node,
        config: &AiExtractConfig,
        ctx: &ResolveContext,
        scope: &ExecutionScope,
    ) -> DispatchOutcome {
        let instruction = resolve_to_string(&config.instruction, ctx)?;
        let schema_decl = resolve_value(&config.schema, ctx)?;
        let schema = Schema::from_value(&schema_decl).map_err(NodeFailure::from)?;
        let tab = config.tab.as_deref();

        let mut attempt = 1;
        let raw = loop {
            let result = self.session.ai_extract(&instruction, &schema_decl, tab).await;
            match result {
                Ok(value) => break value,
                Err(err) if err.is_transient_ai() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(attempt, "retrying ai extraction: {err}");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        };

        let (validated, coercions) =
            webpilot_schema::validate_and_coerce(raw, &schema).map_err(NodeFailure::from)?;
        if !coercions.is_empty() {
            debug!(alias = %node.alias, coercions = coercions.len(), "ai output coerced");
        }

        let effects = self
            .apply_effects(node, &config.effects, Some(&validated), scope)
            .await?;
        Ok((Some(validated), effects))
    }

    /// `browser_ai_act` -- AI page action, no structured result.
    async fn run_ai_act(&self, config: &AiActConfig, ctx: &ResolveContext) -> DispatchOutcome {
        let instruction = resolve_to_string(&config.instruction, ctx)?;
        let tab = config.tab.as_deref();

        let mut attempt = 1;
        loop {
            match self.session.ai_act(&instruction, tab).await {
                Ok(()) => return Ok((None, EffectsSummary::default())),
                Err(err) if err.is_transient_ai() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(attempt, "retrying ai action: {err}");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// `cognition` -- external text generation, optionally schema-checked.
    async fn run_cognition(
        &self,
        node: &Node,
        config: &CognitionConfig,
        ctx: &ResolveContext,
        scope: &ExecutionScope,
    ) -> DispatchOutcome {
        let instruction = resolve_to_string(&config.instruction, ctx)?;
        let mut request = GenerateRequest::new(instruction);
        if let Some(inputs) = &config.inputs {
            request = request.with_inputs(resolve_value(inputs, ctx)?);
        }

        let schema = match &config.schema {
            Some(decl) => {
                let resolved = resolve_value(decl, ctx)?;
                request = request.with_schema(resolved.clone());
                Some(Schema::from_value(&resolved).map_err(NodeFailure::from)?)
            }
            None => None,
        };

        let raw = retry_generate(self.generator.as_ref(), &request, &self.retry)
            .await
            .map_err(NodeFailure::from)?;
        let value = match schema {
            Some(schema) => {
                webpilot_schema::validate_and_coerce(raw, &schema)
                    .map_err(NodeFailure::from)?
                    .0
            }
            None => raw,
        };

        let effects = self
            .apply_effects(node, &config.effects, Some(&value), scope)
            .await?;
        Ok((Some(value), effects))
    }

    /// `validation` -- evaluate every rule; any failure fails the node.
    async fn run_validation(
        &self,
        config: &ValidationConfig,
        ctx: &ResolveContext,
    ) -> DispatchOutcome {
        let config: ValidationConfig = resolve_typed(config, ctx)?;
        let mut failures = Vec::new();
        for rule in &config.rules {
            let passed = match rule {
                ValidationRule::ElementExists { selector, tab } => {
                    self.session.selector_exists(selector, tab.as_deref()).await?
                }
                ValidationRule::ElementAbsent { selector, tab } => {
                    !self.session.selector_exists(selector, tab.as_deref()).await?
                }
                ValidationRule::AiAssessment { instruction, tab } => {
                    self.session.ai_assess(instruction, tab.as_deref()).await?
                }
            };
            if !passed {
                failures.push(serde_json::to_value(rule).unwrap_or_else(|_| json!(null)));
            }
        }

        if failures.is_empty() {
            Ok((
                Some(json!({"rules": config.rules.len(), "passed": true})),
                EffectsSummary::default(),
            ))
        } else {
            Err(
                NodeFailure::new("validation_failed", "one or more validation rules failed")
                    .with_details(json!({ "failed_rules": failures })),
            )
        }
    }

    /// Apply `store`, `create_records`, and record attribution.
    pub(crate) async fn apply_effects(
        &self,
        node: &Node,
        spec: &EffectsSpec,
        result: Option<&Value>,
        scope: &ExecutionScope,
    ) -> Result<EffectsSummary, NodeFailure> {
        let mut effects = EffectsSummary::default();
        let Some(result) = result else {
            return Ok(effects);
        };

        // Inside record iteration, `store` attributes to the current
        // record; `store_to_record` forces that even without `store`.
        let current_record = scope.current_record();
        if let Some(store_spec) = &spec.store {
            effects.absorb(
                apply_store(
                    self.store.as_ref(),
                    self.workflow_id,
                    node.alias.as_str(),
                    store_spec,
                    result,
                    current_record,
                )
                .await?,
            );
        } else if spec.store_to_record {
            if let Some(record_id) = current_record {
                effects.absorb(
                    apply_store(
                        self.store.as_ref(),
                        self.workflow_id,
                        node.alias.as_str(),
                        &webpilot_workflow::StoreSpec::Result,
                        result,
                        Some(record_id),
                    )
                    .await?,
                );
            }
        }

        if let Some(create_spec) = &spec.create_records {
            effects.absorb(
                apply_create_records(
                    self.store.as_ref(),
                    self.workflow_id,
                    node.alias.as_str(),
                    create_spec,
                    spec.store.as_ref(),
                    result,
                )
                .await?,
            );
        }
        Ok(effects)
    }

    /// Execute a one-off browser operation without touching the
    /// workflow program. Templates resolve against the current store.
    pub async fn debug_action(&self, op_config: &Value) -> Result<Value, NodeFailure> {
        let scope = ExecutionScope::new();
        let ctx = snapshot_context(self.store.as_ref(), self.workflow_id, &scope).await?;
        let resolved = resolve_value(op_config, &ctx)?;
        let op: BrowserOp = serde_json::from_value(resolved)
            .map_err(|err| NodeFailure::new("invalid_config", err.to_string()))?;
        let result = self.perform_browser_op(&op).await?;
        Ok(result.unwrap_or(Value::Null))
    }
}

/// Resolve every templated leaf of a typed config by round-tripping it
/// through its JSON representation.
pub(crate) fn resolve_typed<T: Serialize + DeserializeOwned>(
    config: &T,
    ctx: &ResolveContext,
) -> Result<T, NodeFailure> {
    let raw = serde_json::to_value(config)
        .map_err(|err| NodeFailure::new("invalid_config", err.to_string()))?;
    let resolved = resolve_value(&raw, ctx)?;
    serde_json::from_value(resolved)
        .map_err(|err| NodeFailure::new("invalid_config", err.to_string()))
}

/// Resolve a template-bearing string, coercing the result to a string.
pub(crate) fn resolve_to_string(
    text: &str,
    ctx: &ResolveContext,
) -> Result<String, NodeFailure> {
    let value = webpilot_expression::resolve_string(text, ctx)?;
    Ok(match value {
        Value::String(s) => s,
        other => other.to_string(),
    })
}
