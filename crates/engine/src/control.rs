//! Control structures: `iterate` and `route`.
//!
//! Bodies and branches are position arrays re-resolved through the
//! alias index, never pointers, so structural edits between executions
//! cannot leave dangling references. Iteration bindings are scoped to
//! the enclosing iterate node and discarded when it completes.

use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use webpilot_core::{Alias, ExecutionId, Position};
use webpilot_expression::evaluate_condition;
use webpilot_store::RecordStatus;
use webpilot_workflow::{
    IterateConfig, Node, NodeRef, OnError, RouteBranch, RouteConfig, Workflow, resolve_refs,
};

use crate::context::{ExecutionScope, snapshot_context};
use crate::effects::mark_record_status;
use crate::error::NodeFailure;
use crate::executor::{DispatchOutcome, Executor, resolve_to_string};
use crate::report::{EffectsSummary, NodeReport, NodeStatus};

/// A failure inside an iterate body or route branch.
pub(crate) struct BodyFailure {
    pub alias: Option<Alias>,
    pub failure: NodeFailure,
}

impl BodyFailure {
    /// Lift the inner failure to the container node, keeping its code
    /// so timeouts and cancellations propagate their status.
    fn lift(self, context: &str) -> NodeFailure {
        let alias = self
            .alias
            .map_or_else(|| "?".to_owned(), |alias| alias.to_string());
        NodeFailure {
            code: self.failure.code,
            message: format!("{context}: node {alias} failed: {}", self.failure.message),
            details: self.failure.details,
        }
    }
}

impl Executor {
    /// Run a body: the positions in order, stop-on-error.
    ///
    /// Returns the reports of every node that ran; the first failure
    /// aborts the rest.
    pub(crate) async fn run_body(
        &self,
        workflow: &Workflow,
        positions: &[Position],
        scope: &mut ExecutionScope,
        cancel: &CancellationToken,
        execution_id: ExecutionId,
    ) -> (Vec<NodeReport>, Option<BodyFailure>) {
        let mut reports = Vec::with_capacity(positions.len());
        for &position in positions {
            if cancel.is_cancelled() {
                return (
                    reports,
                    Some(BodyFailure {
                        alias: None,
                        failure: NodeFailure::cancelled(),
                    }),
                );
            }
            let Some(node) = workflow.node_at(position) else {
                return (
                    reports,
                    Some(BodyFailure {
                        alias: None,
                        failure: NodeFailure::new(
                            "invalid_reference",
                            format!("body position {position} does not exist"),
                        ),
                    }),
                );
            };
            let report =
                Box::pin(self.run_node(workflow, node, scope, cancel, execution_id)).await;
            let failed = report.status != NodeStatus::Success;
            let failure = report.error.clone();
            let alias = report.alias.clone();
            reports.push(report);
            if failed {
                return (
                    reports,
                    Some(BodyFailure {
                        alias: Some(alias),
                        failure: failure.unwrap_or_else(|| {
                            NodeFailure::new("node_failed", "body node failed")
                        }),
                    }),
                );
            }
        }
        (reports, None)
    }

    /// `iterate` -- loop a body over an array or over records.
    pub(crate) async fn run_iterate(
        &self,
        workflow: &Workflow,
        node: &Node,
        config: &IterateConfig,
        scope: &mut ExecutionScope,
        cancel: &CancellationToken,
        execution_id: ExecutionId,
    ) -> DispatchOutcome {
        let positions = self.body_positions(workflow, config.body(), config.body_positions())?;
        let on_error = config.on_error();

        match config {
            IterateConfig::Items { over, variable, .. } => {
                let ctx =
                    snapshot_context(self.store.as_ref(), self.workflow_id, scope).await?;
                let over_value =
                    webpilot_expression::resolve_string(over, &ctx).map_err(NodeFailure::from)?;
                let Value::Array(items) = over_value else {
                    return Err(NodeFailure::new(
                        "invalid_iteration",
                        format!("iterate over {over:?} did not yield an array"),
                    ));
                };

                let total = items.len();
                let mut effects = EffectsSummary::default();
                let mut failed_iterations = Vec::new();

                for (i, element) in items.iter().enumerate() {
                    if cancel.is_cancelled() {
                        return Err(NodeFailure::cancelled());
                    }
                    debug!(alias = %node.alias, iteration = i, total, "iteration started");
                    scope.push_frame();
                    scope.bind(variable.clone(), element.clone());
                    scope.bind(format!("{variable}Index"), json!(i));
                    scope.bind(format!("{variable}Total"), json!(total));

                    let (reports, failure) = self
                        .run_body(workflow, &positions, scope, cancel, execution_id)
                        .await;
                    scope.pop_frame();
                    for report in reports {
                        effects.absorb(report.effects);
                    }

                    if let Some(failure) = failure {
                        if failure.failure.is_cancellation() {
                            return Err(NodeFailure::cancelled());
                        }
                        match on_error {
                            OnError::Abort => {
                                return Err(failure.lift(&format!("iteration {i}")));
                            }
                            OnError::Continue => failed_iterations.push(i),
                        }
                    }
                }

                Ok((
                    Some(json!({
                        "iterations": total,
                        "failed_iterations": failed_iterations,
                    })),
                    effects,
                ))
            }

            IterateConfig::Records {
                over_records,
                as_name,
                ..
            } => {
                let ctx =
                    snapshot_context(self.store.as_ref(), self.workflow_id, scope).await?;
                let pattern = resolve_to_string(over_records, &ctx)?;
                let records = self
                    .store
                    .list_records(self.workflow_id, &pattern)
                    .await
                    .map_err(NodeFailure::from)?;

                let total = records.len();
                let mut effects = EffectsSummary::default();
                let mut failed_records = Vec::new();

                for (i, record) in records.iter().enumerate() {
                    if cancel.is_cancelled() {
                        return Err(NodeFailure::cancelled());
                    }
                    let record_id = record.record_id.clone();
                    debug!(alias = %node.alias, record = %record_id, "record iteration started");

                    mark_record_status(
                        self.store.as_ref(),
                        self.workflow_id,
                        &record_id,
                        RecordStatus::Processing,
                        None,
                    )
                    .await?;

                    scope.push_frame();
                    scope.enter_record(record_id.clone());
                    scope.bind(as_name.clone(), record.merged_view());
                    scope.bind(format!("{as_name}Index"), json!(i));
                    scope.bind(format!("{as_name}Total"), json!(total));

                    let (reports, failure) = self
                        .run_body(workflow, &positions, scope, cancel, execution_id)
                        .await;
                    scope.leave_record();
                    scope.pop_frame();
                    for report in reports {
                        effects.absorb(report.effects);
                    }

                    match failure {
                        None => {
                            mark_record_status(
                                self.store.as_ref(),
                                self.workflow_id,
                                &record_id,
                                RecordStatus::Completed,
                                None,
                            )
                            .await?;
                        }
                        Some(failure) => {
                            if failure.failure.is_cancellation() {
                                return Err(NodeFailure::cancelled());
                            }
                            mark_record_status(
                                self.store.as_ref(),
                                self.workflow_id,
                                &record_id,
                                RecordStatus::Failed,
                                Some(failure.failure.message.clone()),
                            )
                            .await?;
                            match on_error {
                                OnError::Abort => {
                                    return Err(
                                        failure.lift(&format!("record {record_id}"))
                                    );
                                }
                                OnError::Continue => failed_records.push(record_id),
                            }
                        }
                    }
                }

                Ok((
                    Some(json!({
                        "records": total,
                        "failed_records": failed_records,
                    })),
                    effects,
                ))
            }
        }
    }

    /// `route` -- first-match single routing, or collection partitioning.
    pub(crate) async fn run_route(
        &self,
        workflow: &Workflow,
        node: &Node,
        config: &RouteConfig,
        scope: &mut ExecutionScope,
        cancel: &CancellationToken,
        execution_id: ExecutionId,
    ) -> DispatchOutcome {
        match config {
            RouteConfig::Single(branches) => {
                let ctx =
                    snapshot_context(self.store.as_ref(), self.workflow_id, scope).await?;

                let mut selected: Option<&RouteBranch> = None;
                for branch in branches {
                    if evaluate_condition(&branch.condition, &ctx).map_err(NodeFailure::from)? {
                        selected = Some(branch);
                        break;
                    }
                }
                let Some(branch) = selected else {
                    debug!(alias = %node.alias, "no route condition matched");
                    return Ok((Some(json!({ "matched": Value::Null })), EffectsSummary::default()));
                };

                debug!(alias = %node.alias, route = %branch.name, "route matched");
                let positions = self.body_positions(
                    workflow,
                    &branch.branch,
                    branch.branch_positions.as_deref(),
                )?;
                let (reports, failure) = self
                    .run_body(workflow, &positions, scope, cancel, execution_id)
                    .await;
                let mut effects = EffectsSummary::default();
                for report in reports {
                    effects.absorb(report.effects);
                }
                if let Some(failure) = failure {
                    return Err(failure.lift(&format!("route {:?}", branch.name)));
                }
                Ok((Some(json!({ "matched": branch.name })), effects))
            }

            RouteConfig::Collection { over, routes, .. } => {
                let base_ctx =
                    snapshot_context(self.store.as_ref(), self.workflow_id, scope).await?;
                let pattern = resolve_to_string(over, &base_ctx)?;
                let records = self
                    .store
                    .list_records(self.workflow_id, &pattern)
                    .await
                    .map_err(NodeFailure::from)?;

                // Partition: first matching route wins, evaluated per
                // record in declaration order.
                let mut partitions = serde_json::Map::new();
                for route in routes {
                    partitions.insert(route.name.clone(), json!([]));
                }
                for record in &records {
                    let mut ctx = base_ctx.clone();
                    ctx.set_current_record(record.merged_view());
                    for route in routes {
                        if evaluate_condition(&route.condition, &ctx)
                            .map_err(NodeFailure::from)?
                        {
                            if let Some(Value::Array(ids)) = partitions.get_mut(&route.name) {
                                ids.push(json!(record.record_id));
                            }
                            break;
                        }
                    }
                }

                // Branches run with {{route.<name>}} in scope; the
                // bindings are discarded when the route completes.
                scope.push_frame();
                scope.bind("route", Value::Object(partitions.clone()));

                let mut effects = EffectsSummary::default();
                for route in routes {
                    if cancel.is_cancelled() {
                        scope.pop_frame();
                        return Err(NodeFailure::cancelled());
                    }
                    let positions = match self.body_positions(
                        workflow,
                        &route.branch,
                        route.branch_positions.as_deref(),
                    ) {
                        Ok(positions) => positions,
                        Err(failure) => {
                            scope.pop_frame();
                            return Err(failure);
                        }
                    };
                    let (reports, failure) = self
                        .run_body(workflow, &positions, scope, cancel, execution_id)
                        .await;
                    for report in reports {
                        effects.absorb(report.effects);
                    }
                    if let Some(failure) = failure {
                        scope.pop_frame();
                        return Err(failure.lift(&format!("route {:?}", route.name)));
                    }
                }
                scope.pop_frame();

                Ok((Some(json!({ "partitions": partitions })), effects))
            }
        }
    }

    /// Materialize body/branch positions: stored resolution when
    /// present, fresh alias resolution otherwise.
    fn body_positions(
        &self,
        workflow: &Workflow,
        refs: &[NodeRef],
        stored: Option<&[Position]>,
    ) -> Result<Vec<Position>, NodeFailure> {
        if let Some(positions) = stored {
            return Ok(positions.to_vec());
        }
        let index = workflow.index().map_err(NodeFailure::from)?;
        resolve_refs(refs, &index).map_err(NodeFailure::from)
    }
}
