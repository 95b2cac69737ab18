//! The HTTP+JSON surface.
//!
//! Thin adapters over [`WorkflowService`]: every command is a POST under
//! `/workflows/{id}/commands/<name>`, reads are GETs, and the event
//! stream is server-sent events at `/workflows/{id}/events`.

use std::convert::Infallible;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use futures::Stream;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use webpilot_core::WorkflowId;

use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::service::{
    AddOrReplaceRequest, ClearAllVariablesRequest, ClearVariableRequest, DebugActionRequest,
    DeleteNodesRequest, DeleteRecordRequest, ExecuteRequest, ExpandSelectorRequest,
    GetNodesRequest, InspectTabRequest, ResetWorkflowDataRequest, SetVariableRequest,
    UpdateDescriptionRequest, UpdatePlanRequest, UpdateRecordStatusRequest, WorkflowDataRequest,
    WorkflowService,
};

type ServiceState = State<Arc<WorkflowService>>;

/// Build the router.
pub fn router(service: Arc<WorkflowService>, config: &ApiConfig) -> axum::Router {
    axum::Router::new()
        .route("/healthz", get(healthz))
        .route(
            "/workflows/{id}/commands/add_or_replace_nodes",
            post(add_or_replace_nodes),
        )
        .route("/workflows/{id}/commands/delete_nodes", post(delete_nodes))
        .route(
            "/workflows/{id}/commands/get_workflow_nodes",
            post(get_workflow_nodes),
        )
        .route("/workflows/{id}/commands/execute_nodes", post(execute_nodes))
        .route(
            "/workflows/{id}/commands/cancel_execution",
            post(cancel_execution),
        )
        .route(
            "/workflows/{id}/commands/get_workflow_data",
            post(get_workflow_data),
        )
        .route("/workflows/{id}/commands/set_variable", post(set_variable))
        .route("/workflows/{id}/commands/clear_variable", post(clear_variable))
        .route(
            "/workflows/{id}/commands/clear_all_variables",
            post(clear_all_variables),
        )
        .route(
            "/workflows/{id}/commands/reset_workflow_data",
            post(reset_workflow_data),
        )
        .route("/workflows/{id}/commands/delete_record", post(delete_record))
        .route(
            "/workflows/{id}/commands/update_record_status",
            post(update_record_status),
        )
        .route("/workflows/{id}/commands/update_plan", post(update_plan))
        .route(
            "/workflows/{id}/commands/update_workflow_description",
            post(update_workflow_description),
        )
        .route("/workflows/{id}/commands/debug_action", post(debug_action))
        .route("/workflows/{id}/commands/inspect_tab", post(inspect_tab))
        .route(
            "/workflows/{id}/commands/expand_dom_selector",
            post(expand_dom_selector),
        )
        .route("/workflows/{id}/report", get(get_execution_report))
        .route("/workflows/{id}/browser_state", get(get_browser_state))
        .route("/workflows/{id}/events", get(events))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(config.body_limit))
        .with_state(service)
}

/// An [`ApiError`] with its HTTP status.
struct Failure(ApiError);

impl IntoResponse for Failure {
    fn into_response(self) -> Response {
        let status = match self.0.code.as_str() {
            "workflow_not_found" | "record_not_found" | "alias_not_found" | "tab_not_found" => {
                StatusCode::NOT_FOUND
            }
            "busy" | "duplicate_alias" | "duplicate_record" => StatusCode::CONFLICT,
            "timeout" => StatusCode::GATEWAY_TIMEOUT,
            "store_failed" | "browser_failed" | "ai_failed" => StatusCode::BAD_GATEWAY,
            _ => StatusCode::UNPROCESSABLE_ENTITY,
        };
        (status, Json(self.0)).into_response()
    }
}

impl<E: Into<ApiError>> From<E> for Failure {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

fn workflow_id(raw: &str) -> Result<WorkflowId, Failure> {
    WorkflowId::parse(raw)
        .map_err(|_| Failure(ApiError::bad_request(format!("invalid workflow id {raw:?}"))))
}

async fn healthz() -> &'static str {
    "ok"
}

macro_rules! command {
    ($name:ident, $request:ty) => {
        async fn $name(
            State(service): ServiceState,
            Path(id): Path<String>,
            Json(request): Json<$request>,
        ) -> Result<Response, Failure> {
            let id = workflow_id(&id)?;
            let response = service.$name(id, request).await?;
            Ok(Json(response).into_response())
        }
    };
}

command!(add_or_replace_nodes, AddOrReplaceRequest);
command!(delete_nodes, DeleteNodesRequest);
command!(get_workflow_nodes, GetNodesRequest);
command!(execute_nodes, ExecuteRequest);
command!(get_workflow_data, WorkflowDataRequest);
command!(set_variable, SetVariableRequest);
command!(clear_variable, ClearVariableRequest);
command!(clear_all_variables, ClearAllVariablesRequest);
command!(reset_workflow_data, ResetWorkflowDataRequest);
command!(delete_record, DeleteRecordRequest);
command!(update_record_status, UpdateRecordStatusRequest);
command!(update_plan, UpdatePlanRequest);
command!(update_workflow_description, UpdateDescriptionRequest);
command!(debug_action, DebugActionRequest);
command!(inspect_tab, InspectTabRequest);
command!(expand_dom_selector, ExpandSelectorRequest);

async fn cancel_execution(
    State(service): ServiceState,
    Path(id): Path<String>,
) -> Result<Response, Failure> {
    let id = workflow_id(&id)?;
    let response = service.cancel_execution(id).await?;
    Ok(Json(response).into_response())
}

async fn get_execution_report(
    State(service): ServiceState,
    Path(id): Path<String>,
) -> Result<Response, Failure> {
    let id = workflow_id(&id)?;
    let response = service.get_execution_report(id).await?;
    Ok(Json(response).into_response())
}

async fn get_browser_state(
    State(service): ServiceState,
    Path(id): Path<String>,
) -> Result<Response, Failure> {
    let id = workflow_id(&id)?;
    let response = service.get_browser_state(id).await?;
    Ok(Json(response).into_response())
}

/// Server-sent events, filtered to one workflow.
///
/// Delivery is best-effort: a slow consumer that lags the bus misses
/// the lagged-over events and keeps receiving from there.
async fn events(
    State(service): ServiceState,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, Failure> {
    let id = workflow_id(&id)?.to_string();
    let subscriber = service.subscribe();

    let stream = futures::stream::unfold(
        (subscriber, id),
        |(mut subscriber, id)| async move {
            loop {
                let event = subscriber.recv().await?;
                if event.workflow_id() != id {
                    continue;
                }
                let sse = Event::default()
                    .event(event.name())
                    .json_data(&event)
                    .unwrap_or_else(|_| Event::default().event(event.name()));
                return Some((Ok(sse), (subscriber, id)));
            }
        },
    );

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
