//! Spray plan handlers.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use spray_core::{Plan, PlanStatus, SprayPlanRequest};
use std::sync::Arc;

use crate::orchestrator::RunError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct PlanAccepted {
    pub plan_id: String,
    pub status: PlanStatus,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn internal_error(err: impl std::fmt::Display) -> Response {
    tracing::error!(error = %err, "Spray plan request failed");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
}

/// An empty body means "all defaults".
fn parse_request(body: &[u8]) -> Result<SprayPlanRequest, serde_json::Error> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(SprayPlanRequest::default());
    }
    serde_json::from_slice(body)
}

/// POST /v1/projects/:project_id/spray-plans
pub async fn create_spray_plan(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    body: Bytes,
) -> Response {
    let request = match parse_request(&body) {
        Ok(request) => request,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, format!("invalid plan request: {err}")),
    };

    let plan = match state.orchestrator.create_plan(&project_id, &request).await {
        Ok(plan) => plan,
        Err(RunError::ProjectNotFound(id)) => {
            return error_response(StatusCode::NOT_FOUND, format!("project {id} not found"))
        }
        Err(err) => return internal_error(err),
    };

    if !state.enqueue(plan.id.clone()) {
        // The row stays QUEUED and is picked up on the next start
        tracing::warn!(plan_id = %plan.id, "Plan worker unavailable; plan left queued");
    }

    (
        StatusCode::ACCEPTED,
        Json(PlanAccepted {
            plan_id: plan.id,
            status: plan.status,
        }),
    )
        .into_response()
}

async fn find_plan(state: &AppState, plan_id: &str) -> Result<Plan, Response> {
    match state.orchestrator.plans().load_plan(plan_id).await {
        Ok(Some(plan)) => Ok(plan),
        Ok(None) => Err(error_response(StatusCode::NOT_FOUND, format!("plan {plan_id} not found"))),
        Err(err) => Err(internal_error(err)),
    }
}

/// GET /v1/spray-plans/:plan_id
pub async fn get_spray_plan(State(state): State<Arc<AppState>>, Path(plan_id): Path<String>) -> Response {
    match find_plan(&state, &plan_id).await {
        Ok(plan) => Json(plan).into_response(),
        Err(response) => response,
    }
}

/// GET /v1/spray-plans/:plan_id/zones
pub async fn get_plan_zones(State(state): State<Arc<AppState>>, Path(plan_id): Path<String>) -> Response {
    if let Err(response) = find_plan(&state, &plan_id).await {
        return response;
    }
    match state.orchestrator.plans().load_zones(&plan_id).await {
        Ok(zones) => Json(zones).into_response(),
        Err(err) => internal_error(err),
    }
}

/// GET /v1/spray-plans/:plan_id/missions
pub async fn get_plan_missions(State(state): State<Arc<AppState>>, Path(plan_id): Path<String>) -> Response {
    if let Err(response) = find_plan(&state, &plan_id).await {
        return response;
    }
    match state.orchestrator.plans().load_missions(&plan_id).await {
        Ok(missions) => Json(missions).into_response(),
        Err(err) => internal_error(err),
    }
}
