//! REST API routes.

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::api::{request_id, spray_plans};
use crate::state::AppState;

/// Create the API router.
pub fn create_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route(
            "/v1/projects/:project_id/spray-plans",
            post(spray_plans::create_spray_plan),
        )
        .route("/v1/spray-plans/:plan_id", get(spray_plans::get_spray_plan))
        .route("/v1/spray-plans/:plan_id/zones", get(spray_plans::get_plan_zones))
        .route("/v1/spray-plans/:plan_id/missions", get(spray_plans::get_plan_missions))
        .layer(middleware::from_fn(request_id::ensure_request_id))
}
