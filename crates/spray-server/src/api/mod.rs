//! HTTP surface over the plan orchestrator.

pub mod request_id;
mod routes;
pub mod spray_plans;

use axum::Router;
use std::sync::Arc;

use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    routes::create_router()
}
