use axum::{
    Router,
    routing::{get, post},
};

use crate::{AppState, agents, jobs, runs};

/// Create all v2 API routes.
///
/// Agent-authenticated routes take an `AuthedAgent` extractor; operator
/// routes are tenant-scoped via the `Tenant` extractor.
pub fn create_v2_router() -> Router<AppState> {
    Router::new()
        // Agent bus
        .route("/agents/register", post(agents::handlers::register))
        .route("/agents/heartbeat", post(agents::handlers::heartbeat))
        .route("/agents/lease", post(agents::handlers::lease))
        .route(
            "/jobs/{id}/events",
            post(jobs::handlers::append_event).get(jobs::handlers::list_events),
        )
        .route("/jobs/{id}/complete", post(jobs::handlers::complete))
        .route("/jobs/{id}/artifacts", post(jobs::handlers::upload_artifact))
        // Operator surface
        .route("/enroll-tokens", post(agents::handlers::create_enroll_token))
        .route("/agents", get(agents::handlers::list_agents))
        .route("/jobs/{id}", get(jobs::handlers::get_job))
        .route(
            "/runs",
            post(runs::handlers::create_run),
        )
        .route("/runs/{id}", get(runs::handlers::get_run))
        .route("/runs/{id}/execute", post(runs::handlers::execute_run))
        .route("/runs/{id}/findings", get(runs::handlers::list_findings))
}
