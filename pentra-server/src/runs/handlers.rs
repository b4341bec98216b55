//! Operator run endpoints.
//!
//! Plan decomposition happens upstream (engagement/plan services are
//! external collaborators); execution receives already-resolved steps.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use pentra_core::runs::PlanStep;

use crate::AppState;
use crate::errors::{AppError, AppResult};
use crate::middleware::Tenant;

#[derive(Debug, Deserialize)]
pub struct CreateRunRequest {
    pub plan_id: Option<Uuid>,
    pub engagement_id: Option<Uuid>,
}

/// `POST /v2/runs` — create a queued run.
pub async fn create_run(
    State(state): State<AppState>,
    Tenant(tenant): Tenant,
    Json(body): Json<CreateRunRequest>,
) -> AppResult<Json<Value>> {
    let run = state
        .run_coordinator
        .create_run(
            &tenant,
            body.plan_id.unwrap_or_else(Uuid::new_v4),
            body.engagement_id.unwrap_or_else(Uuid::new_v4),
        )
        .await?;
    Ok(Json(serde_json::to_value(run).map_err(|e| AppError::internal(e.to_string()))?))
}

#[derive(Debug, Deserialize)]
pub struct StepRequest {
    pub adapter: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Deserialize)]
pub struct ExecuteRunRequest {
    pub steps: Vec<StepRequest>,
}

/// `POST /v2/runs/{id}/execute` — enqueue one job per step and start the
/// completion watcher.
pub async fn execute_run(
    State(state): State<AppState>,
    Tenant(tenant): Tenant,
    Path(run_id): Path<Uuid>,
    Json(body): Json<ExecuteRunRequest>,
) -> AppResult<Json<Value>> {
    if body.steps.is_empty() {
        return Err(AppError::bad_request("a run needs at least one step"));
    }
    let steps = body
        .steps
        .into_iter()
        .map(|step| PlanStep {
            adapter: step.adapter,
            params: step.params,
        })
        .collect();

    // The watcher owns itself; the handle is only needed by tests.
    let _watcher = state
        .run_coordinator
        .start_run(&tenant, run_id, steps)
        .await?;
    Ok(Json(json!({ "ok": true })))
}

/// `GET /v2/runs/{id}`
pub async fn get_run(
    State(state): State<AppState>,
    Tenant(tenant): Tenant,
    Path(run_id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let run = state
        .store
        .runs
        .get(&tenant, run_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("run {run_id} not found")))?;
    Ok(Json(serde_json::to_value(run).map_err(|e| AppError::internal(e.to_string()))?))
}

/// `GET /v2/runs/{id}/findings`
pub async fn list_findings(
    State(state): State<AppState>,
    Tenant(tenant): Tenant,
    Path(run_id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let findings = state.store.findings.for_run(&tenant, run_id).await?;
    Ok(Json(json!({ "findings": findings })))
}
