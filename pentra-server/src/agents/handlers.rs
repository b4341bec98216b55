//! Agent bus: enrollment, registration, heartbeat, and job leasing.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Duration;
use serde::Deserialize;
use serde_json::json;

use crate::AppState;
use crate::errors::AppResult;
use crate::middleware::{AuthedAgent, Tenant};

#[derive(Debug, Deserialize)]
pub struct CreateEnrollTokenRequest {
    #[serde(default = "default_token_name")]
    pub name: String,
    #[serde(default = "default_token_ttl_days")]
    pub expires_in_days: i64,
}

fn default_token_name() -> String {
    "agent".to_string()
}

fn default_token_ttl_days() -> i64 {
    30
}

/// `POST /v2/enroll-tokens` — mint a single-use enrollment token. The raw
/// token appears in this response and nowhere else.
pub async fn create_enroll_token(
    State(state): State<AppState>,
    Tenant(tenant): Tenant,
    Json(body): Json<CreateEnrollTokenRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let (id, token) = state
        .registry
        .create_enroll_token(&tenant, &body.name, Duration::days(body.expires_in_days))
        .await?;
    Ok(Json(json!({ "id": id, "token": token })))
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub enroll_token: String,
    #[serde(default = "default_token_name")]
    pub name: String,
    #[serde(default = "default_agent_kind")]
    pub kind: String,
}

fn default_agent_kind() -> String {
    "cross_platform".to_string()
}

/// `POST /v2/agents/register` — exchange an enrollment token for agent
/// credentials. 401 for an unknown, expired, or already-consumed token.
pub async fn register(
    State(state): State<AppState>,
    Tenant(tenant): Tenant,
    Json(body): Json<RegisterRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let (agent_id, agent_key) = state
        .registry
        .register(&tenant, &body.enroll_token, &body.name, &body.kind)
        .await?;
    Ok(Json(json!({ "agent_id": agent_id, "agent_key": agent_key })))
}

/// `POST /v2/agents/heartbeat` — liveness. Authentication already bumped
/// `last_seen`, so there is nothing left to do.
pub async fn heartbeat(_agent: AuthedAgent) -> Json<serde_json::Value> {
    Json(json!({ "ok": true }))
}

#[derive(Debug, Default, Deserialize)]
pub struct LeaseRequest {
    #[serde(default)]
    pub kinds: Option<Vec<String>>,
}

/// `POST /v2/agents/lease` — claim the oldest queued job for this tenant,
/// optionally filtered by adapter kind. 204 when nothing is available.
pub async fn lease(
    State(state): State<AppState>,
    caller: AuthedAgent,
    body: Option<Json<LeaseRequest>>,
) -> AppResult<Response> {
    let kinds = body.and_then(|Json(body)| body.kinds);

    let job = state
        .queue
        .lease(&caller.tenant, &caller.agent, kinds.as_deref())
        .await?;

    Ok(match job {
        Some(job) => Json(json!({
            "id": job.id,
            "adapter": job.adapter,
            "params": job.params,
            "run_id": job.run_id,
        }))
        .into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

/// `GET /v2/agents` — operator-facing fleet listing.
pub async fn list_agents(
    State(state): State<AppState>,
    Tenant(tenant): Tenant,
) -> AppResult<Json<serde_json::Value>> {
    let agents = state.registry.list_agents(&tenant).await?;
    Ok(Json(json!({ "agents": agents })))
}
