//! Job endpoints: progress events, completion, and artifact upload.

use axum::{
    Json,
    extract::{Multipart, Path, State},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use pentra_model::{Artifact, JobStatus};

use crate::AppState;
use crate::errors::{AppError, AppResult};
use crate::middleware::{AuthedAgent, Tenant};

#[derive(Debug, Deserialize)]
pub struct JobEventRequest {
    #[serde(rename = "type", default = "default_event_type")]
    pub event_type: String,
    #[serde(default)]
    pub payload: Value,
}

fn default_event_type() -> String {
    "job.event".to_string()
}

/// `POST /v2/jobs/{id}/events` — append to the job's immutable progress log.
pub async fn append_event(
    State(state): State<AppState>,
    caller: AuthedAgent,
    Path(job_id): Path<Uuid>,
    Json(body): Json<JobEventRequest>,
) -> AppResult<Json<Value>> {
    state
        .queue
        .append_event(&caller.tenant, job_id, &body.event_type, body.payload)
        .await?;
    Ok(Json(json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
pub struct CompleteRequest {
    #[serde(default = "default_complete_status")]
    pub status: String,
    #[serde(default)]
    pub result: Option<Value>,
}

fn default_complete_status() -> String {
    "succeeded".to_string()
}

/// `POST /v2/jobs/{id}/complete` — terminal completion by the leasing agent.
/// 404 for an unknown job, 409 when the caller does not hold the lease.
pub async fn complete(
    State(state): State<AppState>,
    caller: AuthedAgent,
    Path(job_id): Path<Uuid>,
    Json(body): Json<CompleteRequest>,
) -> AppResult<Json<Value>> {
    let status = JobStatus::parse(&body.status)
        .ok_or_else(|| AppError::bad_request(format!("unknown job status `{}`", body.status)))?;

    state
        .queue
        .complete(&caller.tenant, caller.agent.id, job_id, status, body.result)
        .await?;
    Ok(Json(json!({ "ok": true })))
}

/// `POST /v2/jobs/{id}/artifacts` — multipart evidence upload. The blob goes
/// to the evidence directory; only its path is recorded.
pub async fn upload_artifact(
    State(state): State<AppState>,
    caller: AuthedAgent,
    Path(job_id): Path<Uuid>,
    mut multipart: Multipart,
) -> AppResult<Json<Value>> {
    let job = state
        .queue
        .get_job(&caller.tenant, job_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("job {job_id} not found")))?;

    let mut file_name = String::from("artifact.bin");
    let mut content: Option<Vec<u8>> = None;
    let mut label = String::from("evidence");
    let mut kind = String::from("generic");

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::bad_request(format!("bad multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                if let Some(original) = field.file_name() {
                    file_name = sanitize_file_name(original);
                }
                content = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| AppError::bad_request(format!("bad file field: {e}")))?
                        .to_vec(),
                );
            }
            "label" => {
                label = field
                    .text()
                    .await
                    .map_err(|e| AppError::bad_request(format!("bad label field: {e}")))?;
            }
            "kind" => {
                kind = field
                    .text()
                    .await
                    .map_err(|e| AppError::bad_request(format!("bad kind field: {e}")))?;
            }
            _ => {}
        }
    }

    let content = content.ok_or_else(|| AppError::bad_request("missing file field"))?;

    let artifact_id = Uuid::new_v4();
    let stored_name = format!(
        "{}_{}_{}",
        job.run_id,
        &artifact_id.simple().to_string()[..8],
        file_name
    );
    let evidence_dir = &state.config.evidence_dir;
    tokio::fs::create_dir_all(evidence_dir)
        .await
        .map_err(|e| AppError::internal(format!("cannot create evidence dir: {e}")))?;
    let path = evidence_dir.join(&stored_name);
    tokio::fs::write(&path, &content)
        .await
        .map_err(|e| AppError::internal(format!("cannot store artifact: {e}")))?;

    let artifact = Artifact {
        id: artifact_id,
        tenant_id: caller.tenant.clone(),
        run_id: job.run_id,
        job_id: job.id,
        kind,
        label,
        path: path.display().to_string(),
        created_at: Utc::now(),
    };
    state.store.artifacts.insert(&artifact).await?;

    Ok(Json(json!({ "artifact": artifact })))
}

/// `GET /v2/jobs/{id}` — operator job inspection.
pub async fn get_job(
    State(state): State<AppState>,
    Tenant(tenant): Tenant,
    Path(job_id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let job = state
        .queue
        .get_job(&tenant, job_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("job {job_id} not found")))?;
    Ok(Json(serde_json::to_value(job).map_err(|e| AppError::internal(e.to_string()))?))
}

/// `GET /v2/jobs/{id}/events` — the job's progress log, oldest first.
pub async fn list_events(
    State(state): State<AppState>,
    Tenant(tenant): Tenant,
    Path(job_id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let events = state.queue.events(&tenant, job_id).await?;
    Ok(Json(json!({ "events": events })))
}

/// Strip path components an agent might smuggle into a filename.
fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "artifact.bin".to_string()
    } else {
        cleaned
    }
}
