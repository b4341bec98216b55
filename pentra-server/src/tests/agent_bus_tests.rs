//! HTTP behavior of the agent bus: enrollment, credentials, leasing, and
//! completion conflicts.

use axum::http::StatusCode;
use serde_json::{Value, json};

use super::test_utils::{TENANT, register_agent, test_app};

#[tokio::test]
async fn register_with_invalid_token_is_401() {
    let (server, _, _evidence) = test_app();

    let response = server
        .post("/v2/agents/register")
        .add_header("x-tenant-id", TENANT)
        .json(&json!({ "enroll_token": "bogus" }))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn enroll_token_is_single_use_over_http() {
    let (server, _, _evidence) = test_app();

    let token = server
        .post("/v2/enroll-tokens")
        .add_header("x-tenant-id", TENANT)
        .json(&json!({}))
        .await
        .json::<Value>()["token"]
        .as_str()
        .unwrap()
        .to_string();

    let first = server
        .post("/v2/agents/register")
        .add_header("x-tenant-id", TENANT)
        .json(&json!({ "enroll_token": token }))
        .await;
    first.assert_status_ok();

    let second = server
        .post("/v2/agents/register")
        .add_header("x-tenant-id", TENANT)
        .json(&json!({ "enroll_token": token }))
        .await;
    second.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn missing_tenant_header_is_400() {
    let (server, _, _evidence) = test_app();

    let response = server
        .post("/v2/agents/register")
        .json(&json!({ "enroll_token": "x" }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn heartbeat_requires_valid_credentials() {
    let (server, _, _evidence) = test_app();
    let (agent_id, agent_key) = register_agent(&server, "nmap").await;

    let ok = server
        .post("/v2/agents/heartbeat")
        .add_header("x-tenant-id", TENANT)
        .add_header("x-agent-id", agent_id.as_str())
        .add_header("x-agent-key", agent_key.as_str())
        .await;
    ok.assert_status_ok();
    assert_eq!(ok.json::<Value>()["ok"], json!(true));

    let bad_key = server
        .post("/v2/agents/heartbeat")
        .add_header("x-tenant-id", TENANT)
        .add_header("x-agent-id", agent_id.as_str())
        .add_header("x-agent-key", "wrong")
        .await;
    bad_key.assert_status(StatusCode::UNAUTHORIZED);

    let wrong_tenant = server
        .post("/v2/agents/heartbeat")
        .add_header("x-tenant-id", "t2")
        .add_header("x-agent-id", agent_id.as_str())
        .add_header("x-agent-key", agent_key.as_str())
        .await;
    wrong_tenant.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn lease_returns_204_when_queue_is_empty() {
    let (server, _, _evidence) = test_app();
    let (agent_id, agent_key) = register_agent(&server, "nmap").await;

    let response = server
        .post("/v2/agents/lease")
        .add_header("x-tenant-id", TENANT)
        .add_header("x-agent-id", agent_id.as_str())
        .add_header("x-agent-key", agent_key.as_str())
        .json(&json!({}))
        .await;
    response.assert_status(StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn complete_on_unknown_job_is_404() {
    let (server, _, _evidence) = test_app();
    let (agent_id, agent_key) = register_agent(&server, "nmap").await;

    let response = server
        .post(&format!(
            "/v2/jobs/{}/complete",
            uuid::Uuid::new_v4()
        ))
        .add_header("x-tenant-id", TENANT)
        .add_header("x-agent-id", agent_id.as_str())
        .add_header("x-agent-key", agent_key.as_str())
        .json(&json!({ "status": "succeeded" }))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn events_on_unknown_job_is_404() {
    let (server, _, _evidence) = test_app();
    let (agent_id, agent_key) = register_agent(&server, "nmap").await;

    let response = server
        .post(&format!("/v2/jobs/{}/events", uuid::Uuid::new_v4()))
        .add_header("x-tenant-id", TENANT)
        .add_header("x-agent-id", agent_id.as_str())
        .add_header("x-agent-key", agent_key.as_str())
        .json(&json!({ "type": "job.progress", "payload": {"pct": 10} }))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn completing_a_job_leased_by_someone_else_is_409() {
    let (server, _, _evidence) = test_app();
    let (owner_id, owner_key) = register_agent(&server, "nmap").await;
    let (thief_id, thief_key) = register_agent(&server, "nmap").await;

    let run = server
        .post("/v2/runs")
        .add_header("x-tenant-id", TENANT)
        .json(&json!({}))
        .await
        .json::<Value>();
    let run_id = run["id"].as_str().unwrap();
    server
        .post(&format!("/v2/runs/{run_id}/execute"))
        .add_header("x-tenant-id", TENANT)
        .json(&json!({ "steps": [{ "adapter": "nmap_default", "params": {} }] }))
        .await
        .assert_status_ok();

    let leased = server
        .post("/v2/agents/lease")
        .add_header("x-tenant-id", TENANT)
        .add_header("x-agent-id", owner_id.as_str())
        .add_header("x-agent-key", owner_key.as_str())
        .json(&json!({}))
        .await
        .json::<Value>();
    let job_id = leased["id"].as_str().unwrap();

    let conflict = server
        .post(&format!("/v2/jobs/{job_id}/complete"))
        .add_header("x-tenant-id", TENANT)
        .add_header("x-agent-id", thief_id.as_str())
        .add_header("x-agent-key", thief_key.as_str())
        .json(&json!({ "status": "succeeded" }))
        .await;
    conflict.assert_status(StatusCode::CONFLICT);

    let ok = server
        .post(&format!("/v2/jobs/{job_id}/complete"))
        .add_header("x-tenant-id", TENANT)
        .add_header("x-agent-id", owner_id.as_str())
        .add_header("x-agent-key", owner_key.as_str())
        .json(&json!({ "status": "succeeded", "result": {"output": "done"} }))
        .await;
    ok.assert_status_ok();
}

#[tokio::test]
async fn lease_filters_by_agent_kind() {
    let (server, _, _evidence) = test_app();
    let (zap_id, zap_key) = register_agent(&server, "zap").await;

    let run = server
        .post("/v2/runs")
        .add_header("x-tenant-id", TENANT)
        .json(&json!({}))
        .await
        .json::<Value>();
    let run_id = run["id"].as_str().unwrap();
    server
        .post(&format!("/v2/runs/{run_id}/execute"))
        .add_header("x-tenant-id", TENANT)
        .json(&json!({ "steps": [
            { "adapter": "nmap_default", "params": {} },
            { "adapter": "zap_baseline", "params": {} },
        ]}))
        .await
        .assert_status_ok();

    let leased = server
        .post("/v2/agents/lease")
        .add_header("x-tenant-id", TENANT)
        .add_header("x-agent-id", zap_id.as_str())
        .add_header("x-agent-key", zap_key.as_str())
        .json(&json!({ "kinds": ["zap"] }))
        .await
        .json::<Value>();
    assert_eq!(leased["adapter"], json!("zap_baseline"));
}
