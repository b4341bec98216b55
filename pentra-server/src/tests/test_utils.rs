//! Shared fixtures for HTTP-level tests: a memory-backed app instance plus
//! enrollment helpers.

use std::path::PathBuf;
use std::time::Duration;

use axum_test::TestServer;
use serde_json::{Value, json};

use pentra_core::runs::RunCoordinatorConfig;
use pentra_core::store::Store;

use crate::infra::config::{Config, ProviderConfig, ServerConfig};
use crate::{AppState, routes};

pub const TENANT: &str = "t1";

pub fn test_config(evidence_dir: PathBuf) -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        database_url: String::new(),
        evidence_dir,
        provider: ProviderConfig {
            kind: "heuristic".to_string(),
            base_url: String::new(),
            api_key: String::new(),
            model: String::new(),
        },
    }
}

pub fn test_app() -> (TestServer, AppState, tempfile::TempDir) {
    let evidence = tempfile::tempdir().expect("tempdir");
    let state = AppState::with_run_coordinator_config(
        Store::memory(),
        test_config(evidence.path().to_path_buf()),
        RunCoordinatorConfig {
            poll_period: Duration::from_millis(20),
            completion_timeout: Duration::from_secs(10),
        },
    );
    let server = TestServer::new(routes::create_router(state.clone())).expect("test server");
    (server, state, evidence)
}

/// Enroll and register one agent, returning `(agent_id, agent_key)`.
pub async fn register_agent(server: &TestServer, kind: &str) -> (String, String) {
    let token_response = server
        .post("/v2/enroll-tokens")
        .add_header("x-tenant-id", TENANT)
        .json(&json!({ "name": "test-agent" }))
        .await;
    token_response.assert_status_ok();
    let token = token_response.json::<Value>()["token"]
        .as_str()
        .expect("raw token")
        .to_string();

    let register_response = server
        .post("/v2/agents/register")
        .add_header("x-tenant-id", TENANT)
        .json(&json!({ "enroll_token": token, "name": "test-agent", "kind": kind }))
        .await;
    register_response.assert_status_ok();
    let body = register_response.json::<Value>();
    (
        body["agent_id"].as_str().expect("agent_id").to_string(),
        body["agent_key"].as_str().expect("agent_key").to_string(),
    )
}
