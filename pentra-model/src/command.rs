use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::phase::TestPhase;

fn default_timeout_secs() -> u64 {
    300
}

fn default_requires_output() -> bool {
    true
}

/// Command the decision provider wants executed on an agent.
///
/// Ephemeral value object; it only survives as a `CommandRecord` in the
/// session's command history once dispatched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCommand {
    #[serde(default)]
    pub agent_id: Option<Uuid>,
    /// Maps onto the job adapter, e.g. `nmap_default`.
    pub command_type: String,
    /// Human-readable command line for the audit trail and parsers.
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_requires_output")]
    pub requires_output: bool,
    pub phase: TestPhase,
}

/// Decision returned by a provider for one orchestrator iteration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Decision {
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub next_commands: Vec<AgentCommand>,
    #[serde(default)]
    pub phase_transition: Option<String>,
    #[serde(default)]
    pub findings_analysis: Option<String>,
    #[serde(default)]
    pub risk_assessment: Option<String>,
}

/// Test-plan response from a provider's `plan` call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanResponse {
    #[serde(default)]
    pub selected_tests: Vec<String>,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default)]
    pub explanation: String,
}

/// One entry of the append-only command audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRecord {
    pub timestamp: DateTime<Utc>,
    pub phase: TestPhase,
    pub command: String,
    pub agent: Option<Uuid>,
    pub result: Value,
}
