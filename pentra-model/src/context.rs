use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::command::CommandRecord;
use crate::phase::TestPhase;

/// Scope and targets for one orchestration session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetInfo {
    pub targets: Vec<String>,
    #[serde(default)]
    pub scope: Map<String, Value>,
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub discovered_domains: Vec<String>,
}

/// Open port/service discovered during reconnaissance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredService {
    pub port: u16,
    pub protocol: String,
    pub state: String,
    pub service: String,
}

/// Vulnerability record parsed from scanner output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifiedVulnerability {
    pub template: String,
    pub severity: String,
    pub host: String,
    pub matched_at: Option<String>,
    #[serde(default)]
    pub info: Map<String, Value>,
}

/// Evidence of a successful exploitation attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExploitRecord {
    pub timestamp: DateTime<Utc>,
    pub target: Option<String>,
    pub exploit: String,
    /// Tool output truncated to 500 chars; full output lives in job results.
    pub result: String,
}

/// Credential material harvested post-exploitation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub kind: String,
    pub username: String,
    pub credential: String,
    pub source: String,
}

/// Mutable working state of one orchestration session.
///
/// Owned exclusively by its phase orchestrator for the lifetime of the
/// session; never shared across concurrent orchestrations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PentestContext {
    pub engagement_id: Uuid,
    pub current_phase: TestPhase,
    pub target_info: TargetInfo,
    #[serde(default)]
    pub discovered_services: Vec<DiscoveredService>,
    #[serde(default)]
    pub identified_vulnerabilities: Vec<IdentifiedVulnerability>,
    #[serde(default)]
    pub successful_exploits: Vec<ExploitRecord>,
    #[serde(default)]
    pub credentials_found: Vec<CredentialRecord>,
    #[serde(default)]
    pub command_history: Vec<CommandRecord>,
}

impl PentestContext {
    pub fn new(engagement_id: Uuid, targets: Vec<String>, scope: Map<String, Value>) -> Self {
        PentestContext {
            engagement_id,
            current_phase: TestPhase::Reconnaissance,
            target_info: TargetInfo {
                targets,
                scope,
                start_time: Some(Utc::now()),
                discovered_domains: Vec::new(),
            },
            discovered_services: Vec::new(),
            identified_vulnerabilities: Vec::new(),
            successful_exploits: Vec::new(),
            credentials_found: Vec::new(),
            command_history: Vec::new(),
        }
    }

    /// Append to the audit trail. There is deliberately no way to remove or
    /// rewrite entries.
    pub fn log_command(&mut self, record: CommandRecord) {
        self.command_history.push(record);
    }

    /// Compact summary used when building provider prompts.
    pub fn summary_counts(&self) -> (usize, usize, usize, usize) {
        (
            self.discovered_services.len(),
            self.identified_vulnerabilities.len(),
            self.successful_exploits.len(),
            self.credentials_found.len(),
        )
    }
}
