use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::command::CommandRecord;
use crate::context::{DiscoveredService, ExploitRecord, IdentifiedVulnerability};
use crate::finding::Severity;

/// Overall engagement risk, derived from what was actually found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Critical => "CRITICAL",
            RiskLevel::High => "HIGH",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::Low => "LOW",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub overall_risk: RiskLevel,
    pub critical_findings: usize,
    pub high_findings: usize,
    pub exploitable_vulnerabilities: usize,
}

/// Flattened finding row in a synthesized report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportFinding {
    pub title: String,
    pub severity: Severity,
    pub description: String,
    pub evidence: Value,
    pub estimated_score: f64,
}

/// Final output of one orchestration session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PentestReport {
    pub engagement_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub test_duration_secs: Option<i64>,
    pub executive_summary: String,
    pub risk: RiskAssessment,
    pub services_discovered: Vec<DiscoveredService>,
    pub vulnerabilities: Vec<IdentifiedVulnerability>,
    pub successful_exploits: Vec<ExploitRecord>,
    pub credentials_compromised: usize,
    pub findings: Vec<ReportFinding>,
    pub command_log: Vec<CommandRecord>,
}
