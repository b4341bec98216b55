use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::ids::TenantId;

/// Lifecycle of a queued unit of agent work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Leased,
    Running,
    Succeeded,
    Failed,
    Aborted,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Aborted
        )
    }

    /// Statuses under an active lease. Jobs in these states have exactly one
    /// owning agent.
    pub fn is_leased(&self) -> bool {
        matches!(self, JobStatus::Leased | JobStatus::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Leased => "leased",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Aborted => "aborted",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "queued" => Some(JobStatus::Queued),
            "leased" => Some(JobStatus::Leased),
            "running" => Some(JobStatus::Running),
            "succeeded" => Some(JobStatus::Succeeded),
            "failed" => Some(JobStatus::Failed),
            "aborted" => Some(JobStatus::Aborted),
            _ => None,
        }
    }
}

/// A unit of work placed on the queue for exactly one agent to execute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub run_id: Uuid,
    /// Adapter name, e.g. `nmap_default`, `nuclei_default`, `zap_baseline`.
    pub adapter: String,
    pub params: Value,
    pub status: JobStatus,
    pub leased_by: Option<Uuid>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub attempts: i32,
    pub max_attempts: i32,
    pub result: Option<Value>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;

impl Job {
    pub fn new(tenant_id: TenantId, run_id: Uuid, adapter: impl Into<String>, params: Value) -> Self {
        Job {
            id: Uuid::new_v4(),
            tenant_id,
            run_id,
            adapter: adapter.into(),
            params,
            status: JobStatus::Queued,
            leased_by: None,
            lease_expires_at: None,
            attempts: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            result: None,
            error_message: None,
            created_at: Utc::now(),
        }
    }
}

/// Immutable progress-log entry attached to a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEvent {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub job_id: Uuid,
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

/// Capability class implied by an adapter name.
///
/// `semgrep_default` → `semgrep`, `zap_baseline` → `zap`. Used when an agent
/// leases with a `kinds` filter.
pub fn adapter_kind(adapter: &str) -> &str {
    let kind = adapter.split('_').next().unwrap_or("");
    kind
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_kind_strips_variant_suffix() {
        assert_eq!(adapter_kind("semgrep_default"), "semgrep");
        assert_eq!(adapter_kind("zap_baseline"), "zap");
        assert_eq!(adapter_kind("nmap"), "nmap");
        assert_eq!(adapter_kind(""), "");
    }

    #[test]
    fn terminal_statuses() {
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Aborted.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Leased.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
    }
}
