use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::TenantId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "queued" => Some(RunStatus::Queued),
            "running" => Some(RunStatus::Running),
            "completed" => Some(RunStatus::Completed),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }
}

/// Aggregate job counts computed when a run reaches full terminality.
///
/// `completed + failed + cancelled == total` always holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatistics {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

/// One execution of a test plan, decomposed into jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub plan_id: Uuid,
    pub engagement_id: Uuid,
    pub status: RunStatus,
    /// 0..=100, advanced as jobs reach terminal states.
    pub progress: i32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub statistics: Option<RunStatistics>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Run {
    pub fn new(tenant_id: TenantId, plan_id: Uuid, engagement_id: Uuid) -> Self {
        Run {
            id: Uuid::new_v4(),
            tenant_id,
            plan_id,
            engagement_id,
            status: RunStatus::Queued,
            progress: 0,
            started_at: None,
            completed_at: None,
            statistics: None,
            error_message: None,
            created_at: Utc::now(),
        }
    }
}
