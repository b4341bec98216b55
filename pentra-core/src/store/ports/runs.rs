use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use pentra_model::{Run, RunStatistics, RunStatus, TenantId};

use crate::error::Result;

#[async_trait]
pub trait RunsRepository: Send + Sync {
    async fn insert(&self, run: &Run) -> Result<()>;

    async fn get(&self, tenant: &TenantId, id: Uuid) -> Result<Option<Run>>;

    async fn mark_running(
        &self,
        tenant: &TenantId,
        id: Uuid,
        started_at: DateTime<Utc>,
    ) -> Result<()>;

    async fn set_progress(&self, tenant: &TenantId, id: Uuid, progress: i32) -> Result<()>;

    /// Move a run to a terminal status. No-op if the run already left
    /// `running`; finalization must not resurrect a timed-out run.
    async fn finalize(
        &self,
        tenant: &TenantId,
        id: Uuid,
        status: RunStatus,
        statistics: Option<RunStatistics>,
        error_message: Option<String>,
        completed_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Force-fail every run still `running` that started before the cutoff.
    /// Returns the affected run ids. Crosses tenants (monitor task).
    async fn fail_overrunning(
        &self,
        started_before: DateTime<Utc>,
        error_message: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Uuid>>;
}
