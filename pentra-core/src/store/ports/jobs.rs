use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use pentra_model::{Job, JobEvent, JobStatus, TenantId};

use crate::error::Result;

/// Outcome of one stuck-job sweep.
#[derive(Debug, Default, Clone)]
pub struct StuckSweep {
    /// Jobs reset to `queued` with `attempts` incremented.
    pub requeued: Vec<Uuid>,
    /// Jobs that hit their retry budget and went terminal `failed`.
    pub failed: Vec<Uuid>,
}

// Job queue storage. `claim_next_queued` is the one operation whose
// correctness depends on true mutual exclusion; both adapters implement it as
// a single atomic claim.
#[async_trait]
pub trait JobsRepository: Send + Sync {
    async fn insert(&self, job: &Job) -> Result<()>;

    async fn get(&self, tenant: &TenantId, id: Uuid) -> Result<Option<Job>>;

    /// Atomically claim the oldest queued job for the tenant, optionally
    /// restricted to adapter kinds. Two concurrent calls can never receive
    /// the same job. `None` when nothing is available.
    async fn claim_next_queued(
        &self,
        tenant: &TenantId,
        agent_id: Uuid,
        kinds: Option<&[String]>,
        lease_expires_at: DateTime<Utc>,
    ) -> Result<Option<Job>>;

    /// Terminal completion by the leasing agent. Fails with `NotFound` for an
    /// unknown job and `LeaseConflict` when the caller does not hold the
    /// lease.
    async fn complete(
        &self,
        tenant: &TenantId,
        id: Uuid,
        agent_id: Uuid,
        status: JobStatus,
        result: Option<Value>,
    ) -> Result<Job>;

    async fn for_run(&self, tenant: &TenantId, run_id: Uuid) -> Result<Vec<Job>>;

    /// Reset jobs leased past `stuck_before` back to `queued` (attempts + 1),
    /// failing any that exhausted `max_attempts`. Crosses tenants: the
    /// monitor is a system-scoped task.
    async fn sweep_stuck(&self, stuck_before: DateTime<Utc>) -> Result<StuckSweep>;

    async fn append_event(&self, event: &JobEvent) -> Result<()>;

    async fn events_for(&self, tenant: &TenantId, job_id: Uuid) -> Result<Vec<JobEvent>>;
}
