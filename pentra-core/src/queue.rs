//! Job queue and lease manager.
//!
//! Leasing is the one place in the system where correctness depends on true
//! mutual exclusion: the claim is a single atomic compare-and-set in the
//! store adapter, so two concurrent lease calls can never receive the same
//! job. Everything else here is plain bookkeeping.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::Value;
use tokio::sync::Notify;
use tracing::{debug, info};
use uuid::Uuid;

use pentra_model::{Agent, Job, JobEvent, JobStatus, TenantId};

use crate::error::{CoreError, Result};
use crate::store::Store;

#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// How long one lease claim lasts before the stuck-job monitor may
    /// reclaim it.
    pub lease_duration: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            lease_duration: Duration::minutes(5),
        }
    }
}

#[derive(Clone)]
pub struct JobQueue {
    store: Store,
    config: QueueConfig,
    /// Pinged on every terminal completion so run watchers can react ahead
    /// of their next poll tick.
    completions: Arc<Notify>,
}

impl JobQueue {
    pub fn new(store: Store, config: QueueConfig) -> Self {
        Self {
            store,
            config,
            completions: Arc::new(Notify::new()),
        }
    }

    pub fn completion_signal(&self) -> Arc<Notify> {
        self.completions.clone()
    }

    pub async fn enqueue(
        &self,
        tenant: &TenantId,
        run_id: Uuid,
        adapter: &str,
        params: Value,
    ) -> Result<Job> {
        let job = Job::new(tenant.clone(), run_id, adapter, params);
        self.store.jobs.insert(&job).await?;
        debug!(tenant = %tenant, job_id = %job.id, adapter, "job queued");
        Ok(job)
    }

    /// Claim the oldest queued job for this tenant, optionally filtered by
    /// the agent's capability kinds. `None` means nothing available (HTTP
    /// 204, not an error).
    pub async fn lease(
        &self,
        tenant: &TenantId,
        agent: &Agent,
        kinds: Option<&[String]>,
    ) -> Result<Option<Job>> {
        let lease_expires_at = Utc::now() + self.config.lease_duration;
        let job = self
            .store
            .jobs
            .claim_next_queued(tenant, agent.id, kinds, lease_expires_at)
            .await?;

        if let Some(job) = &job {
            info!(tenant = %tenant, job_id = %job.id, agent_id = %agent.id, "job leased");
        }
        Ok(job)
    }

    /// Terminal completion by the leasing agent. 409s when the caller does
    /// not hold the lease (e.g. it was reclaimed after going stuck).
    pub async fn complete(
        &self,
        tenant: &TenantId,
        agent_id: Uuid,
        job_id: Uuid,
        status: JobStatus,
        result: Option<Value>,
    ) -> Result<Job> {
        if !status.is_terminal() {
            return Err(CoreError::Invalid(format!(
                "completion status must be terminal, got `{}`",
                status.as_str()
            )));
        }

        let job = self
            .store
            .jobs
            .complete(tenant, job_id, agent_id, status, result)
            .await?;

        info!(tenant = %tenant, job_id = %job.id, status = status.as_str(), "job completed");
        self.completions.notify_waiters();
        Ok(job)
    }

    /// Append to the job's immutable progress log. Never touches job status.
    pub async fn append_event(
        &self,
        tenant: &TenantId,
        job_id: Uuid,
        event_type: &str,
        payload: Value,
    ) -> Result<JobEvent> {
        let event = JobEvent {
            id: Uuid::new_v4(),
            tenant_id: tenant.clone(),
            job_id,
            event_type: event_type.to_string(),
            payload,
            created_at: Utc::now(),
        };
        self.store.jobs.append_event(&event).await?;
        Ok(event)
    }

    pub async fn get_job(&self, tenant: &TenantId, job_id: Uuid) -> Result<Option<Job>> {
        self.store.jobs.get(tenant, job_id).await
    }

    pub async fn events(&self, tenant: &TenantId, job_id: Uuid) -> Result<Vec<JobEvent>> {
        self.store.jobs.events_for(tenant, job_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pentra_model::AgentStatus;
    use serde_json::json;

    fn test_agent(tenant: &TenantId, kind: &str) -> Agent {
        Agent {
            id: Uuid::new_v4(),
            tenant_id: tenant.clone(),
            name: format!("{kind}-agent"),
            kind: kind.to_string(),
            status: AgentStatus::Online,
            agent_key_hash: String::new(),
            last_seen: Utc::now(),
            created_at: Utc::now(),
        }
    }

    fn queue() -> JobQueue {
        JobQueue::new(Store::memory(), QueueConfig::default())
    }

    #[tokio::test]
    async fn lease_returns_oldest_queued_job() {
        let queue = queue();
        let tenant = TenantId::from("t1");
        let run_id = Uuid::new_v4();
        let agent = test_agent(&tenant, "nmap");

        let first = queue
            .enqueue(&tenant, run_id, "nmap_default", json!({"target": "a"}))
            .await
            .unwrap();
        queue
            .enqueue(&tenant, run_id, "nmap_default", json!({"target": "b"}))
            .await
            .unwrap();

        let leased = queue.lease(&tenant, &agent, None).await.unwrap().unwrap();
        assert_eq!(leased.id, first.id);
        assert_eq!(leased.status, JobStatus::Leased);
        assert_eq!(leased.leased_by, Some(agent.id));
        assert!(leased.lease_expires_at.is_some());
    }

    #[tokio::test]
    async fn lease_respects_kind_filter() {
        let queue = queue();
        let tenant = TenantId::from("t1");
        let run_id = Uuid::new_v4();
        let agent = test_agent(&tenant, "zap");

        queue
            .enqueue(&tenant, run_id, "nmap_default", json!({}))
            .await
            .unwrap();
        let zap_job = queue
            .enqueue(&tenant, run_id, "zap_baseline", json!({}))
            .await
            .unwrap();

        let kinds = vec!["zap".to_string()];
        let leased = queue
            .lease(&tenant, &agent, Some(&kinds))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(leased.id, zap_job.id);

        // Nothing else matches that kind.
        assert!(
            queue
                .lease(&tenant, &agent, Some(&kinds))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn lease_is_tenant_scoped() {
        let queue = queue();
        let t1 = TenantId::from("t1");
        let t2 = TenantId::from("t2");
        let agent = test_agent(&t2, "nmap");

        queue
            .enqueue(&t1, Uuid::new_v4(), "nmap_default", json!({}))
            .await
            .unwrap();

        assert!(queue.lease(&t2, &agent, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_leases_never_share_a_job() {
        let queue = queue();
        let tenant = TenantId::from("t1");
        let run_id = Uuid::new_v4();

        for idx in 0..4 {
            queue
                .enqueue(&tenant, run_id, "nmap_default", json!({"idx": idx}))
                .await
                .unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..8 {
            let queue = queue.clone();
            let tenant = tenant.clone();
            let agent = test_agent(&tenant, "nmap");
            handles.push(tokio::spawn(async move {
                queue.lease(&tenant, &agent, None).await.unwrap()
            }));
        }

        let mut leased_ids = Vec::new();
        for handle in handles {
            if let Some(job) = handle.await.unwrap() {
                leased_ids.push(job.id);
            }
        }

        // Four jobs, eight claimers: exactly four grants, all distinct.
        assert_eq!(leased_ids.len(), 4);
        leased_ids.sort();
        leased_ids.dedup();
        assert_eq!(leased_ids.len(), 4);
    }

    #[tokio::test]
    async fn complete_requires_lease_ownership() {
        let queue = queue();
        let tenant = TenantId::from("t1");
        let agent = test_agent(&tenant, "nmap");
        let other = test_agent(&tenant, "nmap");

        queue
            .enqueue(&tenant, Uuid::new_v4(), "nmap_default", json!({}))
            .await
            .unwrap();
        let job = queue.lease(&tenant, &agent, None).await.unwrap().unwrap();

        let conflict = queue
            .complete(&tenant, other.id, job.id, JobStatus::Succeeded, None)
            .await;
        assert!(matches!(conflict, Err(CoreError::LeaseConflict(_))));

        let done = queue
            .complete(
                &tenant,
                agent.id,
                job.id,
                JobStatus::Succeeded,
                Some(json!({"output": "ok"})),
            )
            .await
            .unwrap();
        assert_eq!(done.status, JobStatus::Succeeded);
    }

    #[tokio::test]
    async fn complete_rejects_non_terminal_status() {
        let queue = queue();
        let tenant = TenantId::from("t1");
        let agent = test_agent(&tenant, "nmap");

        queue
            .enqueue(&tenant, Uuid::new_v4(), "nmap_default", json!({}))
            .await
            .unwrap();
        let job = queue.lease(&tenant, &agent, None).await.unwrap().unwrap();

        let bad = queue
            .complete(&tenant, agent.id, job.id, JobStatus::Running, None)
            .await;
        assert!(matches!(bad, Err(CoreError::Invalid(_))));
    }

    #[tokio::test]
    async fn events_append_without_changing_status() {
        let queue = queue();
        let tenant = TenantId::from("t1");
        let agent = test_agent(&tenant, "nmap");

        queue
            .enqueue(&tenant, Uuid::new_v4(), "nmap_default", json!({}))
            .await
            .unwrap();
        let job = queue.lease(&tenant, &agent, None).await.unwrap().unwrap();

        queue
            .append_event(&tenant, job.id, "job.progress", json!({"pct": 40}))
            .await
            .unwrap();
        queue
            .append_event(&tenant, job.id, "job.progress", json!({"pct": 80}))
            .await
            .unwrap();

        let events = queue.events(&tenant, job.id).await.unwrap();
        assert_eq!(events.len(), 2);
        let unchanged = queue.get_job(&tenant, job.id).await.unwrap().unwrap();
        assert_eq!(unchanged.status, JobStatus::Leased);

        let missing = queue
            .append_event(&tenant, Uuid::new_v4(), "job.progress", json!({}))
            .await;
        assert!(matches!(missing, Err(CoreError::NotFound(_))));
    }
}
