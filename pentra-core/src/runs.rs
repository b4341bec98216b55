//! Run lifecycle coordination.
//!
//! A run is decomposed into one job per plan step at start, then watched
//! until every child job is terminal (or the completion ceiling elapses).
//! On full terminality the watcher rolls job results up into statistics and
//! findings.

use std::time::Duration as StdDuration;

use chrono::Utc;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use pentra_model::{Finding, Job, JobStatus, Run, RunStatistics, RunStatus, Severity, TenantId};

use crate::error::{CoreError, Result};
use crate::queue::JobQueue;
use crate::store::Store;

#[derive(Debug, Clone)]
pub struct RunCoordinatorConfig {
    pub poll_period: StdDuration,
    /// Hard ceiling on how long a watcher waits for full terminality.
    pub completion_timeout: StdDuration,
}

impl Default for RunCoordinatorConfig {
    fn default() -> Self {
        Self {
            poll_period: StdDuration::from_secs(10),
            completion_timeout: StdDuration::from_secs(3600),
        }
    }
}

/// One step of an execution plan, already resolved to an adapter call.
#[derive(Debug, Clone)]
pub struct PlanStep {
    pub adapter: String,
    pub params: Value,
}

#[derive(Clone)]
pub struct RunCoordinator {
    store: Store,
    queue: JobQueue,
    config: RunCoordinatorConfig,
    cancel: CancellationToken,
}

impl RunCoordinator {
    pub fn new(
        store: Store,
        queue: JobQueue,
        config: RunCoordinatorConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            queue,
            config,
            cancel,
        }
    }

    pub async fn create_run(
        &self,
        tenant: &TenantId,
        plan_id: Uuid,
        engagement_id: Uuid,
    ) -> Result<Run> {
        let run = Run::new(tenant.clone(), plan_id, engagement_id);
        self.store.runs.insert(&run).await?;
        Ok(run)
    }

    /// Enqueue one job per plan step, move the run to `running`, and spawn
    /// its completion watcher.
    pub async fn start_run(
        &self,
        tenant: &TenantId,
        run_id: Uuid,
        steps: Vec<PlanStep>,
    ) -> Result<JoinHandle<()>> {
        let run = self
            .store
            .runs
            .get(tenant, run_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("run {run_id} not found")))?;
        if run.status != RunStatus::Queued {
            return Err(CoreError::Invalid(format!(
                "run {run_id} already started (status `{}`)",
                run.status.as_str()
            )));
        }

        for step in &steps {
            self.queue
                .enqueue(tenant, run_id, &step.adapter, step.params.clone())
                .await?;
        }
        self.store
            .runs
            .mark_running(tenant, run_id, Utc::now())
            .await?;
        info!(tenant = %tenant, run_id = %run_id, steps = steps.len(), "run started");

        let coordinator = self.clone();
        let tenant = tenant.clone();
        Ok(tokio::spawn(async move {
            coordinator.watch_completion(tenant, run_id).await;
        }))
    }

    /// Poll until every job for the run is terminal, woken early by job
    /// completions. Past the ceiling the run is forced to `failed`.
    async fn watch_completion(&self, tenant: TenantId, run_id: Uuid) {
        let deadline = tokio::time::Instant::now() + self.config.completion_timeout;
        let completions = self.queue.completion_signal();

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep_until(deadline) => {
                    warn!(run_id = %run_id, "run timed out waiting for job completion");
                    if let Err(e) = self
                        .store
                        .runs
                        .finalize(
                            &tenant,
                            run_id,
                            RunStatus::Failed,
                            None,
                            Some("Run timed out".to_string()),
                            Utc::now(),
                        )
                        .await
                    {
                        error!(run_id = %run_id, "failed to time out run: {e}");
                    }
                    return;
                }
                _ = tokio::time::sleep(self.config.poll_period) => {}
                _ = completions.notified() => {}
            }

            match self.try_finalize(&tenant, run_id).await {
                Ok(true) => return,
                Ok(false) => {}
                Err(e) => error!(run_id = %run_id, "run completion check failed: {e}"),
            }
        }
    }

    /// One terminality check. Returns `true` once the run has been finalized
    /// (by this call or a previous one).
    pub async fn try_finalize(&self, tenant: &TenantId, run_id: Uuid) -> Result<bool> {
        let run = self
            .store
            .runs
            .get(tenant, run_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("run {run_id} not found")))?;
        if run.status != RunStatus::Running {
            return Ok(true);
        }

        let jobs = self.store.jobs.for_run(tenant, run_id).await?;
        let terminal = jobs.iter().filter(|job| job.status.is_terminal()).count();

        if jobs.is_empty() || terminal < jobs.len() {
            if !jobs.is_empty() {
                let progress = (terminal * 100 / jobs.len()) as i32;
                self.store.runs.set_progress(tenant, run_id, progress).await?;
            }
            return Ok(false);
        }

        let statistics = RunStatistics {
            total: jobs.len(),
            completed: jobs
                .iter()
                .filter(|job| job.status == JobStatus::Succeeded)
                .count(),
            failed: jobs
                .iter()
                .filter(|job| job.status == JobStatus::Failed)
                .count(),
            cancelled: jobs
                .iter()
                .filter(|job| job.status == JobStatus::Aborted)
                .count(),
        };
        self.store
            .runs
            .finalize(
                tenant,
                run_id,
                RunStatus::Completed,
                Some(statistics),
                None,
                Utc::now(),
            )
            .await?;
        info!(tenant = %tenant, run_id = %run_id, ?statistics, "run completed");

        self.process_findings(tenant, &run, &jobs).await?;
        Ok(true)
    }

    /// Convert each succeeded job's `result.findings[]` into finding rows.
    /// Individual malformed entries are skipped, never fatal to the run.
    async fn process_findings(&self, tenant: &TenantId, run: &Run, jobs: &[Job]) -> Result<()> {
        for job in jobs {
            if job.status != JobStatus::Succeeded {
                continue;
            }
            let Some(entries) = job
                .result
                .as_ref()
                .and_then(|result| result.get("findings"))
                .and_then(Value::as_array)
            else {
                continue;
            };

            for entry in entries {
                let finding = finding_from_result(tenant, run, job.id, entry);
                if let Err(e) = self.store.record_finding(finding).await {
                    warn!(job_id = %job.id, "skipping unrecordable finding: {e}");
                }
            }
        }
        Ok(())
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn finding_from_result(tenant: &TenantId, run: &Run, job_id: Uuid, entry: &Value) -> Finding {
    Finding {
        id: Uuid::new_v4(),
        tenant_id: tenant.clone(),
        run_id: run.id,
        engagement_id: run.engagement_id,
        job_id: Some(job_id),
        title: entry
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or("Unknown Finding")
            .to_string(),
        category: entry
            .get("category")
            .and_then(Value::as_str)
            .unwrap_or("general")
            .to_string(),
        severity: entry
            .get("severity")
            .and_then(Value::as_str)
            .map(Severity::parse_lossy)
            .unwrap_or(Severity::Info),
        description: entry
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        evidence: entry.get("evidence").cloned().unwrap_or(Value::Null),
        affected_hosts: string_list(entry.get("affected_hosts")),
        affected_urls: string_list(entry.get("affected_urls")),
        hash: String::new(),
        false_positive: false,
        duplicate_of: None,
        created_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::QueueConfig;
    use pentra_model::{Agent, AgentStatus};
    use serde_json::json;

    fn test_agent(tenant: &TenantId) -> Agent {
        Agent {
            id: Uuid::new_v4(),
            tenant_id: tenant.clone(),
            name: "agent".into(),
            kind: "nmap".into(),
            status: AgentStatus::Online,
            agent_key_hash: String::new(),
            last_seen: Utc::now(),
            created_at: Utc::now(),
        }
    }

    fn coordinator(store: Store, queue: JobQueue) -> RunCoordinator {
        RunCoordinator::new(
            store,
            queue,
            RunCoordinatorConfig {
                poll_period: StdDuration::from_millis(10),
                completion_timeout: StdDuration::from_secs(5),
            },
            CancellationToken::new(),
        )
    }

    fn steps(n: usize) -> Vec<PlanStep> {
        (0..n)
            .map(|idx| PlanStep {
                adapter: "nmap_default".to_string(),
                params: json!({"step": idx}),
            })
            .collect()
    }

    #[tokio::test]
    async fn run_completes_only_when_every_job_is_terminal() {
        let store = Store::memory();
        let queue = JobQueue::new(store.clone(), QueueConfig::default());
        let coordinator = coordinator(store.clone(), queue.clone());

        let tenant = TenantId::from("t1");
        let run = coordinator
            .create_run(&tenant, Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap();
        let watcher = coordinator
            .start_run(&tenant, run.id, steps(3))
            .await
            .unwrap();

        let agent_a = test_agent(&tenant);
        let agent_b = test_agent(&tenant);

        // Two agents lease concurrently and get distinct jobs.
        let job1 = queue.lease(&tenant, &agent_a, None).await.unwrap().unwrap();
        let job2 = queue.lease(&tenant, &agent_b, None).await.unwrap().unwrap();
        assert_ne!(job1.id, job2.id);

        queue
            .complete(&tenant, agent_a.id, job1.id, JobStatus::Succeeded, None)
            .await
            .unwrap();
        assert!(!coordinator.try_finalize(&tenant, run.id).await.unwrap());
        let still_running = store.runs.get(&tenant, run.id).await.unwrap().unwrap();
        assert_eq!(still_running.status, RunStatus::Running);

        queue
            .complete(&tenant, agent_b.id, job2.id, JobStatus::Succeeded, None)
            .await
            .unwrap();
        let job3 = queue.lease(&tenant, &agent_a, None).await.unwrap().unwrap();
        queue
            .complete(&tenant, agent_a.id, job3.id, JobStatus::Succeeded, None)
            .await
            .unwrap();

        watcher.await.unwrap();
        let completed = store.runs.get(&tenant, run.id).await.unwrap().unwrap();
        assert_eq!(completed.status, RunStatus::Completed);
        assert_eq!(completed.progress, 100);
        assert_eq!(
            completed.statistics,
            Some(RunStatistics {
                total: 3,
                completed: 3,
                failed: 0,
                cancelled: 0,
            })
        );
    }

    #[tokio::test]
    async fn statistics_count_failed_and_cancelled_jobs() {
        let store = Store::memory();
        let queue = JobQueue::new(store.clone(), QueueConfig::default());
        let coordinator = coordinator(store.clone(), queue.clone());

        let tenant = TenantId::from("t1");
        let run = coordinator
            .create_run(&tenant, Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap();
        coordinator
            .start_run(&tenant, run.id, steps(3))
            .await
            .unwrap()
            .abort();

        let agent = test_agent(&tenant);
        for status in [JobStatus::Succeeded, JobStatus::Failed, JobStatus::Aborted] {
            let job = queue.lease(&tenant, &agent, None).await.unwrap().unwrap();
            queue
                .complete(&tenant, agent.id, job.id, status, None)
                .await
                .unwrap();
        }

        assert!(coordinator.try_finalize(&tenant, run.id).await.unwrap());
        let completed = store.runs.get(&tenant, run.id).await.unwrap().unwrap();
        assert_eq!(completed.status, RunStatus::Completed);
        assert_eq!(
            completed.statistics,
            Some(RunStatistics {
                total: 3,
                completed: 1,
                failed: 1,
                cancelled: 1,
            })
        );
    }

    #[tokio::test]
    async fn completion_ceiling_forces_run_failed() {
        let store = Store::memory();
        let queue = JobQueue::new(store.clone(), QueueConfig::default());
        let coordinator = RunCoordinator::new(
            store.clone(),
            queue.clone(),
            RunCoordinatorConfig {
                poll_period: StdDuration::from_millis(10),
                completion_timeout: StdDuration::from_millis(30),
            },
            CancellationToken::new(),
        );

        let tenant = TenantId::from("t1");
        let run = coordinator
            .create_run(&tenant, Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap();
        let watcher = coordinator
            .start_run(&tenant, run.id, steps(1))
            .await
            .unwrap();

        // Nobody ever leases the job, so the ceiling wins.
        watcher.await.unwrap();
        let failed = store.runs.get(&tenant, run.id).await.unwrap().unwrap();
        assert_eq!(failed.status, RunStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("Run timed out"));
    }

    #[tokio::test]
    async fn succeeded_job_findings_become_finding_rows_with_dedup() {
        let store = Store::memory();
        let queue = JobQueue::new(store.clone(), QueueConfig::default());
        let coordinator = coordinator(store.clone(), queue.clone());

        let tenant = TenantId::from("t1");
        let run = coordinator
            .create_run(&tenant, Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap();
        coordinator
            .start_run(&tenant, run.id, steps(2))
            .await
            .unwrap()
            .abort();

        let finding = json!({
            "title": "Outdated TLS",
            "category": "crypto",
            "severity": "HIGH",
            "description": "TLS 1.0 enabled",
            "affected_hosts": ["web.example"],
        });
        let agent = test_agent(&tenant);
        for _ in 0..2 {
            let job = queue.lease(&tenant, &agent, None).await.unwrap().unwrap();
            queue
                .complete(
                    &tenant,
                    agent.id,
                    job.id,
                    JobStatus::Succeeded,
                    Some(json!({"findings": [finding]})),
                )
                .await
                .unwrap();
        }

        assert!(coordinator.try_finalize(&tenant, run.id).await.unwrap());
        let findings = store.findings.for_run(&tenant, run.id).await.unwrap();
        assert_eq!(findings.len(), 2);

        let originals: Vec<_> = findings
            .iter()
            .filter(|finding| finding.duplicate_of.is_none())
            .collect();
        assert_eq!(originals.len(), 1);
        assert_eq!(originals[0].severity, Severity::High);
        let duplicate = findings
            .iter()
            .find(|finding| finding.duplicate_of.is_some())
            .unwrap();
        assert_eq!(duplicate.duplicate_of, Some(originals[0].id));
        assert_eq!(duplicate.hash, originals[0].hash);
    }
}
