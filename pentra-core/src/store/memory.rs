//! In-memory store adapter.
//!
//! Backs tests and demo mode. All repositories share one `Mutex` over the
//! whole state, which makes every operation — the lease claim included —
//! trivially atomic. Not intended for production fleets; the Postgres
//! adapter is the canonical deployment.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use pentra_model::{
    Agent, AgentStatus, Artifact, EnrollToken, Finding, Job, JobEvent, JobStatus, Run,
    RunStatistics, RunStatus, TenantId, adapter_kind,
};

use crate::error::{CoreError, Result};
use crate::store::not_found;
use crate::store::ports::{
    AgentsRepository, ArtifactsRepository, FindingsRepository, JobsRepository, RunsRepository,
    StuckSweep,
};

#[derive(Debug, Default)]
pub struct MemoryState {
    enroll_tokens: Vec<EnrollToken>,
    agents: Vec<Agent>,
    jobs: Vec<Job>,
    job_events: Vec<JobEvent>,
    runs: Vec<Run>,
    findings: Vec<Finding>,
    artifacts: Vec<Artifact>,
}

pub type SharedState = Arc<Mutex<MemoryState>>;

pub fn shared_state() -> SharedState {
    Arc::new(Mutex::new(MemoryState::default()))
}

#[derive(Debug, Clone)]
pub struct MemoryAgentsRepository {
    state: SharedState,
}

impl MemoryAgentsRepository {
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl AgentsRepository for MemoryAgentsRepository {
    async fn insert_enroll_token(&self, token: &EnrollToken) -> Result<()> {
        self.state.lock().await.enroll_tokens.push(token.clone());
        Ok(())
    }

    async fn find_usable_enroll_token(
        &self,
        tenant: &TenantId,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<EnrollToken>> {
        let state = self.state.lock().await;
        Ok(state
            .enroll_tokens
            .iter()
            .find(|token| {
                token.tenant_id == *tenant
                    && token.token_hash == token_hash
                    && token.is_usable(now)
            })
            .cloned())
    }

    async fn mark_enroll_token_used(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let mut state = self.state.lock().await;
        let token = state
            .enroll_tokens
            .iter_mut()
            .find(|token| token.id == id)
            .ok_or_else(|| not_found("enroll token", id))?;
        if token.used_at.is_some() {
            return Ok(false);
        }
        token.used_at = Some(now);
        Ok(true)
    }

    async fn insert_agent(&self, agent: &Agent) -> Result<()> {
        self.state.lock().await.agents.push(agent.clone());
        Ok(())
    }

    async fn get_agent(&self, tenant: &TenantId, id: Uuid) -> Result<Option<Agent>> {
        let state = self.state.lock().await;
        Ok(state
            .agents
            .iter()
            .find(|agent| agent.tenant_id == *tenant && agent.id == id)
            .cloned())
    }

    async fn touch_agent(&self, tenant: &TenantId, id: Uuid, now: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.lock().await;
        let agent = state
            .agents
            .iter_mut()
            .find(|agent| agent.tenant_id == *tenant && agent.id == id)
            .ok_or_else(|| not_found("agent", id))?;
        agent.last_seen = now;
        agent.status = AgentStatus::Online;
        Ok(())
    }

    async fn list_agents(&self, tenant: &TenantId) -> Result<Vec<Agent>> {
        let state = self.state.lock().await;
        let mut agents: Vec<Agent> = state
            .agents
            .iter()
            .filter(|agent| agent.tenant_id == *tenant)
            .cloned()
            .collect();
        agents.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        Ok(agents)
    }
}

#[derive(Debug, Clone)]
pub struct MemoryJobsRepository {
    state: SharedState,
}

impl MemoryJobsRepository {
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl JobsRepository for MemoryJobsRepository {
    async fn insert(&self, job: &Job) -> Result<()> {
        self.state.lock().await.jobs.push(job.clone());
        Ok(())
    }

    async fn get(&self, tenant: &TenantId, id: Uuid) -> Result<Option<Job>> {
        let state = self.state.lock().await;
        Ok(state
            .jobs
            .iter()
            .find(|job| job.tenant_id == *tenant && job.id == id)
            .cloned())
    }

    async fn claim_next_queued(
        &self,
        tenant: &TenantId,
        agent_id: Uuid,
        kinds: Option<&[String]>,
        lease_expires_at: DateTime<Utc>,
    ) -> Result<Option<Job>> {
        // The whole claim happens under one guard, so concurrent callers
        // serialize here just like rows do under FOR UPDATE SKIP LOCKED.
        let mut state = self.state.lock().await;

        let mut chosen: Option<usize> = None;
        for (idx, job) in state.jobs.iter().enumerate() {
            if job.tenant_id != *tenant || job.status != JobStatus::Queued {
                continue;
            }
            if let Some(kinds) = kinds
                && !kinds
                    .iter()
                    .any(|kind| kind.eq_ignore_ascii_case(adapter_kind(&job.adapter)))
            {
                continue;
            }
            match chosen {
                // Strict comparison keeps FIFO order for equal timestamps.
                Some(best) if state.jobs[best].created_at <= job.created_at => {}
                _ => chosen = Some(idx),
            }
        }

        Ok(chosen.map(|idx| {
            let job = &mut state.jobs[idx];
            job.status = JobStatus::Leased;
            job.leased_by = Some(agent_id);
            job.lease_expires_at = Some(lease_expires_at);
            job.clone()
        }))
    }

    async fn complete(
        &self,
        tenant: &TenantId,
        id: Uuid,
        agent_id: Uuid,
        status: JobStatus,
        result: Option<Value>,
    ) -> Result<Job> {
        let mut state = self.state.lock().await;
        let job = state
            .jobs
            .iter_mut()
            .find(|job| job.tenant_id == *tenant && job.id == id)
            .ok_or_else(|| not_found("job", id))?;

        if !job.status.is_leased() || job.leased_by != Some(agent_id) {
            return Err(CoreError::LeaseConflict(format!(
                "job {id} is not leased by the calling agent"
            )));
        }

        job.status = status;
        job.result = result;
        job.leased_by = None;
        job.lease_expires_at = None;
        Ok(job.clone())
    }

    async fn for_run(&self, tenant: &TenantId, run_id: Uuid) -> Result<Vec<Job>> {
        let state = self.state.lock().await;
        Ok(state
            .jobs
            .iter()
            .filter(|job| job.tenant_id == *tenant && job.run_id == run_id)
            .cloned()
            .collect())
    }

    async fn sweep_stuck(&self, stuck_before: DateTime<Utc>) -> Result<StuckSweep> {
        let mut state = self.state.lock().await;
        let mut sweep = StuckSweep::default();

        for job in state.jobs.iter_mut() {
            if !job.status.is_leased() {
                continue;
            }
            let expired = match job.lease_expires_at {
                Some(at) => at < stuck_before,
                None => false,
            };
            if !expired {
                continue;
            }

            job.attempts += 1;
            job.leased_by = None;
            job.lease_expires_at = None;
            if job.attempts >= job.max_attempts {
                job.status = JobStatus::Failed;
                job.error_message = Some("max attempts reached".to_string());
                sweep.failed.push(job.id);
            } else {
                job.status = JobStatus::Queued;
                sweep.requeued.push(job.id);
            }
        }

        Ok(sweep)
    }

    async fn append_event(&self, event: &JobEvent) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state
            .jobs
            .iter()
            .any(|job| job.tenant_id == event.tenant_id && job.id == event.job_id)
        {
            return Err(not_found("job", event.job_id));
        }
        state.job_events.push(event.clone());
        Ok(())
    }

    async fn events_for(&self, tenant: &TenantId, job_id: Uuid) -> Result<Vec<JobEvent>> {
        let state = self.state.lock().await;
        Ok(state
            .job_events
            .iter()
            .filter(|event| event.tenant_id == *tenant && event.job_id == job_id)
            .cloned()
            .collect())
    }
}

#[derive(Debug, Clone)]
pub struct MemoryRunsRepository {
    state: SharedState,
}

impl MemoryRunsRepository {
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl RunsRepository for MemoryRunsRepository {
    async fn insert(&self, run: &Run) -> Result<()> {
        self.state.lock().await.runs.push(run.clone());
        Ok(())
    }

    async fn get(&self, tenant: &TenantId, id: Uuid) -> Result<Option<Run>> {
        let state = self.state.lock().await;
        Ok(state
            .runs
            .iter()
            .find(|run| run.tenant_id == *tenant && run.id == id)
            .cloned())
    }

    async fn mark_running(
        &self,
        tenant: &TenantId,
        id: Uuid,
        started_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let run = state
            .runs
            .iter_mut()
            .find(|run| run.tenant_id == *tenant && run.id == id)
            .ok_or_else(|| not_found("run", id))?;
        run.status = RunStatus::Running;
        run.started_at = Some(started_at);
        Ok(())
    }

    async fn set_progress(&self, tenant: &TenantId, id: Uuid, progress: i32) -> Result<()> {
        let mut state = self.state.lock().await;
        let run = state
            .runs
            .iter_mut()
            .find(|run| run.tenant_id == *tenant && run.id == id)
            .ok_or_else(|| not_found("run", id))?;
        run.progress = progress.clamp(0, 100);
        Ok(())
    }

    async fn finalize(
        &self,
        tenant: &TenantId,
        id: Uuid,
        status: RunStatus,
        statistics: Option<RunStatistics>,
        error_message: Option<String>,
        completed_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let run = state
            .runs
            .iter_mut()
            .find(|run| run.tenant_id == *tenant && run.id == id)
            .ok_or_else(|| not_found("run", id))?;
        // A run that already went terminal (e.g. timed out) stays terminal.
        if run.status != RunStatus::Running {
            return Ok(());
        }
        run.status = status;
        run.statistics = statistics;
        run.error_message = error_message;
        run.completed_at = Some(completed_at);
        if status == RunStatus::Completed {
            run.progress = 100;
        }
        Ok(())
    }

    async fn fail_overrunning(
        &self,
        started_before: DateTime<Utc>,
        error_message: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Uuid>> {
        let mut state = self.state.lock().await;
        let mut failed = Vec::new();
        for run in state.runs.iter_mut() {
            if run.status != RunStatus::Running {
                continue;
            }
            let overrunning = match run.started_at {
                Some(at) => at < started_before,
                None => false,
            };
            if overrunning {
                run.status = RunStatus::Failed;
                run.error_message = Some(error_message.to_string());
                run.completed_at = Some(now);
                failed.push(run.id);
            }
        }
        Ok(failed)
    }
}

#[derive(Debug, Clone)]
pub struct MemoryFindingsRepository {
    state: SharedState,
}

impl MemoryFindingsRepository {
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl FindingsRepository for MemoryFindingsRepository {
    async fn find_by_hash(
        &self,
        tenant: &TenantId,
        engagement_id: Uuid,
        hash: &str,
    ) -> Result<Option<Finding>> {
        let state = self.state.lock().await;
        Ok(state
            .findings
            .iter()
            .find(|finding| {
                finding.tenant_id == *tenant
                    && finding.engagement_id == engagement_id
                    && finding.hash == hash
                    && !finding.false_positive
            })
            .cloned())
    }

    async fn insert(&self, finding: &Finding) -> Result<()> {
        self.state.lock().await.findings.push(finding.clone());
        Ok(())
    }

    async fn for_run(&self, tenant: &TenantId, run_id: Uuid) -> Result<Vec<Finding>> {
        let state = self.state.lock().await;
        Ok(state
            .findings
            .iter()
            .filter(|finding| finding.tenant_id == *tenant && finding.run_id == run_id)
            .cloned()
            .collect())
    }
}

#[derive(Debug, Clone)]
pub struct MemoryArtifactsRepository {
    state: SharedState,
}

impl MemoryArtifactsRepository {
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl ArtifactsRepository for MemoryArtifactsRepository {
    async fn insert(&self, artifact: &Artifact) -> Result<()> {
        self.state.lock().await.artifacts.push(artifact.clone());
        Ok(())
    }

    async fn for_run(&self, tenant: &TenantId, run_id: Uuid) -> Result<Vec<Artifact>> {
        let state = self.state.lock().await;
        Ok(state
            .artifacts
            .iter()
            .filter(|artifact| artifact.tenant_id == *tenant && artifact.run_id == run_id)
            .cloned()
            .collect())
    }
}
