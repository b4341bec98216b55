//! Command dispatcher: bridges the phase orchestrator onto the job queue.
//!
//! Every decision-provider command becomes a queued job; when the command
//! needs its output, the dispatcher polls the job until terminal or the
//! command's own timeout, returning a synthetic timeout result otherwise.
//! Each invocation lands in the session's append-only command history.

use std::time::Duration as StdDuration;

use chrono::Utc;
use serde_json::{Value, json};
use tracing::debug;
use uuid::Uuid;

use pentra_model::{AgentCommand, CommandRecord, PentestContext, TenantId};

use crate::error::Result;
use crate::queue::JobQueue;

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub poll_period: StdDuration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_period: StdDuration::from_secs(2),
        }
    }
}

/// Dispatcher for one orchestration session. All jobs it creates belong to
/// the session's backing run.
#[derive(Clone)]
pub struct CommandDispatcher {
    queue: JobQueue,
    tenant: TenantId,
    run_id: Uuid,
    config: DispatcherConfig,
}

impl CommandDispatcher {
    pub fn new(queue: JobQueue, tenant: TenantId, run_id: Uuid, config: DispatcherConfig) -> Self {
        Self {
            queue,
            tenant,
            run_id,
            config,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    /// Enqueue the command as a job and (optionally) wait for its result.
    /// The outcome — terminal, submitted, or timeout — is always logged to
    /// the context's command history before returning.
    pub async fn execute(
        &self,
        ctx: &mut PentestContext,
        command: &AgentCommand,
    ) -> Result<Value> {
        let job = self
            .queue
            .enqueue(
                &self.tenant,
                self.run_id,
                &command.command_type,
                Value::Object(command.params.clone()),
            )
            .await?;
        debug!(job_id = %job.id, command = %command.command, "command dispatched");

        let outcome = if command.requires_output {
            self.wait_for_job(job.id, command.timeout_secs).await?
        } else {
            json!({ "status": "submitted", "job_id": job.id })
        };

        ctx.log_command(CommandRecord {
            timestamp: Utc::now(),
            phase: command.phase,
            command: command.command.clone(),
            agent: command.agent_id,
            result: outcome.clone(),
        });

        Ok(outcome)
    }

    /// Poll the job every `poll_period` until terminal or `timeout_secs`
    /// elapses. The job itself keeps running past a dispatcher timeout; only
    /// the wait is abandoned.
    async fn wait_for_job(&self, job_id: Uuid, timeout_secs: u64) -> Result<Value> {
        let deadline = tokio::time::Instant::now() + StdDuration::from_secs(timeout_secs);

        loop {
            if let Some(job) = self.queue.get_job(&self.tenant, job_id).await?
                && job.status.is_terminal()
            {
                let output = job
                    .result
                    .as_ref()
                    .and_then(|result| result.get("output"))
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                return Ok(json!({
                    "status": job.status.as_str(),
                    "job_id": job.id,
                    "output": output,
                    "result": job.result,
                }));
            }

            if tokio::time::Instant::now() + self.config.poll_period > deadline {
                return Ok(json!({ "status": "timeout", "job_id": job_id }));
            }
            tokio::time::sleep(self.config.poll_period).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::QueueConfig;
    use crate::store::Store;
    use chrono::Utc;
    use pentra_model::{Agent, AgentStatus, JobStatus, TestPhase};
    use serde_json::Map;

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

    fn command(requires_output: bool, timeout_secs: u64) -> AgentCommand {
        AgentCommand {
            agent_id: None,
            command_type: "nmap_default".into(),
            command: "nmap -sV target".into(),
            args: vec![],
            params: Map::new(),
            timeout_secs,
            requires_output,
            phase: TestPhase::Reconnaissance,
        }
    }

    fn session() -> (Store, JobQueue, CommandDispatcher, PentestContext) {
        let store = Store::memory();
        let queue = JobQueue::new(store.clone(), QueueConfig::default());
        let dispatcher = CommandDispatcher::new(
            queue.clone(),
            TenantId::from("t1"),
            Uuid::new_v4(),
            DispatcherConfig {
                poll_period: StdDuration::from_millis(5),
            },
        );
        let ctx = PentestContext::new(Uuid::new_v4(), vec!["target".into()], Map::new());
        (store, queue, dispatcher, ctx)
    }

    #[tokio::test]
    async fn fire_and_forget_returns_submitted() {
        let (_, _, dispatcher, mut ctx) = session();

        let outcome = dispatcher
            .execute(&mut ctx, &command(false, 30))
            .await
            .unwrap();
        assert_eq!(outcome["status"], "submitted");
        assert_eq!(ctx.command_history.len(), 1);
        assert_eq!(ctx.command_history[0].command, "nmap -sV target");
    }

    #[tokio::test]
    async fn waits_for_terminal_result() {
        let (_, queue, dispatcher, mut ctx) = session();
        let tenant = TenantId::from("t1");
        let agent = test_agent(&tenant);

        let worker = {
            let queue = queue.clone();
            let tenant = tenant.clone();
            tokio::spawn(async move {
                // Simulated agent: lease, then report a result.
                loop {
                    if let Some(job) = queue.lease(&tenant, &agent, None).await.unwrap() {
                        queue
                            .complete(
                                &tenant,
                                agent.id,
                                job.id,
                                JobStatus::Succeeded,
                                Some(json!({"output": "80/tcp open http"})),
                            )
                            .await
                            .unwrap();
                        break;
                    }
                    tokio::time::sleep(StdDuration::from_millis(2)).await;
                }
            })
        };

        let outcome = dispatcher
            .execute(&mut ctx, &command(true, 30))
            .await
            .unwrap();
        worker.await.unwrap();

        assert_eq!(outcome["status"], "succeeded");
        assert_eq!(outcome["output"], "80/tcp open http");
        assert_eq!(ctx.command_history.len(), 1);
        assert_eq!(ctx.command_history[0].result["status"], "succeeded");
    }

    #[tokio::test]
    async fn unclaimed_job_times_out_with_synthetic_result() {
        let (_, _, dispatcher, mut ctx) = session();

        let outcome = dispatcher
            .execute(&mut ctx, &command(true, 0))
            .await
            .unwrap();
        assert_eq!(outcome["status"], "timeout");
        // The timeout still lands in the audit trail.
        assert_eq!(ctx.command_history.len(), 1);
        assert_eq!(ctx.command_history[0].result["status"], "timeout");
    }
}
