//! Phase orchestrator: the bounded decision loop that lets a decision
//! provider drive a multi-phase penetration test end-to-end.
//!
//! Each iteration asks the provider for the next commands, dispatches them
//! through the job queue, folds parsed tool output into the session context,
//! and applies at most one forward phase transition. The loop stops at the
//! `reporting` phase, at the iteration cap, or on cancellation — and always
//! synthesizes a final report from whatever the session learned.

pub mod parsers;
pub mod prompt;
pub mod report;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Utc;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use pentra_model::{
    AgentCommand, ExploitRecord, Finding, PentestContext, PentestReport, Run, Severity, TenantId,
    TestPhase,
};

use crate::dispatch::CommandDispatcher;
use crate::error::Result;
use crate::provider::DecisionProvider;
use crate::store::Store;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Hard safety stop for the decision loop.
    pub max_iterations: u32,
    /// Fixed delay between iterations, bounding the request rate to the
    /// provider and the agents underneath.
    pub iteration_delay: StdDuration,
    /// Backoff before retrying a failed provider call.
    pub provider_retry_delay: StdDuration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            iteration_delay: StdDuration::from_secs(2),
            provider_retry_delay: StdDuration::from_secs(5),
        }
    }
}

/// Create the run row that groups one orchestration session's jobs and
/// findings. The plan id is synthetic; orchestrated sessions have no
/// pre-built plan.
pub async fn create_session_run(
    store: &Store,
    tenant: &TenantId,
    engagement_id: Uuid,
) -> Result<Run> {
    let run = Run::new(tenant.clone(), Uuid::new_v4(), engagement_id);
    store.runs.insert(&run).await?;
    store.runs.mark_running(tenant, run.id, Utc::now()).await?;
    Ok(run)
}

pub struct PhaseOrchestrator {
    dispatcher: CommandDispatcher,
    provider: Arc<dyn DecisionProvider>,
    store: Store,
    config: OrchestratorConfig,
    cancel: CancellationToken,
}

impl PhaseOrchestrator {
    pub fn new(
        dispatcher: CommandDispatcher,
        provider: Arc<dyn DecisionProvider>,
        store: Store,
        config: OrchestratorConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            dispatcher,
            provider,
            store,
            config,
            cancel,
        }
    }

    /// Drive the session until `reporting`, the iteration cap, or
    /// cancellation. Cancellation stops issuing new commands; jobs already
    /// dispatched run to their own timeout.
    pub async fn run(&self, ctx: &mut PentestContext) -> Result<PentestReport> {
        let mut iteration = 0u32;

        while iteration < self.config.max_iterations && !self.cancel.is_cancelled() {
            iteration += 1;

            let prompt = prompt::build_prompt(ctx);
            let decision = match self.provider.decide(&prompt, ctx).await {
                Ok(decision) => decision,
                Err(e) => {
                    // Same phase next time round; the failure still counts
                    // toward the hard iteration cap.
                    warn!(iteration, "decision provider failed, retrying: {e}");
                    if self.pause(self.config.provider_retry_delay).await {
                        break;
                    }
                    continue;
                }
            };
            if !decision.reasoning.is_empty() {
                debug!(iteration, reasoning = %decision.reasoning, "provider decision");
            }

            for command in &decision.next_commands {
                if self.cancel.is_cancelled() {
                    break;
                }
                match self.dispatcher.execute(ctx, command).await {
                    Ok(outcome) => {
                        if let Err(e) = self.process_result(ctx, command, &outcome).await {
                            warn!(command = %command.command, "discarding unparseable output: {e}");
                        }
                    }
                    Err(e) => warn!(command = %command.command, "command dispatch failed: {e}"),
                }
            }

            if self.apply_transition(ctx, decision.phase_transition.as_deref()) {
                break;
            }
            if self.pause(self.config.iteration_delay).await {
                break;
            }
        }

        if iteration >= self.config.max_iterations {
            warn!(
                max_iterations = self.config.max_iterations,
                "orchestration stopped at iteration cap"
            );
        }

        self.finalize(ctx).await
    }

    /// Apply an explicit provider transition. Returns `true` when the
    /// session just entered the terminal `reporting` phase. Transitions are
    /// forward-only; the loop never infers one from results.
    fn apply_transition(&self, ctx: &mut PentestContext, transition: Option<&str>) -> bool {
        let Some(transition) = transition else {
            return false;
        };
        match TestPhase::parse(transition) {
            Some(next) if next > ctx.current_phase => {
                info!(from = %ctx.current_phase, to = %next, "phase transition");
                ctx.current_phase = next;
                next.is_terminal()
            }
            Some(next) if next < ctx.current_phase => {
                warn!(
                    current = %ctx.current_phase,
                    requested = %next,
                    "ignoring phase regression"
                );
                false
            }
            Some(_) => false,
            None => {
                warn!(requested = transition, "ignoring unknown phase transition");
                false
            }
        }
    }

    /// Cancellable sleep. Returns `true` when cancelled.
    async fn pause(&self, duration: StdDuration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => true,
            _ = tokio::time::sleep(duration) => false,
        }
    }

    /// Route a command's outcome to the parser matching its phase and tool.
    /// Parse problems are the caller's to log; they never abort an
    /// iteration.
    async fn process_result(
        &self,
        ctx: &mut PentestContext,
        command: &AgentCommand,
        outcome: &Value,
    ) -> Result<()> {
        if outcome.get("status").and_then(Value::as_str) != Some("succeeded") {
            return Ok(());
        }
        let output = outcome
            .get("output")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let tool = format!("{} {}", command.command_type, command.command);

        match command.phase {
            TestPhase::Reconnaissance => {
                if tool.contains("nmap") {
                    for service in parsers::parse_nmap_services(output) {
                        if !ctx.discovered_services.contains(&service) {
                            ctx.discovered_services.push(service);
                        }
                    }
                } else if tool.contains("dns") || tool.contains("subfinder") {
                    ctx.target_info.discovered_domains = parsers::parse_dns_domains(output);
                }
            }
            TestPhase::VulnerabilityAssessment => {
                if tool.contains("nuclei") {
                    let vulns = parsers::parse_nuclei_vulns(output);
                    for vuln in &vulns {
                        self.persist_vulnerability(ctx, vuln).await;
                    }
                    ctx.identified_vulnerabilities.extend(vulns);
                }
            }
            TestPhase::Exploitation => {
                if parsers::has_exploit_marker(output) {
                    ctx.successful_exploits.push(ExploitRecord {
                        timestamp: Utc::now(),
                        target: command
                            .params
                            .get("target")
                            .and_then(Value::as_str)
                            .map(str::to_string),
                        exploit: command.command.clone(),
                        result: output.chars().take(500).collect(),
                    });
                }
            }
            TestPhase::PostExploitation => {
                for credential in parsers::parse_credentials(output) {
                    if !ctx.credentials_found.contains(&credential) {
                        ctx.credentials_found.push(credential);
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Vulnerabilities found by the session's own parsers become finding
    /// rows immediately, deduplicated like any other finding. Storage
    /// problems are logged and swallowed; the in-memory context still has
    /// the record.
    async fn persist_vulnerability(
        &self,
        ctx: &PentestContext,
        vuln: &pentra_model::IdentifiedVulnerability,
    ) {
        let finding = Finding {
            id: Uuid::new_v4(),
            tenant_id: self.dispatcher.tenant().clone(),
            run_id: self.dispatcher.run_id(),
            engagement_id: ctx.engagement_id,
            job_id: None,
            title: vuln.template.clone(),
            category: "vulnerability".to_string(),
            severity: Severity::parse_lossy(&vuln.severity),
            description: format!("Vulnerability found at {}", vuln.host),
            evidence: json!({ "matched_at": vuln.matched_at }),
            affected_hosts: if vuln.host.is_empty() {
                Vec::new()
            } else {
                vec![vuln.host.clone()]
            },
            affected_urls: Vec::new(),
            hash: String::new(),
            false_positive: false,
            duplicate_of: None,
            created_at: Utc::now(),
        };
        if let Err(e) = self.store.record_finding(finding).await {
            warn!(template = %vuln.template, "failed to persist vulnerability finding: {e}");
        }
    }

    /// Executive summary via the provider (best effort), then the full
    /// report from the session context.
    async fn finalize(&self, ctx: &PentestContext) -> Result<PentestReport> {
        let summary = match self.provider.decide(&prompt::summary_prompt(ctx), ctx).await {
            Ok(decision) if !decision.reasoning.is_empty() => decision.reasoning,
            Ok(_) => default_summary(ctx),
            Err(e) => {
                warn!("executive summary generation failed: {e}");
                default_summary(ctx)
            }
        };
        Ok(report::build_report(ctx, summary))
    }
}

fn default_summary(ctx: &PentestContext) -> String {
    let (services, vulnerabilities, exploits, credentials) = ctx.summary_counts();
    format!(
        "Penetration test completed: {services} services discovered, {vulnerabilities} \
         vulnerabilities identified, {exploits} successful exploits, {credentials} credentials \
         compromised."
    )
}
