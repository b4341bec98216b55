//! Rule-based decision provider.
//!
//! No external dependencies, always available; the fallback target when an
//! LLM-backed provider is down. Plans come from per-engagement-type
//! templates, and the decision loop walks a fixed, conservative progression
//! that never attempts exploitation.

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use pentra_model::{AgentCommand, Decision, PentestContext, PlanResponse, TestPhase};

use crate::error::Result;
use crate::provider::DecisionProvider;

#[derive(Debug, Clone, Default)]
pub struct HeuristicProvider;

impl HeuristicProvider {
    pub fn new() -> Self {
        Self
    }

    fn template(engagement_type: &str) -> Vec<&'static str> {
        match engagement_type {
            "web_application" => vec![
                "web_discovery",
                "zap_baseline",
                "nuclei_default",
                "semgrep_default",
            ],
            "network" => vec!["nmap_default", "nuclei_default"],
            "api" => vec!["zap_api", "nuclei_default"],
            "mobile" => vec!["mobile_apk_scan"],
            _ => vec!["nmap_default", "zap_baseline", "nuclei_default"],
        }
    }

    /// One command per phase, issued only if this phase has not dispatched
    /// anything yet; otherwise advance. Keeps the loop finite without any
    /// model in the loop.
    fn next_step(&self, ctx: &PentestContext) -> Decision {
        let phase = ctx.current_phase;
        let already_ran = ctx
            .command_history
            .iter()
            .any(|record| record.phase == phase);
        let target = ctx
            .target_info
            .targets
            .first()
            .cloned()
            .unwrap_or_default();

        if already_ran || target.is_empty() {
            let transition = match phase {
                TestPhase::Reconnaissance => TestPhase::Enumeration,
                TestPhase::Enumeration => TestPhase::VulnerabilityAssessment,
                // The rule-based provider never attempts exploitation.
                _ => TestPhase::Reporting,
            };
            return Decision {
                reasoning: format!(
                    "heuristic: phase {phase} has run its step, advancing to {transition}"
                ),
                phase_transition: Some(transition.as_str().to_string()),
                ..Decision::default()
            };
        }

        let command = match phase {
            TestPhase::Reconnaissance => Some(command(
                "nmap_default",
                format!("nmap -sV -Pn {target}"),
                &target,
                phase,
            )),
            TestPhase::Enumeration => Some(command(
                "nmap_default",
                format!("nmap -sC -p- {target}"),
                &target,
                phase,
            )),
            TestPhase::VulnerabilityAssessment => Some(command(
                "nuclei_default",
                format!("nuclei -u {target} -jsonl"),
                &target,
                phase,
            )),
            _ => None,
        };

        match command {
            Some(command) => Decision {
                reasoning: format!("heuristic: running the {phase} step against {target}"),
                next_commands: vec![command],
                ..Decision::default()
            },
            None => Decision {
                reasoning: format!("heuristic: nothing to do in {phase}, wrapping up"),
                phase_transition: Some(TestPhase::Reporting.as_str().to_string()),
                ..Decision::default()
            },
        }
    }
}

fn command(adapter: &str, command_line: String, target: &str, phase: TestPhase) -> AgentCommand {
    let mut params = Map::new();
    params.insert("target".to_string(), json!(target));
    AgentCommand {
        agent_id: None,
        command_type: adapter.to_string(),
        command: command_line,
        args: Vec::new(),
        params,
        timeout_secs: 300,
        requires_output: true,
        phase,
    }
}

#[async_trait]
impl DecisionProvider for HeuristicProvider {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    async fn plan(
        &self,
        scope: &Map<String, Value>,
        engagement_type: &str,
        _preferences: &Map<String, Value>,
    ) -> Result<PlanResponse> {
        let selected_tests: Vec<String> = Self::template(engagement_type)
            .into_iter()
            .map(str::to_string)
            .collect();

        let mut params = Map::new();
        if let Some(targets) = scope.get("targets") {
            params.insert("targets".to_string(), targets.clone());
        }

        Ok(PlanResponse {
            selected_tests,
            params,
            explanation: format!("heuristic template for `{engagement_type}` engagements"),
        })
    }

    async fn decide(&self, _prompt: &str, context: &PentestContext) -> Result<Decision> {
        Ok(self.next_step(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pentra_model::CommandRecord;
    use uuid::Uuid;

    fn ctx() -> PentestContext {
        PentestContext::new(Uuid::new_v4(), vec!["10.0.0.5".into()], Map::new())
    }

    #[tokio::test]
    async fn plan_selects_template_by_engagement_type() {
        let provider = HeuristicProvider::new();
        let plan = provider
            .plan(&Map::new(), "web_application", &Map::new())
            .await
            .unwrap();
        assert!(plan.selected_tests.contains(&"zap_baseline".to_string()));

        let fallback = provider
            .plan(&Map::new(), "something_else", &Map::new())
            .await
            .unwrap();
        assert!(fallback.selected_tests.contains(&"nmap_default".to_string()));
    }

    #[tokio::test]
    async fn first_recon_decision_issues_an_nmap_command() {
        let provider = HeuristicProvider::new();
        let decision = provider.decide("", &ctx()).await.unwrap();
        assert_eq!(decision.next_commands.len(), 1);
        assert!(decision.next_commands[0].command.starts_with("nmap"));
        assert!(decision.phase_transition.is_none());
    }

    #[tokio::test]
    async fn after_phase_step_ran_it_advances() {
        let provider = HeuristicProvider::new();
        let mut ctx = ctx();
        ctx.log_command(CommandRecord {
            timestamp: Utc::now(),
            phase: TestPhase::Reconnaissance,
            command: "nmap -sV -Pn 10.0.0.5".into(),
            agent: None,
            result: Value::Null,
        });

        let decision = provider.decide("", &ctx).await.unwrap();
        assert!(decision.next_commands.is_empty());
        assert_eq!(
            decision.phase_transition.as_deref(),
            Some(TestPhase::Enumeration.as_str())
        );
    }

    #[tokio::test]
    async fn never_recommends_exploitation() {
        let provider = HeuristicProvider::new();
        let mut ctx = ctx();
        ctx.current_phase = TestPhase::VulnerabilityAssessment;
        ctx.log_command(CommandRecord {
            timestamp: Utc::now(),
            phase: TestPhase::VulnerabilityAssessment,
            command: "nuclei -u 10.0.0.5 -jsonl".into(),
            agent: None,
            result: Value::Null,
        });

        let decision = provider.decide("", &ctx).await.unwrap();
        assert_eq!(
            decision.phase_transition.as_deref(),
            Some(TestPhase::Reporting.as_str())
        );
    }
}
