//! OpenAI-compatible chat-completions decision provider.
//!
//! Works against any endpoint speaking the `/chat/completions` protocol
//! (OpenAI, Azure-style gateways, local runtimes). Responses are requested
//! as JSON objects and deserialized straight into the decision types; any
//! transport or shape problem surfaces as `CoreError::Provider`, which the
//! orchestrator treats as retryable.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use pentra_model::{Decision, PentestContext, PlanResponse};

use crate::error::{CoreError, Result};
use crate::provider::DecisionProvider;

const SYSTEM_PROMPT: &str = "You are an expert penetration tester controlling a distributed \
testing system. Analyze results and decide next steps, always within the authorized scope and \
rules of engagement. Respond with a single JSON object containing: reasoning, next_commands \
(list of agent commands), phase_transition (optional), findings_analysis (optional), \
risk_assessment (optional).";

#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

impl OpenAiProvider {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    async fn chat(&self, user_content: String) -> Result<String> {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": user_content },
            ],
            "response_format": { "type": "json_object" },
            "temperature": 0.2,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::Provider(format!("chat request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CoreError::Provider(format!(
                "chat endpoint returned {status}"
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| CoreError::Provider(format!("bad chat response body: {e}")))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| CoreError::Provider("chat response had no choices".to_string()))
    }
}

#[async_trait]
impl DecisionProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn plan(
        &self,
        scope: &Map<String, Value>,
        engagement_type: &str,
        preferences: &Map<String, Value>,
    ) -> Result<PlanResponse> {
        let user_content = format!(
            "Produce a test plan as JSON with keys selected_tests (list of adapter names), \
             params (object), explanation (string).\n\nEngagement type: {engagement_type}\n\
             Scope:\n{}\nPreferences:\n{}",
            serde_json::to_string_pretty(scope)?,
            serde_json::to_string_pretty(preferences)?,
        );
        let content = self.chat(user_content).await?;
        serde_json::from_str(&content)
            .map_err(|e| CoreError::Provider(format!("plan response was not valid JSON: {e}")))
    }

    async fn decide(&self, prompt: &str, context: &PentestContext) -> Result<Decision> {
        let user_content = format!(
            "{prompt}\n\nContext:\n{}",
            serde_json::to_string_pretty(context)?
        );
        let content = self.chat(user_content).await?;
        serde_json::from_str(&content)
            .map_err(|e| CoreError::Provider(format!("decision was not valid JSON: {e}")))
    }
}
