//! Fallback decorator over any decision provider.
//!
//! Wraps a primary provider and answers from the heuristic when the primary
//! errors. Call sites depend on one provider and never chain error handling
//! themselves.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::warn;

use pentra_model::{Decision, PentestContext, PlanResponse};

use crate::error::Result;
use crate::provider::{DecisionProvider, HeuristicProvider};

pub struct FallbackProvider {
    primary: Arc<dyn DecisionProvider>,
    fallback: HeuristicProvider,
}

impl FallbackProvider {
    pub fn new(primary: Arc<dyn DecisionProvider>) -> Self {
        Self {
            primary,
            fallback: HeuristicProvider::new(),
        }
    }
}

#[async_trait]
impl DecisionProvider for FallbackProvider {
    fn name(&self) -> &'static str {
        "fallback"
    }

    async fn plan(
        &self,
        scope: &Map<String, Value>,
        engagement_type: &str,
        preferences: &Map<String, Value>,
    ) -> Result<PlanResponse> {
        match self.primary.plan(scope, engagement_type, preferences).await {
            Ok(plan) => Ok(plan),
            Err(e) => {
                warn!(
                    provider = self.primary.name(),
                    "plan failed, falling back to heuristic: {e}"
                );
                self.fallback.plan(scope, engagement_type, preferences).await
            }
        }
    }

    async fn decide(&self, prompt: &str, context: &PentestContext) -> Result<Decision> {
        match self.primary.decide(prompt, context).await {
            Ok(decision) => Ok(decision),
            Err(e) => {
                warn!(
                    provider = self.primary.name(),
                    "decision failed, falling back to heuristic: {e}"
                );
                self.fallback.decide(prompt, context).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use uuid::Uuid;

    struct BrokenProvider;

    #[async_trait]
    impl DecisionProvider for BrokenProvider {
        fn name(&self) -> &'static str {
            "broken"
        }

        async fn plan(
            &self,
            _scope: &Map<String, Value>,
            _engagement_type: &str,
            _preferences: &Map<String, Value>,
        ) -> Result<PlanResponse> {
            Err(CoreError::Provider("connection refused".to_string()))
        }

        async fn decide(&self, _prompt: &str, _context: &PentestContext) -> Result<Decision> {
            Err(CoreError::Provider("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn falls_back_to_heuristic_when_primary_errors() {
        let provider = FallbackProvider::new(Arc::new(BrokenProvider));

        let plan = provider
            .plan(&Map::new(), "network", &Map::new())
            .await
            .unwrap();
        assert!(plan.explanation.contains("heuristic"));

        let ctx = PentestContext::new(Uuid::new_v4(), vec!["10.0.0.5".into()], Map::new());
        let decision = provider.decide("", &ctx).await.unwrap();
        assert!(decision.reasoning.starts_with("heuristic"));
    }
}
