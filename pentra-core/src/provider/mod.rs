//! Decision providers: the external brains the orchestrator consults.
//!
//! One trait, three implementations: a rule-based heuristic that always
//! works, an OpenAI-compatible chat provider, and a decorator that falls
//! back from any provider to the heuristic on error.

pub mod fallback;
pub mod heuristic;
pub mod openai;

pub use fallback::FallbackProvider;
pub use heuristic::HeuristicProvider;
pub use openai::OpenAiProvider;

use async_trait::async_trait;
use serde_json::{Map, Value};

use pentra_model::{Decision, PentestContext, PlanResponse};

use crate::error::Result;

#[async_trait]
pub trait DecisionProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Produce a test plan for an engagement before any run starts.
    async fn plan(
        &self,
        scope: &Map<String, Value>,
        engagement_type: &str,
        preferences: &Map<String, Value>,
    ) -> Result<PlanResponse>;

    /// Decide the next commands (and optionally a phase transition) for one
    /// orchestrator iteration.
    async fn decide(&self, prompt: &str, context: &PentestContext) -> Result<Decision>;
}
