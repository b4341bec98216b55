use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use pentra_model::{Agent, EnrollToken, TenantId};

use crate::error::Result;

// Agent identity and enrollment-token storage.
#[async_trait]
pub trait AgentsRepository: Send + Sync {
    async fn insert_enroll_token(&self, token: &EnrollToken) -> Result<()>;

    /// Look up an unused, unexpired token by its hash within the tenant.
    async fn find_usable_enroll_token(
        &self,
        tenant: &TenantId,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<EnrollToken>>;

    /// Consume the token. Atomic: returns `false` when another register call
    /// got there first (or the token was already spent).
    async fn mark_enroll_token_used(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool>;

    async fn insert_agent(&self, agent: &Agent) -> Result<()>;

    async fn get_agent(&self, tenant: &TenantId, id: Uuid) -> Result<Option<Agent>>;

    /// Bump `last_seen` and force status back to `online`.
    async fn touch_agent(&self, tenant: &TenantId, id: Uuid, now: DateTime<Utc>) -> Result<()>;

    async fn list_agents(&self, tenant: &TenantId) -> Result<Vec<Agent>>;
}
