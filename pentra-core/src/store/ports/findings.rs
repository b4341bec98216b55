use async_trait::async_trait;
use uuid::Uuid;

use pentra_model::{Finding, TenantId};

use crate::error::Result;

#[async_trait]
pub trait FindingsRepository: Send + Sync {
    /// Earliest non-false-positive finding with this hash in the engagement,
    /// if any. Used for dedup before insert.
    async fn find_by_hash(
        &self,
        tenant: &TenantId,
        engagement_id: Uuid,
        hash: &str,
    ) -> Result<Option<Finding>>;

    async fn insert(&self, finding: &Finding) -> Result<()>;

    async fn for_run(&self, tenant: &TenantId, run_id: Uuid) -> Result<Vec<Finding>>;
}
