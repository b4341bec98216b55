use async_trait::async_trait;
use uuid::Uuid;

use pentra_model::{Artifact, TenantId};

use crate::error::Result;

// Artifact rows only; the blob itself goes to the evidence directory and is
// treated as an opaque sink.
#[async_trait]
pub trait ArtifactsRepository: Send + Sync {
    async fn insert(&self, artifact: &Artifact) -> Result<()>;

    async fn for_run(&self, tenant: &TenantId, run_id: Uuid) -> Result<Vec<Artifact>>;
}
