//! Storage layer: repository ports plus the Postgres and in-memory adapters.

pub mod memory;
pub mod ports;
pub mod postgres;

use std::sync::Arc;

use sqlx::PgPool;
use uuid::Uuid;

use pentra_model::Finding;

use crate::error::Result;
use ports::{
    AgentsRepository, ArtifactsRepository, FindingsRepository, JobsRepository, RunsRepository,
};

/// Aggregate handle over all repositories, injected into services and
/// handlers. One instance per process; constructed at startup.
#[derive(Clone)]
pub struct Store {
    pub agents: Arc<dyn AgentsRepository>,
    pub jobs: Arc<dyn JobsRepository>,
    pub runs: Arc<dyn RunsRepository>,
    pub findings: Arc<dyn FindingsRepository>,
    pub artifacts: Arc<dyn ArtifactsRepository>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

impl Store {
    /// Canonical Postgres-backed store.
    pub fn postgres(pool: PgPool) -> Self {
        Store {
            agents: Arc::new(postgres::PostgresAgentsRepository::new(pool.clone())),
            jobs: Arc::new(postgres::PostgresJobsRepository::new(pool.clone())),
            runs: Arc::new(postgres::PostgresRunsRepository::new(pool.clone())),
            findings: Arc::new(postgres::PostgresFindingsRepository::new(pool.clone())),
            artifacts: Arc::new(postgres::PostgresArtifactsRepository::new(pool)),
        }
    }

    /// In-memory store for tests and demo mode. Same contract, one mutex.
    pub fn memory() -> Self {
        let state = memory::shared_state();
        Store {
            agents: Arc::new(memory::MemoryAgentsRepository::new(state.clone())),
            jobs: Arc::new(memory::MemoryJobsRepository::new(state.clone())),
            runs: Arc::new(memory::MemoryRunsRepository::new(state.clone())),
            findings: Arc::new(memory::MemoryFindingsRepository::new(state.clone())),
            artifacts: Arc::new(memory::MemoryArtifactsRepository::new(state)),
        }
    }

    /// Insert a finding, stamping its dedup hash and resolving duplicates
    /// against existing non-false-positive findings in the same engagement.
    /// Returns the stored row (with `duplicate_of` set when matched).
    pub async fn record_finding(&self, finding: Finding) -> Result<Finding> {
        let mut finding = finding.with_hash();
        if finding.duplicate_of.is_none() {
            let existing = self
                .findings
                .find_by_hash(&finding.tenant_id, finding.engagement_id, &finding.hash)
                .await?;
            // A row never duplicates itself; hash lookup runs before insert.
            finding.duplicate_of = existing.map(|original| original.id);
        }
        self.findings.insert(&finding).await?;
        Ok(finding)
    }
}

/// Convenience for id-based `NotFound` messages.
pub(crate) fn not_found(entity: &str, id: Uuid) -> crate::error::CoreError {
    crate::error::CoreError::NotFound(format!("{entity} {id} not found"))
}
