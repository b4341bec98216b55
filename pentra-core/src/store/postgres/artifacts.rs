use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use pentra_model::{Artifact, TenantId};

use crate::error::Result;
use crate::store::ports::ArtifactsRepository;

#[derive(Debug, Clone)]
pub struct PostgresArtifactsRepository {
    pool: PgPool,
}

impl PostgresArtifactsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ArtifactRow {
    id: Uuid,
    tenant_id: String,
    run_id: Uuid,
    job_id: Uuid,
    kind: String,
    label: String,
    path: String,
    created_at: DateTime<Utc>,
}

impl ArtifactRow {
    fn into_artifact(self) -> Artifact {
        Artifact {
            id: self.id,
            tenant_id: TenantId(self.tenant_id),
            run_id: self.run_id,
            job_id: self.job_id,
            kind: self.kind,
            label: self.label,
            path: self.path,
            created_at: self.created_at,
        }
    }
}

#[async_trait]
impl ArtifactsRepository for PostgresArtifactsRepository {
    async fn insert(&self, artifact: &Artifact) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO artifacts (id, tenant_id, run_id, job_id, kind, label, path, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(artifact.id)
        .bind(artifact.tenant_id.as_str())
        .bind(artifact.run_id)
        .bind(artifact.job_id)
        .bind(&artifact.kind)
        .bind(&artifact.label)
        .bind(&artifact.path)
        .bind(artifact.created_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn for_run(&self, tenant: &TenantId, run_id: Uuid) -> Result<Vec<Artifact>> {
        let rows = sqlx::query_as::<_, ArtifactRow>(
            r#"
            SELECT id, tenant_id, run_id, job_id, kind, label, path, created_at
            FROM artifacts
            WHERE tenant_id = $1 AND run_id = $2
            ORDER BY created_at ASC
            "#,
        )
        .bind(tenant.as_str())
        .bind(run_id)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().map(ArtifactRow::into_artifact).collect())
    }
}
