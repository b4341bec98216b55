use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use pentra_model::{Run, RunStatistics, RunStatus, TenantId};

use crate::error::{CoreError, Result};
use crate::store::postgres::parse_status;
use crate::store::ports::RunsRepository;

#[derive(Debug, Clone)]
pub struct PostgresRunsRepository {
    pool: PgPool,
}

impl PostgresRunsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }
}

const RUN_COLUMNS: &str = r#"
    id, tenant_id, plan_id, engagement_id, status, progress,
    started_at, completed_at, statistics, error_message, created_at
"#;

#[derive(Debug, sqlx::FromRow)]
struct RunRow {
    id: Uuid,
    tenant_id: String,
    plan_id: Uuid,
    engagement_id: Uuid,
    status: String,
    progress: i32,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    statistics: Option<Value>,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
}

impl RunRow {
    fn into_run(self) -> Result<Run> {
        let status = parse_status(&self.status, RunStatus::parse, "run status")?;
        let statistics = self
            .statistics
            .map(serde_json::from_value::<RunStatistics>)
            .transpose()
            .map_err(|e| CoreError::Internal(format!("bad run statistics payload: {e}")))?;
        Ok(Run {
            id: self.id,
            tenant_id: TenantId(self.tenant_id),
            plan_id: self.plan_id,
            engagement_id: self.engagement_id,
            status,
            progress: self.progress,
            started_at: self.started_at,
            completed_at: self.completed_at,
            statistics,
            error_message: self.error_message,
            created_at: self.created_at,
        })
    }
}

#[async_trait]
impl RunsRepository for PostgresRunsRepository {
    async fn insert(&self, run: &Run) -> Result<()> {
        let statistics = run
            .statistics
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;
        sqlx::query(
            r#"
            INSERT INTO runs (id, tenant_id, plan_id, engagement_id, status, progress,
                              started_at, completed_at, statistics, error_message, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(run.id)
        .bind(run.tenant_id.as_str())
        .bind(run.plan_id)
        .bind(run.engagement_id)
        .bind(run.status.as_str())
        .bind(run.progress)
        .bind(run.started_at)
        .bind(run.completed_at)
        .bind(statistics)
        .bind(&run.error_message)
        .bind(run.created_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn get(&self, tenant: &TenantId, id: Uuid) -> Result<Option<Run>> {
        let row = sqlx::query_as::<_, RunRow>(&format!(
            "SELECT {RUN_COLUMNS} FROM runs WHERE tenant_id = $1 AND id = $2"
        ))
        .bind(tenant.as_str())
        .bind(id)
        .fetch_optional(self.pool())
        .await?;

        row.map(RunRow::into_run).transpose()
    }

    async fn mark_running(
        &self,
        tenant: &TenantId,
        id: Uuid,
        started_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE runs SET status = 'running', started_at = $3 WHERE tenant_id = $1 AND id = $2",
        )
        .bind(tenant.as_str())
        .bind(id)
        .bind(started_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn set_progress(&self, tenant: &TenantId, id: Uuid, progress: i32) -> Result<()> {
        sqlx::query("UPDATE runs SET progress = $3 WHERE tenant_id = $1 AND id = $2")
            .bind(tenant.as_str())
            .bind(id)
            .bind(progress.clamp(0, 100))
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn finalize(
        &self,
        tenant: &TenantId,
        id: Uuid,
        status: RunStatus,
        statistics: Option<RunStatistics>,
        error_message: Option<String>,
        completed_at: DateTime<Utc>,
    ) -> Result<()> {
        let statistics = statistics.map(serde_json::to_value).transpose()?;
        // Guarded on `running` so a run that already timed out stays failed.
        sqlx::query(
            r#"
            UPDATE runs
            SET status = $3,
                statistics = $4,
                error_message = $5,
                completed_at = $6,
                progress = CASE WHEN $3 = 'completed' THEN 100 ELSE progress END
            WHERE tenant_id = $1 AND id = $2 AND status = 'running'
            "#,
        )
        .bind(tenant.as_str())
        .bind(id)
        .bind(status.as_str())
        .bind(statistics)
        .bind(error_message)
        .bind(completed_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn fail_overrunning(
        &self,
        started_before: DateTime<Utc>,
        error_message: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Uuid>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE runs
            SET status = 'failed', error_message = $2, completed_at = $3
            WHERE status = 'running' AND started_at < $1
            RETURNING id
            "#,
        )
        .bind(started_before)
        .bind(error_message)
        .bind(now)
        .fetch_all(self.pool())
        .await?;
        Ok(ids)
    }
}
