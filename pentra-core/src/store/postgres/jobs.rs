use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use pentra_model::{Job, JobEvent, JobStatus, TenantId};

use crate::error::{CoreError, Result};
use crate::store::not_found;
use crate::store::ports::{JobsRepository, StuckSweep};
use crate::store::postgres::parse_status;

#[derive(Debug, Clone)]
pub struct PostgresJobsRepository {
    pool: PgPool,
}

impl PostgresJobsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }
}

const JOB_COLUMNS: &str = r#"
    id, tenant_id, run_id, adapter, params, status, leased_by,
    lease_expires_at, attempts, max_attempts, result, error_message, created_at
"#;

#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    tenant_id: String,
    run_id: Uuid,
    adapter: String,
    params: Value,
    status: String,
    leased_by: Option<Uuid>,
    lease_expires_at: Option<DateTime<Utc>>,
    attempts: i32,
    max_attempts: i32,
    result: Option<Value>,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
}

impl JobRow {
    fn into_job(self) -> Result<Job> {
        let status = parse_status(&self.status, JobStatus::parse, "job status")?;
        Ok(Job {
            id: self.id,
            tenant_id: TenantId(self.tenant_id),
            run_id: self.run_id,
            adapter: self.adapter,
            params: self.params,
            status,
            leased_by: self.leased_by,
            lease_expires_at: self.lease_expires_at,
            attempts: self.attempts,
            max_attempts: self.max_attempts,
            result: self.result,
            error_message: self.error_message,
            created_at: self.created_at,
        })
    }
}

#[async_trait]
impl JobsRepository for PostgresJobsRepository {
    async fn insert(&self, job: &Job) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO jobs (id, tenant_id, run_id, adapter, params, status, leased_by,
                              lease_expires_at, attempts, max_attempts, result, error_message, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(job.id)
        .bind(job.tenant_id.as_str())
        .bind(job.run_id)
        .bind(&job.adapter)
        .bind(&job.params)
        .bind(job.status.as_str())
        .bind(job.leased_by)
        .bind(job.lease_expires_at)
        .bind(job.attempts)
        .bind(job.max_attempts)
        .bind(&job.result)
        .bind(&job.error_message)
        .bind(job.created_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn get(&self, tenant: &TenantId, id: Uuid) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE tenant_id = $1 AND id = $2"
        ))
        .bind(tenant.as_str())
        .bind(id)
        .fetch_optional(self.pool())
        .await?;

        row.map(JobRow::into_job).transpose()
    }

    async fn claim_next_queued(
        &self,
        tenant: &TenantId,
        agent_id: Uuid,
        kinds: Option<&[String]>,
        lease_expires_at: DateTime<Utc>,
    ) -> Result<Option<Job>> {
        // Single conditional update over a locked sub-select; SKIP LOCKED
        // keeps concurrent claimers from ever seeing the same candidate row.
        let kinds: Option<Vec<String>> = kinds.map(|kinds| {
            kinds
                .iter()
                .map(|kind| kind.to_ascii_lowercase())
                .collect()
        });

        let row = sqlx::query_as::<_, JobRow>(&format!(
            r#"
            UPDATE jobs
            SET status = 'leased', leased_by = $2, lease_expires_at = $3
            WHERE id = (
                SELECT id FROM jobs
                WHERE tenant_id = $1
                  AND status = 'queued'
                  AND ($4::text[] IS NULL OR lower(split_part(adapter, '_', 1)) = ANY($4))
                ORDER BY created_at ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(tenant.as_str())
        .bind(agent_id)
        .bind(lease_expires_at)
        .bind(kinds)
        .fetch_optional(self.pool())
        .await?;

        row.map(JobRow::into_job).transpose()
    }

    async fn complete(
        &self,
        tenant: &TenantId,
        id: Uuid,
        agent_id: Uuid,
        status: JobStatus,
        result: Option<Value>,
    ) -> Result<Job> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            r#"
            UPDATE jobs
            SET status = $4, result = $5, leased_by = NULL, lease_expires_at = NULL
            WHERE tenant_id = $1
              AND id = $2
              AND leased_by = $3
              AND status IN ('leased', 'running')
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(tenant.as_str())
        .bind(id)
        .bind(agent_id)
        .bind(status.as_str())
        .bind(&result)
        .fetch_optional(self.pool())
        .await?;

        match row {
            Some(row) => row.into_job(),
            None => {
                // Disambiguate for the caller: unknown job vs lost lease.
                let exists = sqlx::query_scalar::<_, i64>(
                    "SELECT COUNT(*) FROM jobs WHERE tenant_id = $1 AND id = $2",
                )
                .bind(tenant.as_str())
                .bind(id)
                .fetch_one(self.pool())
                .await?;
                if exists == 0 {
                    Err(not_found("job", id))
                } else {
                    Err(CoreError::LeaseConflict(format!(
                        "job {id} is not leased by the calling agent"
                    )))
                }
            }
        }
    }

    async fn for_run(&self, tenant: &TenantId, run_id: Uuid) -> Result<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE tenant_id = $1 AND run_id = $2 ORDER BY created_at ASC"
        ))
        .bind(tenant.as_str())
        .bind(run_id)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(JobRow::into_job).collect()
    }

    async fn sweep_stuck(&self, stuck_before: DateTime<Utc>) -> Result<StuckSweep> {
        let mut tx = self.pool.begin().await?;

        // Exhausted jobs go terminal first so the requeue pass below only
        // sees jobs that still have attempts left.
        let failed: Vec<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE jobs
            SET attempts = attempts + 1,
                status = 'failed',
                error_message = 'max attempts reached',
                leased_by = NULL,
                lease_expires_at = NULL
            WHERE status IN ('leased', 'running')
              AND lease_expires_at < $1
              AND attempts + 1 >= max_attempts
            RETURNING id
            "#,
        )
        .bind(stuck_before)
        .fetch_all(&mut *tx)
        .await?;

        let requeued: Vec<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE jobs
            SET attempts = attempts + 1,
                status = 'queued',
                leased_by = NULL,
                lease_expires_at = NULL
            WHERE status IN ('leased', 'running')
              AND lease_expires_at < $1
            RETURNING id
            "#,
        )
        .bind(stuck_before)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(StuckSweep { requeued, failed })
    }

    async fn append_event(&self, event: &JobEvent) -> Result<()> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO job_events (id, tenant_id, job_id, type, payload, created_at)
            SELECT $1, $2, $3, $4, $5, $6
            WHERE EXISTS (SELECT 1 FROM jobs WHERE tenant_id = $2 AND id = $3)
            "#,
        )
        .bind(event.id)
        .bind(event.tenant_id.as_str())
        .bind(event.job_id)
        .bind(&event.event_type)
        .bind(&event.payload)
        .bind(event.created_at)
        .execute(self.pool())
        .await?;

        if inserted.rows_affected() == 0 {
            return Err(not_found("job", event.job_id));
        }
        Ok(())
    }

    async fn events_for(&self, tenant: &TenantId, job_id: Uuid) -> Result<Vec<JobEvent>> {
        #[derive(sqlx::FromRow)]
        struct EventRow {
            id: Uuid,
            tenant_id: String,
            job_id: Uuid,
            #[sqlx(rename = "type")]
            event_type: String,
            payload: Value,
            created_at: DateTime<Utc>,
        }

        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT id, tenant_id, job_id, type, payload, created_at
            FROM job_events
            WHERE tenant_id = $1 AND job_id = $2
            ORDER BY created_at ASC
            "#,
        )
        .bind(tenant.as_str())
        .bind(job_id)
        .fetch_all(self.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| JobEvent {
                id: row.id,
                tenant_id: TenantId(row.tenant_id),
                job_id: row.job_id,
                event_type: row.event_type,
                payload: row.payload,
                created_at: row.created_at,
            })
            .collect())
    }
}
