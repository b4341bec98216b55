use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use pentra_model::{Finding, Severity, TenantId};

use crate::error::Result;
use crate::store::ports::FindingsRepository;

#[derive(Debug, Clone)]
pub struct PostgresFindingsRepository {
    pool: PgPool,
}

impl PostgresFindingsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }
}

const FINDING_COLUMNS: &str = r#"
    id, tenant_id, run_id, engagement_id, job_id, title, category, severity,
    description, evidence, affected_hosts, affected_urls, hash,
    false_positive, duplicate_of, created_at
"#;

#[derive(Debug, sqlx::FromRow)]
struct FindingRow {
    id: Uuid,
    tenant_id: String,
    run_id: Uuid,
    engagement_id: Uuid,
    job_id: Option<Uuid>,
    title: String,
    category: String,
    severity: String,
    description: String,
    evidence: Value,
    affected_hosts: Vec<String>,
    affected_urls: Vec<String>,
    hash: String,
    false_positive: bool,
    duplicate_of: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl FindingRow {
    fn into_finding(self) -> Finding {
        Finding {
            id: self.id,
            tenant_id: TenantId(self.tenant_id),
            run_id: self.run_id,
            engagement_id: self.engagement_id,
            job_id: self.job_id,
            title: self.title,
            category: self.category,
            severity: Severity::parse_lossy(&self.severity),
            description: self.description,
            evidence: self.evidence,
            affected_hosts: self.affected_hosts,
            affected_urls: self.affected_urls,
            hash: self.hash,
            false_positive: self.false_positive,
            duplicate_of: self.duplicate_of,
            created_at: self.created_at,
        }
    }
}

#[async_trait]
impl FindingsRepository for PostgresFindingsRepository {
    async fn find_by_hash(
        &self,
        tenant: &TenantId,
        engagement_id: Uuid,
        hash: &str,
    ) -> Result<Option<Finding>> {
        let row = sqlx::query_as::<_, FindingRow>(&format!(
            r#"
            SELECT {FINDING_COLUMNS}
            FROM findings
            WHERE tenant_id = $1
              AND engagement_id = $2
              AND hash = $3
              AND false_positive = FALSE
            ORDER BY created_at ASC
            LIMIT 1
            "#
        ))
        .bind(tenant.as_str())
        .bind(engagement_id)
        .bind(hash)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(FindingRow::into_finding))
    }

    async fn insert(&self, finding: &Finding) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO findings (id, tenant_id, run_id, engagement_id, job_id, title, category,
                                  severity, description, evidence, affected_hosts, affected_urls,
                                  hash, false_positive, duplicate_of, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(finding.id)
        .bind(finding.tenant_id.as_str())
        .bind(finding.run_id)
        .bind(finding.engagement_id)
        .bind(finding.job_id)
        .bind(&finding.title)
        .bind(&finding.category)
        .bind(finding.severity.as_str())
        .bind(&finding.description)
        .bind(&finding.evidence)
        .bind(&finding.affected_hosts)
        .bind(&finding.affected_urls)
        .bind(&finding.hash)
        .bind(finding.false_positive)
        .bind(finding.duplicate_of)
        .bind(finding.created_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn for_run(&self, tenant: &TenantId, run_id: Uuid) -> Result<Vec<Finding>> {
        let rows = sqlx::query_as::<_, FindingRow>(&format!(
            r#"
            SELECT {FINDING_COLUMNS}
            FROM findings
            WHERE tenant_id = $1 AND run_id = $2
            ORDER BY created_at ASC
            "#
        ))
        .bind(tenant.as_str())
        .bind(run_id)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().map(FindingRow::into_finding).collect())
    }
}
