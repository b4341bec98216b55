use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use pentra_model::{Agent, AgentStatus, EnrollToken, TenantId};

use crate::error::Result;
use crate::store::ports::AgentsRepository;
use crate::store::postgres::parse_status;

#[derive(Debug, Clone)]
pub struct PostgresAgentsRepository {
    pool: PgPool,
}

impl PostgresAgentsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AgentRow {
    id: Uuid,
    tenant_id: String,
    name: String,
    kind: String,
    status: String,
    agent_key_hash: String,
    last_seen: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl AgentRow {
    fn into_agent(self) -> Result<Agent> {
        let status = parse_status(&self.status, AgentStatus::parse, "agent status")?;
        Ok(Agent {
            id: self.id,
            tenant_id: TenantId(self.tenant_id),
            name: self.name,
            kind: self.kind,
            status,
            agent_key_hash: self.agent_key_hash,
            last_seen: self.last_seen,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct EnrollTokenRow {
    id: Uuid,
    tenant_id: String,
    name: String,
    token_hash: String,
    expires_at: DateTime<Utc>,
    used_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl EnrollTokenRow {
    fn into_token(self) -> EnrollToken {
        EnrollToken {
            id: self.id,
            tenant_id: TenantId(self.tenant_id),
            name: self.name,
            token_hash: self.token_hash,
            expires_at: self.expires_at,
            used_at: self.used_at,
            created_at: self.created_at,
        }
    }
}

#[async_trait]
impl AgentsRepository for PostgresAgentsRepository {
    async fn insert_enroll_token(&self, token: &EnrollToken) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO enroll_tokens (id, tenant_id, name, token_hash, expires_at, used_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(token.id)
        .bind(token.tenant_id.as_str())
        .bind(&token.name)
        .bind(&token.token_hash)
        .bind(token.expires_at)
        .bind(token.used_at)
        .bind(token.created_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn find_usable_enroll_token(
        &self,
        tenant: &TenantId,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<EnrollToken>> {
        let row = sqlx::query_as::<_, EnrollTokenRow>(
            r#"
            SELECT id, tenant_id, name, token_hash, expires_at, used_at, created_at
            FROM enroll_tokens
            WHERE tenant_id = $1
              AND token_hash = $2
              AND used_at IS NULL
              AND expires_at > $3
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(tenant.as_str())
        .bind(token_hash)
        .bind(now)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(EnrollTokenRow::into_token))
    }

    async fn mark_enroll_token_used(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let updated =
            sqlx::query("UPDATE enroll_tokens SET used_at = $2 WHERE id = $1 AND used_at IS NULL")
                .bind(id)
                .bind(now)
                .execute(self.pool())
                .await?;
        Ok(updated.rows_affected() == 1)
    }

    async fn insert_agent(&self, agent: &Agent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO agents (id, tenant_id, name, kind, status, agent_key_hash, last_seen, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(agent.id)
        .bind(agent.tenant_id.as_str())
        .bind(&agent.name)
        .bind(&agent.kind)
        .bind(agent.status.as_str())
        .bind(&agent.agent_key_hash)
        .bind(agent.last_seen)
        .bind(agent.created_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn get_agent(&self, tenant: &TenantId, id: Uuid) -> Result<Option<Agent>> {
        let row = sqlx::query_as::<_, AgentRow>(
            r#"
            SELECT id, tenant_id, name, kind, status, agent_key_hash, last_seen, created_at
            FROM agents
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(tenant.as_str())
        .bind(id)
        .fetch_optional(self.pool())
        .await?;

        row.map(AgentRow::into_agent).transpose()
    }

    async fn touch_agent(&self, tenant: &TenantId, id: Uuid, now: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "UPDATE agents SET last_seen = $3, status = 'online' WHERE tenant_id = $1 AND id = $2",
        )
        .bind(tenant.as_str())
        .bind(id)
        .bind(now)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn list_agents(&self, tenant: &TenantId) -> Result<Vec<Agent>> {
        let rows = sqlx::query_as::<_, AgentRow>(
            r#"
            SELECT id, tenant_id, name, kind, status, agent_key_hash, last_seen, created_at
            FROM agents
            WHERE tenant_id = $1
            ORDER BY last_seen DESC
            LIMIT 200
            "#,
        )
        .bind(tenant.as_str())
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(AgentRow::into_agent).collect()
    }
}
