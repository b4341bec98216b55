//! Agent registry and credentialing.
//!
//! Enrollment tokens and agent keys are random 256-bit values handed out
//! exactly once; only their SHA-256 hex digests are stored. Authentication
//! failures are uniform — the caller cannot tell whether the id or the key
//! was wrong.

use chrono::{Duration, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};
use tracing::info;
use uuid::Uuid;

use pentra_model::{Agent, AgentStatus, EnrollToken, TenantId};

use crate::error::{CoreError, Result};
use crate::store::Store;

pub fn sha256_hex(value: &str) -> String {
    format!("{:x}", Sha256::digest(value.as_bytes()))
}

/// 64 hex chars of fresh randomness, used for both enrollment tokens and
/// agent keys.
fn generate_secret() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

#[derive(Clone)]
pub struct AgentRegistry {
    store: Store,
}

impl AgentRegistry {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Mint a single-use enrollment token. The raw token is returned here and
    /// never again.
    pub async fn create_enroll_token(
        &self,
        tenant: &TenantId,
        name: &str,
        ttl: Duration,
    ) -> Result<(Uuid, String)> {
        let raw = generate_secret();
        let token = EnrollToken {
            id: Uuid::new_v4(),
            tenant_id: tenant.clone(),
            name: name.to_string(),
            token_hash: sha256_hex(&raw),
            expires_at: Utc::now() + ttl,
            used_at: None,
            created_at: Utc::now(),
        };
        self.store.agents.insert_enroll_token(&token).await?;
        info!(tenant = %tenant, token_id = %token.id, "enrollment token created");
        Ok((token.id, raw))
    }

    /// Exchange a valid enrollment token for agent credentials. The token is
    /// consumed even if the caller loses the response; re-enrollment needs a
    /// fresh token.
    pub async fn register(
        &self,
        tenant: &TenantId,
        enroll_token: &str,
        name: &str,
        kind: &str,
    ) -> Result<(Uuid, String)> {
        let now = Utc::now();
        let token = self
            .store
            .agents
            .find_usable_enroll_token(tenant, &sha256_hex(enroll_token), now)
            .await?
            .ok_or(CoreError::Auth)?;

        // Claim the token before creating the agent so two concurrent
        // registrations with the same token cannot both succeed.
        if !self
            .store
            .agents
            .mark_enroll_token_used(token.id, now)
            .await?
        {
            return Err(CoreError::Auth);
        }

        let agent_key = generate_secret();
        let agent = Agent {
            id: Uuid::new_v4(),
            tenant_id: tenant.clone(),
            name: name.to_string(),
            kind: kind.to_string(),
            status: AgentStatus::Online,
            agent_key_hash: sha256_hex(&agent_key),
            last_seen: now,
            created_at: now,
        };
        self.store.agents.insert_agent(&agent).await?;

        info!(tenant = %tenant, agent_id = %agent.id, kind, "agent registered");
        Ok((agent.id, agent_key))
    }

    /// Verify credentials and bump liveness. Every authenticated agent call
    /// goes through here, so a heartbeat is just authentication.
    pub async fn authenticate(
        &self,
        tenant: &TenantId,
        agent_id: Uuid,
        agent_key: &str,
    ) -> Result<Agent> {
        let agent = self
            .store
            .agents
            .get_agent(tenant, agent_id)
            .await?
            .ok_or(CoreError::Auth)?;

        if agent.agent_key_hash != sha256_hex(agent_key) {
            return Err(CoreError::Auth);
        }

        self.store
            .agents
            .touch_agent(tenant, agent_id, Utc::now())
            .await?;
        Ok(agent)
    }

    pub async fn heartbeat(
        &self,
        tenant: &TenantId,
        agent_id: Uuid,
        agent_key: &str,
    ) -> Result<()> {
        self.authenticate(tenant, agent_id, agent_key).await?;
        Ok(())
    }

    pub async fn list_agents(&self, tenant: &TenantId) -> Result<Vec<Agent>> {
        self.store.agents.list_agents(tenant).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> AgentRegistry {
        AgentRegistry::new(Store::memory())
    }

    #[tokio::test]
    async fn register_with_valid_token_returns_credentials() {
        let registry = registry();
        let tenant = TenantId::from("t1");
        let (_, raw) = registry
            .create_enroll_token(&tenant, "scanner", Duration::days(1))
            .await
            .unwrap();

        let (agent_id, agent_key) = registry
            .register(&tenant, &raw, "edge-1", "nmap")
            .await
            .unwrap();
        assert_eq!(agent_key.len(), 64);

        let agent = registry
            .authenticate(&tenant, agent_id, &agent_key)
            .await
            .unwrap();
        assert_eq!(agent.kind, "nmap");
        assert_eq!(agent.status, AgentStatus::Online);
    }

    #[tokio::test]
    async fn enrollment_tokens_are_single_use() {
        let registry = registry();
        let tenant = TenantId::from("t1");
        let (_, raw) = registry
            .create_enroll_token(&tenant, "scanner", Duration::days(1))
            .await
            .unwrap();

        registry
            .register(&tenant, &raw, "edge-1", "nmap")
            .await
            .unwrap();
        let second = registry.register(&tenant, &raw, "edge-2", "nmap").await;
        assert!(matches!(second, Err(CoreError::Auth)));
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let registry = registry();
        let tenant = TenantId::from("t1");
        let (_, raw) = registry
            .create_enroll_token(&tenant, "scanner", Duration::seconds(-1))
            .await
            .unwrap();

        let result = registry.register(&tenant, &raw, "edge-1", "nmap").await;
        assert!(matches!(result, Err(CoreError::Auth)));
    }

    #[tokio::test]
    async fn bad_key_and_unknown_agent_fail_identically() {
        let registry = registry();
        let tenant = TenantId::from("t1");
        let (_, raw) = registry
            .create_enroll_token(&tenant, "scanner", Duration::days(1))
            .await
            .unwrap();
        let (agent_id, _) = registry
            .register(&tenant, &raw, "edge-1", "nmap")
            .await
            .unwrap();

        let bad_key = registry.authenticate(&tenant, agent_id, "wrong").await;
        let unknown = registry
            .authenticate(&tenant, Uuid::new_v4(), "wrong")
            .await;
        assert_eq!(
            bad_key.unwrap_err().to_string(),
            unknown.unwrap_err().to_string()
        );
    }

    #[tokio::test]
    async fn credentials_are_tenant_scoped() {
        let registry = registry();
        let (_, raw) = registry
            .create_enroll_token(&TenantId::from("t1"), "scanner", Duration::days(1))
            .await
            .unwrap();
        let (agent_id, agent_key) = registry
            .register(&TenantId::from("t1"), &raw, "edge-1", "nmap")
            .await
            .unwrap();

        let cross_tenant = registry
            .authenticate(&TenantId::from("t2"), agent_id, &agent_key)
            .await;
        assert!(matches!(cross_tenant, Err(CoreError::Auth)));
    }
}
