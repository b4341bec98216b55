use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::TenantId;

/// Liveness state of a worker agent.
///
/// `Offline` is inferred from `last_seen` age by observers; the monitor never
/// writes it back as a timeout transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Online,
    Busy,
    Offline,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Online => "online",
            AgentStatus::Busy => "busy",
            AgentStatus::Offline => "offline",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "online" => Some(AgentStatus::Online),
            "busy" => Some(AgentStatus::Busy),
            "offline" => Some(AgentStatus::Offline),
            _ => None,
        }
    }
}

/// A registered worker agent.
///
/// Created by successful enrollment and never deleted. The raw agent key is
/// returned to the caller exactly once at registration; only its SHA-256 hex
/// digest is stored here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub name: String,
    /// Capability class, e.g. `nmap`, `nuclei`, `zap`, `cross_platform`.
    pub kind: String,
    pub status: AgentStatus,
    #[serde(skip_serializing)]
    pub agent_key_hash: String,
    pub last_seen: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Single-use enrollment token.
///
/// Stored hashed; `used_at` is set the moment a register call consumes it.
#[derive(Debug, Clone)]
pub struct EnrollToken {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub name: String,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl EnrollToken {
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.used_at.is_none() && self.expires_at > now
    }
}
