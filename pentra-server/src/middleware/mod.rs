//! Request extractors for tenant scoping and agent authentication.
//!
//! Every route is tenant-scoped via the `X-Tenant-Id` header; agent-bus
//! routes additionally authenticate with the `X-Agent-Id`/`X-Agent-Key`
//! pair. Credential failures are uniform 401s that never reveal whether the
//! id or the key was wrong.

use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use pentra_model::{Agent, TenantId};

use crate::AppState;
use crate::errors::AppError;

pub const TENANT_HEADER: &str = "x-tenant-id";
pub const AGENT_ID_HEADER: &str = "x-agent-id";
pub const AGENT_KEY_HEADER: &str = "x-agent-key";

/// Tenant scope for the request, from `X-Tenant-Id`.
#[derive(Debug, Clone)]
pub struct Tenant(pub TenantId);

impl<S: Send + Sync> FromRequestParts<S> for Tenant {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        tenant_from_parts(parts).map(Tenant)
    }
}

/// Authenticated calling agent. Extraction verifies the key hash against the
/// registry and bumps the agent's liveness, so handlers using this never
/// re-check credentials.
#[derive(Debug, Clone)]
pub struct AuthedAgent {
    pub tenant: TenantId,
    pub agent: Agent,
}

impl FromRequestParts<AppState> for AuthedAgent {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let tenant = tenant_from_parts(parts)?;

        let agent_id = header_value(parts, AGENT_ID_HEADER)
            .and_then(|value| value.parse::<Uuid>().ok())
            .ok_or_else(unauthorized)?;
        let agent_key = header_value(parts, AGENT_KEY_HEADER).ok_or_else(unauthorized)?;

        let agent = state
            .registry
            .authenticate(&tenant, agent_id, &agent_key)
            .await
            .map_err(|_| unauthorized())?;

        Ok(AuthedAgent { tenant, agent })
    }
}

fn tenant_from_parts(parts: &Parts) -> Result<TenantId, AppError> {
    header_value(parts, TENANT_HEADER)
        .filter(|value| !value.is_empty())
        .map(TenantId::new)
        .ok_or_else(|| AppError::bad_request("missing X-Tenant-Id header"))
}

fn header_value(parts: &Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn unauthorized() -> AppError {
    AppError::unauthorized("invalid agent credentials")
}
