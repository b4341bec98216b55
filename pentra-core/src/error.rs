use thiserror::Error;

/// Error taxonomy for the queue, registry, and orchestrator.
///
/// Only `Timeout` (and a job exhausting its retry budget, which surfaces as
/// job state rather than an error) is terminal to its owning entity;
/// everything else is recoverable without operator intervention.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Bad or unknown agent/enrollment credentials. Deliberately carries no
    /// detail about which of id/key/token was wrong.
    #[error("invalid agent credentials")]
    Auth,

    #[error("not found: {0}")]
    NotFound(String),

    /// Job owned by another agent, or an ownership precondition failed.
    /// "No job available" is *not* an error; lease returns `None` for that.
    #[error("lease conflict: {0}")]
    LeaseConflict(String),

    #[error("timed out: {0}")]
    Timeout(String),

    /// Malformed request input (e.g. a non-terminal completion status).
    #[error("invalid request: {0}")]
    Invalid(String),

    /// Decision provider call failed; the orchestration session retries.
    #[error("decision provider error: {0}")]
    Provider(String),

    /// Tool output could not be parsed; that command's contribution to the
    /// context is skipped.
    #[error("parse error: {0}")]
    Parse(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
