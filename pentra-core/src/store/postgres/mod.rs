//! Postgres store adapter.
//!
//! Canonical deployment target. The lease claim uses a single conditional
//! `UPDATE … WHERE id = (SELECT … FOR UPDATE SKIP LOCKED)` so two concurrent
//! lease calls can never receive the same job.

mod agents;
mod artifacts;
mod findings;
mod jobs;
mod runs;

pub use agents::PostgresAgentsRepository;
pub use artifacts::PostgresArtifactsRepository;
pub use findings::PostgresFindingsRepository;
pub use jobs::PostgresJobsRepository;
pub use runs::PostgresRunsRepository;

use crate::error::{CoreError, Result};

/// Parse a TEXT status column into its enum, surfacing schema drift as an
/// internal error instead of a panic.
pub(crate) fn parse_status<T>(
    value: &str,
    parse: impl Fn(&str) -> Option<T>,
    column: &str,
) -> Result<T> {
    parse(value)
        .ok_or_else(|| CoreError::Internal(format!("unexpected {column} value `{value}` in database")))
}
