//! Repository ports for the persistent entities.
//!
//! One trait per aggregate, implemented by the Postgres adapter (canonical)
//! and the in-memory adapter (tests, demo mode). Handlers and services only
//! ever see these traits.

pub mod agents;
pub mod artifacts;
pub mod findings;
pub mod jobs;
pub mod runs;

pub use agents::AgentsRepository;
pub use artifacts::ArtifactsRepository;
pub use findings::FindingsRepository;
pub use jobs::{JobsRepository, StuckSweep};
pub use runs::RunsRepository;
