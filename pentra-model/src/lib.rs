//! Core data model definitions shared across Pentra crates.
#![allow(missing_docs)]

pub mod agent;
pub mod command;
pub mod context;
pub mod finding;
pub mod ids;
pub mod job;
pub mod phase;
pub mod report;
pub mod run;

// Intentionally curated re-exports for downstream consumers.
pub use agent::{Agent, AgentStatus, EnrollToken};
pub use command::{AgentCommand, CommandRecord, Decision, PlanResponse};
pub use context::{
    CredentialRecord, DiscoveredService, ExploitRecord, IdentifiedVulnerability,
    PentestContext, TargetInfo,
};
pub use finding::{Artifact, Finding, Severity, finding_hash};
pub use ids::TenantId;
pub use job::{Job, JobEvent, JobStatus, adapter_kind};
pub use phase::TestPhase;
pub use report::{PentestReport, ReportFinding, RiskAssessment, RiskLevel};
pub use run::{Run, RunStatistics, RunStatus};
