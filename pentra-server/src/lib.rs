//! # Pentra Server
//!
//! Multi-tenant orchestration service for a fleet of security-testing
//! agents.
//!
//! ## Overview
//!
//! The server exposes the agent bus — enrollment, heartbeat, job leasing,
//! completion, progress events, artifact upload — plus operator endpoints
//! for creating and executing runs. Background monitors recover stuck jobs
//! and cap run durations, and the `orchestrate` CLI mode drives a full
//! phase-orchestrated test through a decision provider.
//!
//! ## Architecture
//!
//! Built on Axum with PostgreSQL for persistent storage (an in-memory store
//! backs demo mode and tests). All domain logic lives in `pentra-core`; this
//! crate is the HTTP surface, configuration, and process wiring.

pub mod agents;
pub mod db;
pub mod errors;
pub mod infra;
pub mod jobs;
pub mod middleware;
pub mod routes;
pub mod runs;

#[cfg(test)]
mod tests;

pub use infra::app_state::AppState;
pub use infra::config::Config;
