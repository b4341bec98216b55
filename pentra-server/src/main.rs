//! # Pentra Server
//!
//! Multi-tenant security-testing orchestrator.
//!
//! ## Overview
//!
//! - **Agent bus**: enrollment, heartbeat, atomic job leasing, completion,
//!   progress events, artifact upload
//! - **Run lifecycle**: plan steps become jobs; completion and timeouts roll
//!   up into run status, statistics, and deduplicated findings
//! - **Recovery monitors**: stuck-lease reclamation and a hard run-duration
//!   ceiling
//! - **Phase orchestration**: a decision provider (heuristic or LLM-backed)
//!   drives a full multi-phase test via the `orchestrate` subcommand
//!
//! ## Architecture
//!
//! The server is built on Axum and uses PostgreSQL for persistent storage;
//! `--demo` swaps in the in-memory store for a dependency-free trial run.

use std::sync::Arc;

use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand};
use serde_json::{Map, Value};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use pentra_core::dispatch::{CommandDispatcher, DispatcherConfig};
use pentra_core::monitor::{MonitorConfig, SchedulerMonitor};
use pentra_core::orchestrator::{OrchestratorConfig, PhaseOrchestrator, create_session_run};
use pentra_core::provider::{DecisionProvider, FallbackProvider, HeuristicProvider, OpenAiProvider};
use pentra_core::store::Store;

use pentra_model::TenantId;

use pentra_server::{AppState, Config, db, routes};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "pentra-server")]
#[command(about = "Multi-tenant security-testing orchestrator with an authenticated agent bus")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(ClapArgs, Debug, Clone)]
struct ServeArgs {
    /// Server port (overrides config)
    #[arg(short, long, env = "SERVER_PORT")]
    port: Option<u16>,

    /// Server host (overrides config)
    #[arg(long, env = "SERVER_HOST")]
    host: Option<String>,

    /// Run with the in-memory store instead of PostgreSQL
    #[arg(long, env = "PENTRA_DEMO_MODE", default_value_t = false)]
    demo: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(subcommand)]
    Db(DbCommand),
    /// Run a phase-orchestrated penetration test session
    Orchestrate(OrchestrateArgs),
}

#[derive(Debug, Subcommand)]
enum DbCommand {
    /// Check connectivity and URL sanity, then exit
    Preflight,
    /// Apply database migrations and exit
    Migrate,
}

#[derive(ClapArgs, Debug, Clone)]
struct OrchestrateArgs {
    /// Tenant the session belongs to
    #[arg(long, env = "PENTRA_TENANT_ID")]
    tenant_id: String,

    /// Engagement to attach findings to (random if omitted)
    #[arg(long)]
    engagement_id: Option<Uuid>,

    /// Targets in scope
    #[arg(long, required = true, num_args = 1..)]
    targets: Vec<String>,

    /// Scope constraints as a JSON object
    #[arg(long, default_value = "{}")]
    scope: String,

    /// Safety cap on decision-loop iterations
    #[arg(long, default_value_t = 1000)]
    max_iterations: u32,

    /// Use the in-memory store (no database needed)
    #[arg(long, default_value_t = false)]
    demo: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Some(Command::Db(DbCommand::Preflight)) => run_db_preflight().await,
        Some(Command::Db(DbCommand::Migrate)) => run_db_migrate().await,
        Some(Command::Orchestrate(args)) => run_orchestrate(args).await,
        None => run_server(cli.serve).await,
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pentra_server=info,pentra_core=info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn run_db_preflight() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let pool = db::connect(&config.database_url).await?;
    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .context("database ping failed")?;
    info!("Database preflight passed");
    Ok(())
}

async fn run_db_migrate() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let pool = db::connect(&config.database_url).await?;
    db::migrate(&pool).await?;
    info!("Database migrations applied");
    Ok(())
}

async fn build_store(config: &Config, demo: bool) -> anyhow::Result<Store> {
    if demo {
        warn!("demo mode: using the in-memory store, nothing will persist");
        return Ok(Store::memory());
    }
    let pool = db::connect(&config.database_url).await?;
    db::migrate(&pool).await?;
    Ok(Store::postgres(pool))
}

fn build_provider(config: &Config) -> Arc<dyn DecisionProvider> {
    match config.provider.kind.as_str() {
        "openai" => {
            // LLM-backed providers always carry the heuristic fallback.
            let primary = Arc::new(OpenAiProvider::new(
                config.provider.base_url.clone(),
                config.provider.api_key.clone(),
                config.provider.model.clone(),
            ));
            Arc::new(FallbackProvider::new(primary))
        }
        _ => Arc::new(HeuristicProvider::new()),
    }
}

async fn run_server(args: ServeArgs) -> anyhow::Result<()> {
    let mut config = Config::from_env()?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = args.host {
        config.server.host = host;
    }

    let store = build_store(&config, args.demo).await?;
    let state = AppState::new(store.clone(), config.clone());

    // Background recovery loops; children of the root shutdown token.
    let monitor = SchedulerMonitor::new(
        store,
        MonitorConfig::default(),
        state.shutdown.child_token(),
    );
    let monitor_handles = monitor.spawn();

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("cannot bind {addr}"))?;
    info!("listening on {addr}");

    let shutdown = state.shutdown.clone();
    let app = routes::create_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    // Let the monitors drain their in-flight sweep.
    shutdown.cancel();
    for handle in monitor_handles {
        let _ = handle.await;
    }
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal(shutdown: tokio_util::sync::CancellationToken) {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
    shutdown.cancel();
}

async fn run_orchestrate(args: OrchestrateArgs) -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let store = build_store(&config, args.demo).await?;
    let state = AppState::new(store.clone(), config.clone());

    let tenant = TenantId::new(args.tenant_id);
    let engagement_id = args.engagement_id.unwrap_or_else(Uuid::new_v4);
    let scope: Map<String, Value> =
        serde_json::from_str(&args.scope).context("--scope must be a JSON object")?;

    let run = create_session_run(&store, &tenant, engagement_id).await?;
    info!(run_id = %run.id, engagement_id = %engagement_id, "orchestration session started");

    let dispatcher = CommandDispatcher::new(
        state.queue.clone(),
        tenant.clone(),
        run.id,
        DispatcherConfig::default(),
    );
    let orchestrator = PhaseOrchestrator::new(
        dispatcher,
        build_provider(&config),
        store.clone(),
        OrchestratorConfig {
            max_iterations: args.max_iterations,
            ..OrchestratorConfig::default()
        },
        state.shutdown.child_token(),
    );

    // Ctrl-C stops issuing commands; in-flight jobs run to their own
    // timeout.
    let cancel = state.shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        warn!("cancellation requested, finishing current iteration");
        cancel.cancel();
    });

    let mut ctx = pentra_model::PentestContext::new(engagement_id, args.targets, scope);
    let report = orchestrator.run(&mut ctx).await?;

    finalize_session_run(&store, &tenant, run.id).await;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Close out the session's grouping run with job statistics. Best effort;
/// the report already went to stdout.
async fn finalize_session_run(store: &Store, tenant: &TenantId, run_id: Uuid) {
    use pentra_model::{JobStatus, RunStatistics, RunStatus};

    let Ok(jobs) = store.jobs.for_run(tenant, run_id).await else {
        return;
    };
    let statistics = RunStatistics {
        total: jobs.len(),
        completed: jobs
            .iter()
            .filter(|job| job.status == JobStatus::Succeeded)
            .count(),
        failed: jobs
            .iter()
            .filter(|job| job.status == JobStatus::Failed)
            .count(),
        cancelled: jobs
            .iter()
            .filter(|job| job.status == JobStatus::Aborted)
            .count(),
    };
    if let Err(e) = store
        .runs
        .finalize(
            tenant,
            run_id,
            RunStatus::Completed,
            Some(statistics),
            None,
            chrono::Utc::now(),
        )
        .await
    {
        warn!(run_id = %run_id, "could not finalize orchestration run: {e}");
    }
}
