use std::{fmt, sync::Arc};

use tokio_util::sync::CancellationToken;

use pentra_core::queue::{JobQueue, QueueConfig};
use pentra_core::registry::AgentRegistry;
use pentra_core::runs::{RunCoordinator, RunCoordinatorConfig};
use pentra_core::store::Store;

use crate::infra::config::Config;

/// Everything a request handler or background task needs, built once at
/// startup and injected explicitly — there is no global scheduler state.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub registry: AgentRegistry,
    pub queue: JobQueue,
    pub run_coordinator: RunCoordinator,
    pub config: Arc<Config>,
    /// Root shutdown token; background loops hold child tokens of this.
    pub shutdown: CancellationToken,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(store: Store, config: Config) -> Self {
        Self::with_run_coordinator_config(store, config, RunCoordinatorConfig::default())
    }

    /// Same wiring with a custom completion-poll cadence; tests shrink the
    /// periods to keep the suite fast.
    pub fn with_run_coordinator_config(
        store: Store,
        config: Config,
        run_config: RunCoordinatorConfig,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let queue = JobQueue::new(store.clone(), QueueConfig::default());
        let run_coordinator = RunCoordinator::new(
            store.clone(),
            queue.clone(),
            run_config,
            shutdown.child_token(),
        );
        AppState {
            registry: AgentRegistry::new(store.clone()),
            queue,
            run_coordinator,
            store,
            config: Arc::new(config),
            shutdown,
        }
    }
}
