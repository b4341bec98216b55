//! Background recovery monitors.
//!
//! Two independent periodic tasks share the store with the request path but
//! never block it: a stuck-job sweep that reclaims expired leases, and a
//! run-duration sweep that hard-fails runs past the global ceiling. Both are
//! cancellable via a shared `CancellationToken` and finish their in-flight
//! sweep before exiting.

use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::store::Store;
use crate::store::ports::StuckSweep;

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub job_sweep_period: StdDuration,
    /// A job assigned longer ago than this without completing is stuck.
    pub stuck_threshold: Duration,
    /// Must match the queue's lease duration; `lease_expires_at` trails
    /// assignment time by exactly this much.
    pub lease_duration: Duration,
    pub run_sweep_period: StdDuration,
    pub max_run_duration: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            job_sweep_period: StdDuration::from_secs(30),
            stuck_threshold: Duration::minutes(30),
            lease_duration: Duration::minutes(5),
            run_sweep_period: StdDuration::from_secs(60),
            max_run_duration: Duration::hours(2),
        }
    }
}

#[derive(Clone)]
pub struct SchedulerMonitor {
    store: Store,
    config: MonitorConfig,
    cancel: CancellationToken,
}

impl SchedulerMonitor {
    pub fn new(store: Store, config: MonitorConfig, cancel: CancellationToken) -> Self {
        Self {
            store,
            config,
            cancel,
        }
    }

    /// Spawn both monitor loops. Dropping the handles does not stop them;
    /// cancel the token and await the handles to drain.
    pub fn spawn(self) -> Vec<JoinHandle<()>> {
        let jobs = {
            let monitor = self.clone();
            tokio::spawn(async move { monitor.job_monitor().await })
        };
        let runs = tokio::spawn(async move { self.run_monitor().await });
        vec![jobs, runs]
    }

    async fn job_monitor(&self) {
        info!("stuck-job monitor started");
        let mut interval = tokio::time::interval(self.config.job_sweep_period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // First tick fires immediately; swallow it so sweeps are periodic
        // from startup rather than racing it.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = interval.tick() => {}
            }
            if let Err(e) = self.sweep_stuck_jobs().await {
                error!("stuck-job sweep failed: {e}");
            }
        }
        info!("stuck-job monitor stopped");
    }

    async fn run_monitor(&self) {
        info!("run-duration monitor started");
        let mut interval = tokio::time::interval(self.config.run_sweep_period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = interval.tick() => {}
            }
            if let Err(e) = self.sweep_overrunning_runs().await {
                error!("run-duration sweep failed: {e}");
            }
        }
        info!("run-duration monitor stopped");
    }

    /// One stuck-job pass. A job counts as stuck when its assignment time —
    /// `lease_expires_at` minus the lease duration — is older than the stuck
    /// threshold.
    pub async fn sweep_stuck_jobs(&self) -> Result<StuckSweep> {
        let stuck_before =
            Utc::now() - self.config.stuck_threshold + self.config.lease_duration;
        let sweep = self.store.jobs.sweep_stuck(stuck_before).await?;

        for job_id in &sweep.requeued {
            warn!(job_id = %job_id, "job appears stuck, resetting to queued");
        }
        for job_id in &sweep.failed {
            warn!(job_id = %job_id, "stuck job exhausted max attempts, failing");
        }
        Ok(sweep)
    }

    /// One run-duration pass: hard ceiling independent of per-job retries.
    pub async fn sweep_overrunning_runs(&self) -> Result<Vec<uuid::Uuid>> {
        let started_before = Utc::now() - self.config.max_run_duration;
        let failed = self
            .store
            .runs
            .fail_overrunning(started_before, "run exceeded maximum duration", Utc::now())
            .await?;

        for run_id in &failed {
            warn!(run_id = %run_id, "run exceeded maximum duration, failing");
        }
        Ok(failed)
    }
}
