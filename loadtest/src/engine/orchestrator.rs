//! Run orchestration
//!
//! The orchestrator owns every worker of a run and the single reader of the
//! activity channel. Workers are never restarted: a failed worker stays
//! failed until the run ends.

use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{Instrument, Span, debug, info, info_span, warn};
use uuid::Uuid;

use super::stats::RunStats;
use super::worker::{Worker, WorkerExit};
use crate::activity::{Activity, ActivityReceiver, ActivitySender, Status, activity_channel};
use crate::config::Config;
use crate::error::PlanError;
use crate::plan::PlanFactory;

/// Upper bound on waiting for the monitor once every worker is gone
const MONITOR_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// How the workers of a run ended
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExitCounts {
    pub completed: usize,
    pub failed: usize,
    pub panicked: usize,
    pub aborted: usize,
}

impl ExitCounts {
    fn record(&mut self, exit: WorkerExit) {
        match exit {
            WorkerExit::Completed => self.completed += 1,
            WorkerExit::Failed => self.failed += 1,
            WorkerExit::Panicked => self.panicked += 1,
            WorkerExit::Aborted => self.aborted += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.completed + self.failed + self.panicked + self.aborted
    }
}

/// Final result of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub elapsed_secs: f64,
    pub workers: usize,
    pub exits: ExitCounts,
    pub stats: RunStats,
}

impl RunSummary {
    /// Print a human-readable report to stdout
    pub fn report(&self) {
        let counts = &self.stats.counts;

        println!();
        println!("═══════════════════════════════════════════════════════════════");
        println!(
            " LOAD TEST SUMMARY  run={}  elapsed={:.1}s",
            self.run_id, self.elapsed_secs
        );
        println!("═══════════════════════════════════════════════════════════════");
        println!();
        println!(
            " ─── Workers ({}) ──────────────────────────────────────────────",
            self.workers
        );
        println!("   Active:         {}", counts.active);
        println!("   Launch failed:  {}", counts.launch_failed);
        println!("   Inactive:       {}", counts.inactive);
        println!(
            "   Exits:          completed={} failed={} panicked={} aborted={}",
            self.exits.completed, self.exits.failed, self.exits.panicked, self.exits.aborted
        );
        println!();
        println!(" ─── Activity ──────────────────────────────────────────────────");
        println!("   Actions:        {}", counts.action);
        println!("   Errors:         {}", counts.error);
        println!("   Error rate:     {:.2}%", self.stats.error_rate() * 100.0);
        println!("   Dropped events: {}", self.stats.dropped);

        if !self.stats.recent_errors.is_empty() {
            println!();
            println!(" ─── Recent errors ─────────────────────────────────────────────");
            for sample in &self.stats.recent_errors {
                match &sample.err {
                    Some(err) => println!("   [{}] {}: {}", sample.id, sample.message, err),
                    None => println!("   [{}] {}", sample.id, sample.message),
                }
            }
        }

        println!();
        println!("═══════════════════════════════════════════════════════════════");
        println!();
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Owns the workers of one run
pub struct Orchestrator {
    config: Arc<Config>,
    run_id: Uuid,
    span: Span,
    activity: ActivitySender,
    monitor: JoinHandle<()>,
    stats: Arc<RwLock<RunStats>>,
    workers: Vec<Worker>,
    started_at: Instant,
}

impl Orchestrator {
    /// Create the activity channel and start its monitor.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: Arc<Config>) -> Self {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", %run_id);
        let (activity, rx) = activity_channel(
            config.run.activity_capacity,
            config.run.activity_overflow,
        );
        let stats = Arc::new(RwLock::new(RunStats::default()));
        let monitor = tokio::spawn(monitor(rx, stats.clone()).instrument(span.clone()));

        Self {
            config,
            run_id,
            span,
            activity,
            monitor,
            stats,
            workers: Vec::new(),
            started_at: Instant::now(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Run the factory's global setup, then spawn `users` workers.
    ///
    /// Ids continue after the workers already launched, so calling this
    /// twice never reuses an identity.
    pub async fn launch(
        &mut self,
        factory: &dyn PlanFactory,
        users: usize,
    ) -> Result<(), PlanError> {
        factory
            .global_setup()
            .instrument(self.span.clone())
            .await?;

        let _enter = self.span.enter();
        let first = self.workers.len();
        info!(
            plan = factory.name(),
            users,
            first_id = first,
            "Launching workers"
        );

        for id in first..first + users {
            let plan = factory.generate(id, self.activity.clone());
            self.workers.push(Worker::spawn(plan, self.activity.clone()));
        }
        Ok(())
    }

    /// Ask every worker to stop; does not wait
    pub fn stop_all(&self) {
        let _enter = self.span.enter();
        info!(workers = self.workers.len(), "Stopping all workers");
        for worker in &self.workers {
            worker.stop();
        }
    }

    /// Snapshot of the live statistics
    pub async fn stats(&self) -> RunStats {
        let mut stats = self.stats.read().await.clone();
        stats.dropped = self.activity.dropped();
        stats
    }

    /// Shared handle for periodic reporting
    pub fn stats_handle(&self) -> Arc<RwLock<RunStats>> {
        self.stats.clone()
    }

    /// Wait for every worker to end, aborting those still running once
    /// `grace` has elapsed, then drain the remaining activity.
    pub async fn join_all(self, grace: Duration) -> RunSummary {
        let Self {
            run_id,
            span,
            activity,
            mut monitor,
            stats,
            mut workers,
            started_at,
            ..
        } = self;

        let deadline = tokio::time::Instant::now() + grace;
        let mut exits = ExitCounts::default();
        for worker in &mut workers {
            let exit = match tokio::time::timeout_at(deadline, worker.join()).await {
                Ok(exit) => exit,
                Err(_) => {
                    span.in_scope(|| {
                        warn!(
                            worker = worker.id(),
                            "Worker still running after grace period, aborting"
                        )
                    });
                    worker.abort();
                    worker.join().await
                }
            };
            exits.record(exit);
        }

        let dropped = activity.dropped();
        drop(activity);
        if tokio::time::timeout(MONITOR_DRAIN_TIMEOUT, &mut monitor)
            .await
            .is_err()
        {
            span.in_scope(|| warn!("Activity monitor did not drain in time"));
            monitor.abort();
        }

        let mut stats = stats.read().await.clone();
        stats.dropped = dropped;
        metrics::gauge!("loadtest_workers_active").set(0.0);

        let summary = RunSummary {
            run_id,
            elapsed_secs: started_at.elapsed().as_secs_f64(),
            workers: workers.len(),
            exits,
            stats,
        };
        span.in_scope(|| {
            info!(
                completed = exits.completed,
                failed = exits.failed,
                panicked = exits.panicked,
                aborted = exits.aborted,
                "Run finished"
            )
        });
        summary
    }

    /// `stop_all` followed by `join_all`
    pub async fn shutdown(self, grace: Duration) -> RunSummary {
        self.stop_all();
        self.join_all(grace).await
    }
}

async fn monitor(mut rx: ActivityReceiver, stats: Arc<RwLock<RunStats>>) {
    while let Some(activity) = rx.recv().await {
        log_activity(&activity);

        let mut stats = stats.write().await;
        stats.record(&activity);
        stats.dropped = rx.dropped();
        metrics::gauge!("loadtest_workers_active").set(stats.workers_active as f64);
    }

    stats.write().await.dropped = rx.dropped();
    debug!("Activity channel closed");
}

fn log_activity(activity: &Activity) {
    let id = activity.id;
    match activity.status {
        Status::Error => match &activity.err {
            Some(err) => warn!(worker = id, error = %err, "{}", activity.message),
            None => warn!(worker = id, "{}", activity.message),
        },
        Status::LaunchFailed => warn!(worker = id, "{}", activity.message),
        Status::Active | Status::Inactive => info!(worker = id, "{}", activity.message),
        Status::Action => debug!(worker = id, "{}", activity.message),
    }
}
