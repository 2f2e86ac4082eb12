//! Aggregated view of the activity stream

use serde::Serialize;
use std::collections::{HashMap, VecDeque};

use crate::activity::{Activity, Status};

/// Number of recent error samples kept for reporting
pub const ERROR_SAMPLE_LIMIT: usize = 20;

/// Event totals per status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub active: u64,
    pub inactive: u64,
    pub launch_failed: u64,
    pub error: u64,
    pub action: u64,
}

impl StatusCounts {
    fn bump(&mut self, status: Status) {
        match status {
            Status::Active => self.active += 1,
            Status::Inactive => self.inactive += 1,
            Status::LaunchFailed => self.launch_failed += 1,
            Status::Error => self.error += 1,
            Status::Action => self.action += 1,
        }
    }

    pub fn get(&self, status: Status) -> u64 {
        match status {
            Status::Active => self.active,
            Status::Inactive => self.inactive,
            Status::LaunchFailed => self.launch_failed,
            Status::Error => self.error,
            Status::Action => self.action,
        }
    }
}

/// Recent failure kept for the operator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorSample {
    pub id: usize,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
}

/// What one worker has reported so far
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    /// `Active` or `LaunchFailed`, whichever came first
    pub launch: Option<Status>,
    pub last: Option<Status>,
    pub actions: u64,
    pub errors: u64,
}

/// Live aggregate of a run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    pub counts: StatusCounts,
    /// Workers that went active and have not gone inactive
    pub workers_active: usize,
    pub recent_errors: VecDeque<ErrorSample>,
    /// Events lost to a full activity channel
    pub dropped: u64,
    #[serde(skip)]
    pub workers: HashMap<usize, WorkerStats>,
}

impl RunStats {
    pub fn record(&mut self, activity: &Activity) {
        self.counts.bump(activity.status);

        let worker = self.workers.entry(activity.id).or_default();
        let was_active =
            worker.launch == Some(Status::Active) && worker.last != Some(Status::Inactive);
        worker.last = Some(activity.status);

        match activity.status {
            Status::Active | Status::LaunchFailed => {
                if worker.launch.is_none() {
                    worker.launch = Some(activity.status);
                    if activity.status == Status::Active {
                        self.workers_active += 1;
                    }
                }
            }
            Status::Inactive => {
                if was_active {
                    self.workers_active = self.workers_active.saturating_sub(1);
                }
            }
            Status::Action => worker.actions += 1,
            Status::Error => {
                worker.errors += 1;
                if self.recent_errors.len() == ERROR_SAMPLE_LIMIT {
                    self.recent_errors.pop_front();
                }
                self.recent_errors.push_back(ErrorSample {
                    id: activity.id,
                    message: activity.message.clone(),
                    err: activity.err.as_ref().map(|e| e.to_string()),
                });
            }
        }
    }

    pub fn worker(&self, id: usize) -> Option<&WorkerStats> {
        self.workers.get(&id)
    }

    /// Errors as a fraction of attempted actions
    pub fn error_rate(&self) -> f64 {
        let attempts = self.counts.action + self.counts.error;
        if attempts > 0 {
            self.counts.error as f64 / attempts as f64
        } else {
            0.0
        }
    }

    /// One-line progress report
    pub fn report_line(&self) -> String {
        format!(
            "active={} launch_failed={} inactive={} actions={} errors={} error_rate={:.2}% dropped={}",
            self.workers_active,
            self.counts.launch_failed,
            self.counts.inactive,
            self.counts.action,
            self.counts.error,
            self.error_rate() * 100.0,
            self.dropped
        )
    }
}
