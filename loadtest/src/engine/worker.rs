//! Supervised execution of one behavior plan

use futures_util::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use tokio::task::JoinHandle;
use tracing::{Instrument, error, info_span};

use super::stop::StopSignal;
use crate::activity::{Activity, ActivitySender};
use crate::error::EngineError;
use crate::platform::PlatformError;
use crate::plan::BehaviorPlan;

/// Message of the `Error` activity emitted for a caught panic
pub const FAULT_MESSAGE: &str = "Error caught unexpected (worker failed)";

/// Message of the `LaunchFailed` emitted when a panic hits before launch
pub const LAUNCH_FAULT_MESSAGE: &str = "Failed launch: worker fault";

/// How a worker's task ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerExit {
    /// The plan returned `false`: stopped, or never launched
    Completed,
    /// The plan returned `true` after a terminal failure
    Failed,
    /// The plan panicked and the fault was reported
    Panicked,
    /// The task was cancelled before it finished
    Aborted,
}

/// One virtual user running on its own task
pub struct Worker {
    id: usize,
    stop: StopSignal,
    handle: JoinHandle<WorkerExit>,
    exit: Option<WorkerExit>,
}

impl Worker {
    /// Spawn `plan` on a new task behind a panic boundary
    pub fn spawn(mut plan: Box<dyn BehaviorPlan>, activity: ActivitySender) -> Self {
        let id = plan.id();
        let stop = plan.stop_signal();

        let task = async move {
            let outcome = AssertUnwindSafe(plan.start()).catch_unwind().await;
            let launched = plan.launch_reported();
            drop(plan);

            match outcome {
                Ok(false) => WorkerExit::Completed,
                Ok(true) => WorkerExit::Failed,
                Err(payload) => {
                    let err = classify_panic(payload);
                    error!(worker = id, error = %err, "Worker panicked");
                    activity.send(Activity::error(id, FAULT_MESSAGE, err)).await;
                    // A worker that never launched still owes its launch outcome
                    let last = if launched {
                        Activity::inactive(id)
                    } else {
                        Activity::launch_failed(id, LAUNCH_FAULT_MESSAGE)
                    };
                    activity.send(last).await;
                    WorkerExit::Panicked
                }
            }
        };

        let handle = tokio::spawn(task.instrument(info_span!("worker", id)));
        Self {
            id,
            stop,
            handle,
            exit: None,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Request a stop. Safe to repeat and to call after the worker ended.
    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn is_finished(&self) -> bool {
        self.exit.is_some() || self.handle.is_finished()
    }

    /// Wait for the task to end. Cancel-safe: can be retried after a timeout.
    pub async fn join(&mut self) -> WorkerExit {
        if let Some(exit) = self.exit {
            return exit;
        }

        let exit = match (&mut self.handle).await {
            Ok(exit) => exit,
            Err(e) if e.is_panic() => WorkerExit::Panicked,
            Err(_) => WorkerExit::Aborted,
        };
        self.exit = Some(exit);
        exit
    }

    /// Cancel the task outright
    pub fn abort(&self) {
        self.handle.abort();
    }
}

/// Turn a panic payload into a reportable error
pub fn classify_panic(payload: Box<dyn Any + Send>) -> EngineError {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        EngineError::Fault(msg.to_string())
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        EngineError::Fault(msg.clone())
    } else if let Some(err) = payload.downcast_ref::<PlatformError>() {
        EngineError::Platform(err.clone())
    } else if let Some(err) = payload.downcast_ref::<EngineError>() {
        err.clone()
    } else {
        EngineError::Fault("unknown panic".to_string())
    }
}
