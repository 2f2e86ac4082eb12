//! Worker status events and the channel that carries them
//!
//! Every worker holds a clone of `ActivitySender`; the orchestrator holds the
//! only `ActivityReceiver`. Events from one sender arrive in the order they
//! were sent.

use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

use crate::error::EngineError;

/// Default capacity of the activity channel
pub const DEFAULT_ACTIVITY_CAPACITY: usize = 4096;

/// Lifecycle or action status carried by an activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Active,
    Inactive,
    LaunchFailed,
    Error,
    Action,
}

impl Status {
    pub const ALL: [Status; 5] = [
        Status::Active,
        Status::Inactive,
        Status::LaunchFailed,
        Status::Error,
        Status::Action,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Active => "active",
            Status::Inactive => "inactive",
            Status::LaunchFailed => "launch_failed",
            Status::Error => "error",
            Status::Action => "action",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable status event emitted by a worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Activity {
    pub status: Status,
    /// Identity index of the emitting worker
    pub id: usize,
    pub message: String,
    /// Underlying failure, only present for `Status::Error`
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_err"
    )]
    pub err: Option<EngineError>,
}

fn serialize_err<S: Serializer>(err: &Option<EngineError>, s: S) -> Result<S::Ok, S::Error> {
    match err {
        Some(e) => s.serialize_str(&e.to_string()),
        None => s.serialize_none(),
    }
}

impl Activity {
    pub fn active(id: usize) -> Self {
        Self::new(Status::Active, id, "Worker active")
    }

    pub fn inactive(id: usize) -> Self {
        Self::new(Status::Inactive, id, "Worker inactive")
    }

    pub fn launch_failed(id: usize, message: impl Into<String>) -> Self {
        Self::new(Status::LaunchFailed, id, message)
    }

    pub fn action(id: usize, message: impl Into<String>) -> Self {
        Self::new(Status::Action, id, message)
    }

    pub fn error(id: usize, message: impl Into<String>, err: impl Into<EngineError>) -> Self {
        Self {
            err: Some(err.into()),
            ..Self::new(Status::Error, id, message)
        }
    }

    fn new(status: Status, id: usize, message: impl Into<String>) -> Self {
        Self {
            status,
            id,
            message: message.into(),
            err: None,
        }
    }

    /// Whether this event ends the worker's launch phase
    pub fn is_launch_outcome(&self) -> bool {
        matches!(self.status, Status::Active | Status::LaunchFailed)
    }
}

/// What a sender does when the channel is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Wait for the reader to make room; nothing is lost
    #[default]
    Block,
    /// Discard the event and count it; senders never wait
    DropNewest,
}

impl OverflowPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "block" => Some(OverflowPolicy::Block),
            "drop" | "drop_newest" => Some(OverflowPolicy::DropNewest),
            _ => None,
        }
    }
}

/// Writing end of the activity channel, cloned into every worker
#[derive(Debug, Clone)]
pub struct ActivitySender {
    tx: mpsc::Sender<Activity>,
    policy: OverflowPolicy,
    dropped: Arc<AtomicU64>,
}

impl ActivitySender {
    /// Deliver an activity according to the overflow policy.
    ///
    /// A closed channel swallows the event: a worker must never fail because
    /// nobody is listening any more.
    pub async fn send(&self, activity: Activity) {
        metrics::counter!("loadtest_activity_total", "status" => activity.status.as_str())
            .increment(1);

        match self.policy {
            OverflowPolicy::Block => {
                if let Err(e) = self.tx.send(activity).await {
                    debug!("Activity channel closed, dropping {:?}", e.0.status);
                }
            }
            OverflowPolicy::DropNewest => match self.tx.try_send(activity) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    metrics::counter!("loadtest_activity_dropped_total").increment(1);
                }
                Err(TrySendError::Closed(a)) => {
                    debug!("Activity channel closed, dropping {:?}", a.status);
                }
            },
        }
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Events discarded because the channel was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Reading end of the activity channel
#[derive(Debug)]
pub struct ActivityReceiver {
    rx: mpsc::Receiver<Activity>,
    dropped: Arc<AtomicU64>,
}

impl ActivityReceiver {
    pub async fn recv(&mut self) -> Option<Activity> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Activity> {
        self.rx.try_recv().ok()
    }

    /// Events discarded by senders because the channel was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Create a bounded activity channel with the given overflow policy
pub fn activity_channel(
    capacity: usize,
    policy: OverflowPolicy,
) -> (ActivitySender, ActivityReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    (
        ActivitySender {
            tx,
            policy,
            dropped: dropped.clone(),
        },
        ActivityReceiver { rx, dropped },
    )
}
