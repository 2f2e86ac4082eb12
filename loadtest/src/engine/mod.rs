//! Worker supervision and run orchestration

mod orchestrator;
mod stats;
mod stop;
mod worker;

pub use orchestrator::{ExitCounts, Orchestrator, RunSummary};
pub use stats::{ERROR_SAMPLE_LIMIT, ErrorSample, RunStats, StatusCounts, WorkerStats};
pub use stop::{StopListener, StopSignal};
pub use worker::{FAULT_MESSAGE, LAUNCH_FAULT_MESSAGE, Worker, WorkerExit, classify_panic};
