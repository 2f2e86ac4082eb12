//! Collaboration Load Test Library
//!
//! Virtual-user load generation against a Mattermost-style collaboration
//! server. Each virtual user runs a behavior plan on its own task and reports
//! what it does as activity events; the orchestrator launches the users,
//! aggregates their activity and stops them.

pub mod activity;
pub mod config;
pub mod content;
pub mod engine;
pub mod error;
pub mod identity;
pub mod plan;
pub mod platform;
pub mod provision;

#[cfg(test)]
mod test_utils;

// Re-export commonly used types
pub use activity::{
    Activity, ActivityReceiver, ActivitySender, OverflowPolicy, Status, activity_channel,
};
pub use config::{Config, ConfigError};
pub use engine::{Orchestrator, RunStats, RunSummary, StopSignal, Worker, WorkerExit};
pub use error::{EngineError, PlanError};
pub use identity::Identity;
pub use plan::{BehaviorPlan, PlanFactory, PlanKind};
pub use platform::{HttpPlatform, HttpPlatformFactory, Platform, PlatformError, PlatformFactory};
pub use provision::{LoginUsersResult, login_users};
