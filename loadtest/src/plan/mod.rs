//! Behavior plans
//!
//! A behavior plan is the script one virtual user follows. Variants differ
//! only in traffic shape and are picked by name from configuration:
//! - `user_constant`: steady plain-text messaging
//! - `user_constant_media`: messaging with a share of image posts

mod constant;
mod media;
mod user;

use async_trait::async_trait;
use std::sync::Arc;

use crate::activity::ActivitySender;
use crate::config::Config;
use crate::engine::StopSignal;
use crate::error::PlanError;
use crate::platform::PlatformFactory;

pub use constant::UserConstantPlan;
pub use media::UserConstantMediaPlan;
pub use user::{Action, TrafficShape, UserPlan};

/// One running instance of a behavior plan
#[async_trait]
pub trait BehaviorPlan: Send {
    /// Identity index of the simulated user
    fn id(&self) -> usize;

    /// Run until stopped or until a terminal failure.
    ///
    /// Returns `true` when the plan ended on a failure, `false` when it was
    /// stopped or never launched.
    async fn start(&mut self) -> bool;

    /// Whether `Active` or `LaunchFailed` has already been emitted
    fn launch_reported(&self) -> bool;

    /// Signal the plan shared with whoever supervises it
    fn stop_signal(&self) -> StopSignal;

    /// Ask a running `start` to return at its next check point
    fn stop(&self) {
        self.stop_signal().stop();
    }
}

/// Builds plan instances for every worker of a run
#[async_trait]
pub trait PlanFactory: Send + Sync {
    fn name(&self) -> &'static str;

    /// Prepare fixtures shared by all instances; runs before any `generate`
    async fn global_setup(&self) -> Result<(), PlanError> {
        Ok(())
    }

    /// Construct the plan for worker `id`. Must not block or emit activity.
    fn generate(&self, id: usize, activity: ActivitySender) -> Box<dyn BehaviorPlan>;
}

/// Plan variants selectable from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanKind {
    UserConstant,
    UserConstantMedia,
}

impl PlanKind {
    pub fn parse(name: &str) -> Result<Self, PlanError> {
        match name.trim().to_lowercase().as_str() {
            "user_constant" | "constant" => Ok(PlanKind::UserConstant),
            "user_constant_media" | "media" => Ok(PlanKind::UserConstantMedia),
            other => Err(PlanError::UnknownPlan(other.to_string())),
        }
    }

    pub fn build(
        self,
        config: Arc<Config>,
        platforms: Arc<dyn PlatformFactory>,
    ) -> Arc<dyn PlanFactory> {
        match self {
            PlanKind::UserConstant => Arc::new(UserConstantPlan::new(config, platforms)),
            PlanKind::UserConstantMedia => Arc::new(UserConstantMediaPlan::new(config, platforms)),
        }
    }
}
