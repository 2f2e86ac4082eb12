//! Steady plain-text messaging

use std::sync::Arc;

use super::user::{TrafficShape, UserPlan};
use super::{BehaviorPlan, PlanFactory};
use crate::activity::ActivitySender;
use crate::config::Config;
use crate::platform::PlatformFactory;

/// Ten users per channel, each posting text after a random break
pub struct UserConstantPlan {
    config: Arc<Config>,
    platforms: Arc<dyn PlatformFactory>,
}

impl UserConstantPlan {
    pub fn new(config: Arc<Config>, platforms: Arc<dyn PlatformFactory>) -> Self {
        Self { config, platforms }
    }
}

impl PlanFactory for UserConstantPlan {
    fn name(&self) -> &'static str {
        "user_constant"
    }

    fn generate(&self, id: usize, activity: ActivitySender) -> Box<dyn BehaviorPlan> {
        let platform = self.platforms.connect(&self.config.connection.server_url);
        Box::new(UserPlan::new(
            id,
            self.config.clone(),
            activity,
            platform,
            TrafficShape::Steady,
        ))
    }
}
