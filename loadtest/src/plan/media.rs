//! Messaging mixed with image posts

use async_trait::async_trait;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

use super::user::{TrafficShape, UserPlan};
use super::{BehaviorPlan, PlanFactory};
use crate::activity::ActivitySender;
use crate::config::Config;
use crate::content::ImagePool;
use crate::error::PlanError;
use crate::platform::PlatformFactory;

/// Seed of the shared image pool, so every run uploads the same images
const IMAGE_POOL_SEED: u64 = 0x1d_ea5e;

/// Like `UserConstantPlan`, but `media_percent` of the posts carry an image
pub struct UserConstantMediaPlan {
    config: Arc<Config>,
    platforms: Arc<dyn PlatformFactory>,
    images: OnceLock<Arc<ImagePool>>,
}

impl UserConstantMediaPlan {
    pub fn new(config: Arc<Config>, platforms: Arc<dyn PlatformFactory>) -> Self {
        Self {
            config,
            platforms,
            images: OnceLock::new(),
        }
    }

    /// Images prepared by `global_setup`, if it has run
    pub fn image_pool(&self) -> Option<Arc<ImagePool>> {
        self.images.get().cloned()
    }
}

#[async_trait]
impl PlanFactory for UserConstantMediaPlan {
    fn name(&self) -> &'static str {
        "user_constant_media"
    }

    async fn global_setup(&self) -> Result<(), PlanError> {
        if self.images.get().is_some() {
            return Ok(());
        }

        let size = self.config.plan.image_pool_size;
        let pool = tokio::task::spawn_blocking(move || {
            let mut rng = ChaCha8Rng::seed_from_u64(IMAGE_POOL_SEED);
            ImagePool::render(size, &mut rng)
        })
        .await
        .map_err(|e| PlanError::Fixture(e.to_string()))??;

        let rendered = pool.len();
        if self.images.set(Arc::new(pool)).is_err() {
            debug!("Image pool already set by a concurrent setup, keeping the first");
        } else {
            info!("Rendered {} images for media posts", rendered);
        }
        Ok(())
    }

    fn generate(&self, id: usize, activity: ActivitySender) -> Box<dyn BehaviorPlan> {
        let platform = self.platforms.connect(&self.config.connection.server_url);
        let shape = TrafficShape::Media {
            percent: self.config.plan.media_percent,
            images: self.image_pool().unwrap_or_default(),
        };
        Box::new(UserPlan::new(
            id,
            self.config.clone(),
            activity,
            platform,
            shape,
        ))
    }
}
