//! The virtual user state machine shared by every plan variant
//!
//! login -> warm-up -> initial load -> team lookup -> channel -> message loop

use async_trait::async_trait;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::BehaviorPlan;
use crate::activity::{Activity, ActivitySender};
use crate::config::Config;
use crate::content::{self, ImagePool};
use crate::engine::{StopListener, StopSignal};
use crate::error::EngineError;
use crate::identity::Identity;
use crate::platform::{ChannelRef, Platform, PlatformError};

/// What one loop iteration does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Message,
    Media,
}

/// How a plan variant picks its actions
#[derive(Debug, Clone)]
pub enum TrafficShape {
    /// Plain text only
    Steady,
    /// Image posts with the given chance (0-100), text otherwise
    Media {
        percent: u32,
        images: Arc<ImagePool>,
    },
}

impl TrafficShape {
    pub fn next_action<R: Rng + ?Sized>(&self, rng: &mut R) -> Action {
        match self {
            TrafficShape::Steady => Action::Message,
            TrafficShape::Media { percent, .. } => {
                if random_choice(rng, *percent) {
                    Action::Media
                } else {
                    Action::Message
                }
            }
        }
    }
}

/// `true` with `percent` chance; 0 never, 100 always
pub fn random_choice<R: Rng + ?Sized>(rng: &mut R, percent: u32) -> bool {
    match percent {
        0 => false,
        p if p >= 100 => true,
        p => rng.random_range(0..100) < p,
    }
}

/// Uniform duration in `[0, window)`
pub fn random_pause<R: Rng + ?Sized>(rng: &mut R, window: Duration) -> Duration {
    let millis = window.as_millis() as u64;
    if millis == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rng.random_range(0..millis))
}

/// A failed loop iteration
struct ActionFailure {
    message: &'static str,
    err: EngineError,
}

impl ActionFailure {
    fn new(message: &'static str, err: impl Into<EngineError>) -> Self {
        Self {
            message,
            err: err.into(),
        }
    }

    fn is_session_loss(&self) -> bool {
        matches!(&self.err, EngineError::Platform(e) if e.is_session_loss())
    }
}

/// One simulated user
pub struct UserPlan {
    id: usize,
    config: Arc<Config>,
    activity: ActivitySender,
    stop: StopSignal,
    listener: StopListener,
    platform: Box<dyn Platform>,
    shape: TrafficShape,
    rng: ChaCha8Rng,
    launched: bool,
}

impl UserPlan {
    pub fn new(
        id: usize,
        config: Arc<Config>,
        activity: ActivitySender,
        platform: Box<dyn Platform>,
        shape: TrafficShape,
    ) -> Self {
        let stop = StopSignal::new();
        let listener = stop.listener();
        Self {
            id,
            config,
            activity,
            stop,
            listener,
            platform,
            shape,
            rng: ChaCha8Rng::seed_from_u64(id as u64),
            launched: false,
        }
    }

    async fn emit(&mut self, activity: Activity) {
        if activity.is_launch_outcome() {
            self.launched = true;
        }
        self.activity.send(activity).await;
    }

    async fn launch_failed(&mut self, message: String) -> bool {
        let activity = Activity::launch_failed(self.id, message);
        self.emit(activity).await;
        false
    }

    /// Report a failed setup step and give up
    async fn setup_failed(&mut self, message: &str, err: PlatformError) -> bool {
        warn!(worker = self.id, error = %err, "{}", message);
        let activity = Activity::error(self.id, message, err);
        self.emit(activity).await;
        let activity = Activity::inactive(self.id);
        self.emit(activity).await;
        true
    }

    async fn send_text(&mut self, channel: &ChannelRef) -> Result<String, ActionFailure> {
        let message = content::random_message(&mut self.rng);
        self.platform
            .send_message(channel, &message, None)
            .await
            .map_err(|e| ActionFailure::new("Message Send Failed", e))?;
        Ok(format!("User {} sent a message", self.id))
    }

    async fn send_media(&mut self, channel: &ChannelRef) -> Result<String, ActionFailure> {
        let image = match &self.shape {
            TrafficShape::Media { images, .. } => images.pick(&mut self.rng),
            TrafficShape::Steady => content::random_image(&mut self.rng),
        }
        .map_err(|e| {
            ActionFailure::new(
                "Failed to render random image",
                EngineError::Content(e.to_string()),
            )
        })?;

        let upload = self
            .platform
            .upload_image(channel, image)
            .await
            .map_err(|e| ActionFailure::new("Failed on uploading random image", e))?;

        self.platform
            .send_attachment(channel, content::MEDIA_CAPTION, &upload.filenames, None)
            .await
            .map_err(|e| ActionFailure::new("Media Message Send Failed", e))?;
        Ok(format!("User {} sent a media message", self.id))
    }
}

#[async_trait]
impl BehaviorPlan for UserPlan {
    fn id(&self) -> usize {
        self.id
    }

    fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    fn launch_reported(&self) -> bool {
        self.launched
    }

    async fn start(&mut self) -> bool {
        let identity = Identity::for_id(self.id, &self.config.users);

        if self.listener.is_stopped() {
            return self.launch_failed("Stopped before launch".to_string()).await;
        }

        if let Err(e) = self
            .platform
            .login(&identity.email, &identity.password)
            .await
        {
            warn!(worker = self.id, error = %e, "Login failed for {}", identity.email);
            return self.launch_failed(format!("Failed launch: {}", e)).await;
        }

        let warmup = random_pause(&mut self.rng, self.config.plan.login_break);
        if self.listener.sleep(warmup).await {
            return self.launch_failed("Stopped before launch".to_string()).await;
        }

        let active = Activity::active(self.id);
        self.emit(active).await;
        debug!(worker = self.id, "Active after {:?} warm-up", warmup);

        if let Err(e) = self.platform.initial_load().await {
            return self.setup_failed("Initial Load Failed", e).await;
        }
        if self.listener.is_stopped() {
            return false;
        }

        let team_name = self.config.plan.team_name.clone();
        let team = match self.platform.find_team(&team_name).await {
            Ok(team) => team,
            Err(e) => return self.setup_failed("Team Lookup Failed", e).await,
        };
        if self.listener.is_stopped() {
            return false;
        }

        let channel_name = self.config.plan.channel_name(self.id);
        let channel = match self
            .platform
            .find_or_create_channel(&team, &channel_name, true)
            .await
        {
            Ok(channel) => channel,
            Err(e) => return self.setup_failed("Create/Get Channel Failed", e).await,
        };
        debug!(worker = self.id, "Posting into channel {}", channel.name);

        loop {
            if self.listener.is_stopped() {
                info!(worker = self.id, "Stop observed, leaving message loop");
                return false;
            }

            let outcome = match self.shape.next_action(&mut self.rng) {
                Action::Message => self.send_text(&channel).await,
                Action::Media => self.send_media(&channel).await,
            };

            match outcome {
                Ok(description) => {
                    let action = Activity::action(self.id, description);
                    self.emit(action).await;

                    let pause = random_pause(&mut self.rng, self.config.plan.message_break);
                    if self.listener.sleep(pause).await {
                        return false;
                    }
                }
                Err(failure) => {
                    let session_lost = failure.is_session_loss();
                    debug!(worker = self.id, error = %failure.err, "{}", failure.message);
                    let error = Activity::error(self.id, failure.message, failure.err);
                    self.emit(error).await;

                    if session_lost {
                        warn!(worker = self.id, "Session lost, worker going inactive");
                        let inactive = Activity::inactive(self.id);
                        self.emit(inactive).await;
                        return true;
                    }

                    let cooldown = self.config.plan.error_cooldown;
                    if self.listener.sleep(cooldown).await {
                        return false;
                    }
                }
            }
        }
    }
}
