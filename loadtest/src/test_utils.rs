//! Test Utilities Module
//!
//! Mock platform, fixture plans and fast configuration shared by the unit
//! tests. This module is only compiled when running tests.

#![cfg(test)]

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::activity::{Activity, ActivitySender};
use crate::config::Config;
use crate::engine::StopSignal;
use crate::plan::BehaviorPlan;
use crate::platform::{
    ChannelRef, ImageUpload, Platform, PlatformError, PlatformFactory, TeamRef, UploadResult,
};

// ============================================================================
// Configuration
// ============================================================================

/// Default configuration with every pause shortened to a few milliseconds
pub fn fast_config() -> Config {
    let mut config = Config::default();
    config.plan.login_break = Duration::from_millis(20);
    config.plan.message_break = Duration::from_millis(10);
    config.plan.error_cooldown = Duration::from_millis(10);
    config.plan.image_pool_size = 2;
    config
}

// ============================================================================
// Mock Platform
// ============================================================================

/// Call counters shared between a test and the mocks it hands out
#[derive(Debug, Default)]
pub struct PlatformCalls {
    pub login: AtomicUsize,
    pub initial_load: AtomicUsize,
    pub find_team: AtomicUsize,
    pub find_channel: AtomicUsize,
    pub send_message: AtomicUsize,
    pub upload_image: AtomicUsize,
    pub send_attachment: AtomicUsize,
    /// Emails passed to `login`
    pub logins: Mutex<Vec<String>>,
    /// Channel names passed to `find_or_create_channel`
    pub channels: Mutex<Vec<String>>,
}

/// Failures a mock platform injects
#[derive(Debug, Clone, Default)]
pub struct MockBehavior {
    pub fail_login: Option<PlatformError>,
    pub fail_initial_load: Option<PlatformError>,
    pub fail_team: Option<PlatformError>,
    pub fail_channel: Option<PlatformError>,
    /// Fail every `send_message`
    pub fail_send: Option<PlatformError>,
    pub fail_upload: Option<PlatformError>,
    /// Fail every n-th `send_message` (counted across the shared calls)
    pub fail_send_every: Option<usize>,
    /// Panic on the n-th `send_message` of this handle
    pub panic_on_send: Option<usize>,
    pub panic_on_login: bool,
    /// Time `initial_load` takes before answering
    pub initial_load_delay: Duration,
    /// Time `find_team` takes before answering
    pub find_team_delay: Duration,
}

fn inject(failure: &Option<PlatformError>) -> Result<(), PlatformError> {
    match failure {
        Some(err) => Err(err.clone()),
        None => Ok(()),
    }
}

/// In-memory platform recording every call
pub struct MockPlatform {
    behavior: MockBehavior,
    calls: Arc<PlatformCalls>,
    token: Option<String>,
    sends: usize,
}

impl MockPlatform {
    pub fn new(behavior: MockBehavior, calls: Arc<PlatformCalls>) -> Self {
        Self {
            behavior,
            calls,
            token: None,
            sends: 0,
        }
    }
}

#[async_trait]
impl Platform for MockPlatform {
    async fn login(&mut self, email: &str, _password: &str) -> Result<(), PlatformError> {
        self.calls.login.fetch_add(1, Ordering::SeqCst);
        self.calls.logins.lock().unwrap().push(email.to_string());
        if self.behavior.panic_on_login {
            panic!("injected fault on login of {}", email);
        }
        inject(&self.behavior.fail_login)?;
        self.token = Some(format!("mock-token-{}", email));
        Ok(())
    }

    async fn initial_load(&mut self) -> Result<(), PlatformError> {
        self.calls.initial_load.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.behavior.initial_load_delay).await;
        inject(&self.behavior.fail_initial_load)
    }

    async fn find_team(&mut self, name: &str) -> Result<TeamRef, PlatformError> {
        self.calls.find_team.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.behavior.find_team_delay).await;
        inject(&self.behavior.fail_team)?;
        Ok(TeamRef {
            id: format!("team-{}", name),
            name: name.to_string(),
        })
    }

    async fn find_or_create_channel(
        &mut self,
        team: &TeamRef,
        name: &str,
        _create: bool,
    ) -> Result<ChannelRef, PlatformError> {
        self.calls.find_channel.fetch_add(1, Ordering::SeqCst);
        self.calls.channels.lock().unwrap().push(name.to_string());
        inject(&self.behavior.fail_channel)?;
        Ok(ChannelRef {
            id: format!("{}-{}", team.id, name),
            name: name.to_string(),
        })
    }

    async fn send_message(
        &mut self,
        _channel: &ChannelRef,
        _text: &str,
        _reply_root_id: Option<&str>,
    ) -> Result<(), PlatformError> {
        let n = self.calls.send_message.fetch_add(1, Ordering::SeqCst) + 1;
        self.sends += 1;

        if self.behavior.panic_on_send == Some(self.sends) {
            panic!("injected fault on send {}", self.sends);
        }
        inject(&self.behavior.fail_send)?;
        if let Some(every) = self.behavior.fail_send_every
            && every > 0
            && n % every == 0
        {
            return Err(PlatformError::Other(format!("injected failure on send {}", n)));
        }
        Ok(())
    }

    async fn upload_image(
        &mut self,
        _channel: &ChannelRef,
        image: ImageUpload,
    ) -> Result<UploadResult, PlatformError> {
        self.calls.upload_image.fetch_add(1, Ordering::SeqCst);
        inject(&self.behavior.fail_upload)?;
        Ok(UploadResult {
            filenames: vec![image.filename],
        })
    }

    async fn send_attachment(
        &mut self,
        _channel: &ChannelRef,
        _caption: &str,
        _filenames: &[String],
        _reply_root_id: Option<&str>,
    ) -> Result<(), PlatformError> {
        self.calls.send_attachment.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn session_token(&self) -> Option<String> {
        self.token.clone()
    }
}

type BehaviorFn = Box<dyn Fn(usize) -> MockBehavior + Send + Sync>;

/// Hands out `MockPlatform`s; the behavior closure receives the connection
/// number (0-based, in `connect` order)
pub struct MockPlatformFactory {
    behavior: BehaviorFn,
    connections: AtomicUsize,
    pub calls: Arc<PlatformCalls>,
}

impl MockPlatformFactory {
    pub fn with_behavior(behavior: impl Fn(usize) -> MockBehavior + Send + Sync + 'static) -> Self {
        Self {
            behavior: Box::new(behavior),
            connections: AtomicUsize::new(0),
            calls: Arc::new(PlatformCalls::default()),
        }
    }

    /// Number of handles created so far
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

impl Default for MockPlatformFactory {
    fn default() -> Self {
        Self::with_behavior(|_| MockBehavior::default())
    }
}

impl PlatformFactory for MockPlatformFactory {
    fn connect(&self, _server_url: &str) -> Box<dyn Platform> {
        let n = self.connections.fetch_add(1, Ordering::SeqCst);
        Box::new(MockPlatform::new((self.behavior)(n), self.calls.clone()))
    }
}

// ============================================================================
// Fixture Plans
// ============================================================================

/// Goes active, then panics with a `String` payload
pub struct PanickingPlan {
    id: usize,
    activity: ActivitySender,
    stop: StopSignal,
}

impl PanickingPlan {
    pub fn new(id: usize, activity: ActivitySender) -> Self {
        Self {
            id,
            activity,
            stop: StopSignal::new(),
        }
    }
}

#[async_trait]
impl BehaviorPlan for PanickingPlan {
    fn id(&self) -> usize {
        self.id
    }

    async fn start(&mut self) -> bool {
        self.activity.send(Activity::active(self.id)).await;
        panic!("injected fault in worker {}", self.id);
    }

    fn launch_reported(&self) -> bool {
        true
    }

    fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }
}

/// Emits nothing and returns `false` once stopped
pub struct SilentPlan {
    id: usize,
    stop: StopSignal,
}

impl SilentPlan {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            stop: StopSignal::new(),
        }
    }
}

#[async_trait]
impl BehaviorPlan for SilentPlan {
    fn id(&self) -> usize {
        self.id
    }

    async fn start(&mut self) -> bool {
        let mut listener = self.stop.listener();
        listener.stopped().await;
        false
    }

    fn launch_reported(&self) -> bool {
        false
    }

    fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }
}
