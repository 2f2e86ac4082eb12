//! Load test configuration
//!
//! Configuration is loaded from environment variables once at startup and
//! handed to the orchestrator as an immutable snapshot.

use std::env;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

use crate::activity::{DEFAULT_ACTIVITY_CAPACITY, OverflowPolicy};

/// Configuration errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Media percent must be between 0 and 100, got {0}")]
    MediaPercentOutOfRange(u32),

    #[error("Users per channel must be at least 1")]
    ZeroUsersPerChannel,

    #[error("Activity channel capacity must be at least 1")]
    ZeroActivityCapacity,

    #[error("Missing required setting: {0}")]
    Missing(&'static str),
}

/// Main load test configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Target server connection
    pub connection: ConnectionConfig,

    /// Synthetic user identities
    pub users: UsersConfig,

    /// Behavior plan tuning
    pub plan: PlanConfig,

    /// Run size and reporting
    pub run: RunConfig,
}

/// Target server configuration
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Base URL of the collaboration server
    pub server_url: String,
    /// Per-request timeout
    pub request_timeout: Duration,
}

/// How worker ids map onto accounts
#[derive(Debug, Clone)]
pub struct UsersConfig {
    /// Local part prefix of generated emails
    pub email_prefix: String,
    /// Domain of generated emails
    pub email_domain: String,
    /// Password shared by all provisioned accounts
    pub password: String,
}

/// Behavior plan configuration
#[derive(Debug, Clone)]
pub struct PlanConfig {
    /// Name of the plan variant to run
    pub kind: String,
    /// Upper bound of the random pause between login and activity
    pub login_break: Duration,
    /// Upper bound of the random pause between actions
    pub message_break: Duration,
    /// Chance (0-100) that an iteration posts an image instead of text
    pub media_percent: u32,
    /// Fixed pause after a failed action
    pub error_cooldown: Duration,
    /// Team every worker posts into
    pub team_name: String,
    /// Channel name; `{n}` is replaced by the bucket number, otherwise the
    /// number is appended
    pub channel_template: String,
    /// Number of consecutive worker ids sharing one channel
    pub users_per_channel: usize,
    /// Number of images rendered ahead of the run by media plans
    pub image_pool_size: usize,
}

/// Run-level configuration
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Number of virtual users
    pub users: usize,
    /// Stop automatically after this long (None = until interrupted)
    pub duration: Option<Duration>,
    /// Bounded capacity of the activity channel
    pub activity_capacity: usize,
    /// Behavior of a full activity channel
    pub activity_overflow: OverflowPolicy,
    /// Interval between progress reports
    pub report_interval: Duration,
    /// How long to wait for workers after a stop before giving up
    pub shutdown_grace: Duration,
    /// Prometheus listener address (optional)
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8065".to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl Default for UsersConfig {
    fn default() -> Self {
        Self {
            email_prefix: "loadtest_user".to_string(),
            email_domain: "example.com".to_string(),
            password: "Loadtest-Passw0rd!".to_string(),
        }
    }
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            kind: "user_constant_media".to_string(),
            login_break: Duration::from_secs(5),
            message_break: Duration::from_secs(5),
            media_percent: 10,
            error_cooldown: Duration::from_secs(5),
            team_name: "loadtest".to_string(),
            channel_template: "loadtest-channel-".to_string(),
            users_per_channel: 10,
            image_pool_size: 16,
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            users: 10,
            duration: None,
            activity_capacity: DEFAULT_ACTIVITY_CAPACITY,
            activity_overflow: OverflowPolicy::Block,
            report_interval: Duration::from_secs(10),
            shutdown_grace: Duration::from_secs(30),
            metrics_addr: None,
        }
    }
}

impl PlanConfig {
    /// Channel shared by the bucket `id` falls into
    pub fn channel_name(&self, id: usize) -> String {
        let bucket = id / self.users_per_channel.max(1);
        if self.channel_template.contains("{n}") {
            self.channel_template.replace("{n}", &bucket.to_string())
        } else {
            format!("{}{}", self.channel_template, bucket)
        }
    }
}

fn secs_var(name: &str) -> Option<Duration> {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // Connection config
        if let Ok(url) = env::var("LOADTEST_SERVER_URL") {
            config.connection.server_url = url;
        }
        if let Some(timeout) = secs_var("LOADTEST_REQUEST_TIMEOUT_SECS") {
            config.connection.request_timeout = timeout;
        }

        // Users config
        if let Ok(prefix) = env::var("LOADTEST_EMAIL_PREFIX") {
            config.users.email_prefix = prefix;
        }
        if let Ok(domain) = env::var("LOADTEST_EMAIL_DOMAIN") {
            config.users.email_domain = domain;
        }
        if let Ok(password) = env::var("LOADTEST_USER_PASSWORD") {
            config.users.password = password;
        }

        // Plan config
        if let Ok(kind) = env::var("LOADTEST_PLAN") {
            config.plan.kind = kind;
        }
        if let Some(window) = secs_var("LOADTEST_LOGIN_BREAK_SECS") {
            config.plan.login_break = window;
        }
        if let Some(window) = secs_var("LOADTEST_MESSAGE_BREAK_SECS") {
            config.plan.message_break = window;
        }
        if let Ok(val) = env::var("LOADTEST_MEDIA_PERCENT")
            && let Ok(pct) = val.parse()
        {
            config.plan.media_percent = pct;
        }
        if let Some(cooldown) = secs_var("LOADTEST_ERROR_COOLDOWN_SECS") {
            config.plan.error_cooldown = cooldown;
        }
        if let Ok(team) = env::var("LOADTEST_TEAM_NAME") {
            config.plan.team_name = team;
        }
        if let Ok(template) = env::var("LOADTEST_CHANNEL_TEMPLATE") {
            config.plan.channel_template = template;
        }
        if let Ok(val) = env::var("LOADTEST_USERS_PER_CHANNEL")
            && let Ok(n) = val.parse()
        {
            config.plan.users_per_channel = n;
        }
        if let Ok(val) = env::var("LOADTEST_IMAGE_POOL_SIZE")
            && let Ok(n) = val.parse()
        {
            config.plan.image_pool_size = n;
        }

        // Run config
        if let Ok(val) = env::var("LOADTEST_USERS")
            && let Ok(n) = val.parse()
        {
            config.run.users = n;
        }
        if let Some(duration) = secs_var("LOADTEST_DURATION_SECS") {
            config.run.duration = Some(duration);
        }
        if let Ok(val) = env::var("LOADTEST_ACTIVITY_CAPACITY")
            && let Ok(n) = val.parse()
        {
            config.run.activity_capacity = n;
        }
        if let Ok(val) = env::var("LOADTEST_ACTIVITY_OVERFLOW")
            && let Some(policy) = OverflowPolicy::parse(&val)
        {
            config.run.activity_overflow = policy;
        }
        if let Some(interval) = secs_var("LOADTEST_REPORT_INTERVAL_SECS") {
            config.run.report_interval = interval;
        }
        if let Some(grace) = secs_var("LOADTEST_SHUTDOWN_GRACE_SECS") {
            config.run.shutdown_grace = grace;
        }
        if let Ok(addr) = env::var("LOADTEST_METRICS_ADDR")
            && let Ok(a) = addr.parse()
        {
            config.run.metrics_addr = Some(a);
        }

        config
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connection.server_url.trim().is_empty() {
            return Err(ConfigError::Missing("server url"));
        }
        if self.plan.team_name.trim().is_empty() {
            return Err(ConfigError::Missing("team name"));
        }
        if self.plan.media_percent > 100 {
            return Err(ConfigError::MediaPercentOutOfRange(self.plan.media_percent));
        }
        if self.plan.users_per_channel == 0 {
            return Err(ConfigError::ZeroUsersPerChannel);
        }
        if self.run.activity_capacity == 0 {
            return Err(ConfigError::ZeroActivityCapacity);
        }
        Ok(())
    }
}
