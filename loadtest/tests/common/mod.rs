//! Common Test Utilities for Integration Tests
//!
//! Shared helpers used across integration test modules: a scripted platform
//! for driving the engine, and an in-process mock of the `/api/v4` REST API.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::extract::{Multipart, State};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use collab_loadtest::config::Config;
use collab_loadtest::platform::{
    ChannelRef, ImageUpload, Platform, PlatformError, PlatformFactory, TeamRef, UploadResult,
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Configuration
// ============================================================================

/// Configuration with the given warm-up and message windows
pub fn test_config(login_break: Duration, message_break: Duration) -> Config {
    let mut config = Config::default();
    config.plan.login_break = login_break;
    config.plan.message_break = message_break;
    config.plan.error_cooldown = Duration::from_millis(10);
    config.plan.image_pool_size = 2;
    config
}

// ============================================================================
// Scripted Platform
// ============================================================================

/// What one scripted connection does
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub fail_login: bool,
    pub panic_on_login: bool,
    /// Panic on the n-th `send_message` of this connection
    pub panic_on_send: Option<usize>,
}

/// Counters shared by every connection of a `ScriptedFactory`
#[derive(Debug, Default)]
pub struct Counters {
    pub sends: AtomicUsize,
    pub uploads: AtomicUsize,
    pub logins: Mutex<Vec<String>>,
}

pub struct ScriptedPlatform {
    script: Script,
    counters: Arc<Counters>,
    sends: usize,
}

#[async_trait]
impl Platform for ScriptedPlatform {
    async fn login(&mut self, email: &str, _password: &str) -> Result<(), PlatformError> {
        self.counters.logins.lock().unwrap().push(email.to_string());
        if self.script.panic_on_login {
            panic!("scripted panic on login of {}", email);
        }
        if self.script.fail_login {
            return Err(PlatformError::Http {
                status: 403,
                message: "account locked".into(),
            });
        }
        Ok(())
    }

    async fn initial_load(&mut self) -> Result<(), PlatformError> {
        Ok(())
    }

    async fn find_team(&mut self, name: &str) -> Result<TeamRef, PlatformError> {
        Ok(TeamRef {
            id: "team-1".into(),
            name: name.to_string(),
        })
    }

    async fn find_or_create_channel(
        &mut self,
        _team: &TeamRef,
        name: &str,
        _create: bool,
    ) -> Result<ChannelRef, PlatformError> {
        Ok(ChannelRef {
            id: format!("channel-{}", name),
            name: name.to_string(),
        })
    }

    async fn send_message(
        &mut self,
        _channel: &ChannelRef,
        _text: &str,
        _reply_root_id: Option<&str>,
    ) -> Result<(), PlatformError> {
        // Behave like a network call and give other tasks a turn
        tokio::task::yield_now().await;

        self.sends += 1;
        if self.script.panic_on_send == Some(self.sends) {
            panic!("scripted panic on send {}", self.sends);
        }
        self.counters.sends.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn upload_image(
        &mut self,
        _channel: &ChannelRef,
        image: ImageUpload,
    ) -> Result<UploadResult, PlatformError> {
        tokio::task::yield_now().await;
        self.counters.uploads.fetch_add(1, Ordering::SeqCst);
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
        Ok(())
    }
}

type ScriptFn = Box<dyn Fn(usize) -> Script + Send + Sync>;

/// Hands out scripted connections; the script closure receives the
/// connection number, which equals the worker id when workers are generated
/// in order
pub struct ScriptedFactory {
    script: ScriptFn,
    connections: AtomicUsize,
    pub counters: Arc<Counters>,
}

impl ScriptedFactory {
    pub fn new(script: impl Fn(usize) -> Script + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
            connections: AtomicUsize::new(0),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn healthy() -> Self {
        Self::new(|_| Script::default())
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

impl PlatformFactory for ScriptedFactory {
    fn connect(&self, _server_url: &str) -> Box<dyn Platform> {
        let n = self.connections.fetch_add(1, Ordering::SeqCst);
        Box::new(ScriptedPlatform {
            script: (self.script)(n),
            counters: self.counters.clone(),
            sends: 0,
        })
    }
}

// ============================================================================
// Mock REST Server
// ============================================================================

/// Password the mock server accepts
pub const GOOD_PASSWORD: &str = "good";

/// Post message the mock server rejects with a 500
pub const FAILING_MESSAGE: &str = "explode";

#[derive(Debug, Clone)]
pub struct StoredUpload {
    pub channel_id: String,
    pub filename: String,
    pub content_type: String,
    pub size: usize,
}

/// What the mock server has seen
#[derive(Debug, Default)]
pub struct MockServerState {
    /// (team id, channel name) -> channel id
    pub channels: Mutex<HashMap<(String, String), String>>,
    pub channel_creates: AtomicUsize,
    pub posts: Mutex<Vec<Value>>,
    pub uploads: Mutex<Vec<StoredUpload>>,
    /// Reject every token from now on
    pub revoked: AtomicBool,
    /// Raw request paths seen under `/teams`
    pub team_paths: Mutex<Vec<String>>,
}

impl MockServerState {
    pub fn post_count(&self) -> usize {
        self.posts.lock().unwrap().len()
    }
}

type SharedState = Arc<MockServerState>;

fn api_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "message": message }))).into_response()
}

fn authorized(state: &MockServerState, headers: &HeaderMap) -> bool {
    let bearer = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    bearer.starts_with("Bearer tok-") && !state.revoked.load(Ordering::SeqCst)
}

#[derive(Deserialize)]
struct LoginBody {
    login_id: String,
    password: String,
}

async fn login(Json(body): Json<LoginBody>) -> Response {
    if body.password != GOOD_PASSWORD || body.login_id.contains("locked") {
        return api_error(StatusCode::UNAUTHORIZED, "Invalid login credentials");
    }
    let token = format!("tok-{}", body.login_id);
    (
        StatusCode::OK,
        [("token", token)],
        Json(json!({ "id": format!("user-{}", body.login_id) })),
    )
        .into_response()
}

async fn me(State(state): State<SharedState>, headers: HeaderMap) -> Response {
    if !authorized(&state, &headers) {
        return api_error(StatusCode::UNAUTHORIZED, "Invalid or expired session");
    }
    Json(json!({ "id": "user-me" })).into_response()
}

async fn my_teams(State(state): State<SharedState>, headers: HeaderMap) -> Response {
    if !authorized(&state, &headers) {
        return api_error(StatusCode::UNAUTHORIZED, "Invalid or expired session");
    }
    Json(json!([{ "id": "team-loadtest", "name": "loadtest" }])).into_response()
}

/// Percent-encode one path segment the way the client does
fn encode_segment(segment: &str) -> String {
    let mut url = reqwest::Url::parse("http://mock/").unwrap();
    url.path_segments_mut().unwrap().pop_if_empty().push(segment);
    url.path().trim_start_matches('/').to_string()
}

/// `/teams/name/{name}` and `/teams/{id}/channels/name/{name}`, matched on
/// the raw (still encoded) path
async fn teams(State(state): State<SharedState>, headers: HeaderMap, uri: Uri) -> Response {
    if !authorized(&state, &headers) {
        return api_error(StatusCode::UNAUTHORIZED, "Invalid or expired session");
    }

    let raw = uri.path().to_string();
    state.team_paths.lock().unwrap().push(raw.clone());

    let segments: Vec<&str> = raw.trim_start_matches("/api/v4/teams/").split('/').collect();
    match segments.as_slice() {
        ["name", "loadtest"] => Json(json!({ "id": "team-loadtest", "name": "loadtest" }))
            .into_response(),
        [team_id, "channels", "name", encoded] => {
            let channels = state.channels.lock().unwrap();
            let found = channels.iter().find(|((team, name), _)| {
                team.as_str() == *team_id && encode_segment(name) == *encoded
            });
            match found {
                Some(((_, name), id)) => Json(json!({ "id": id, "name": name })).into_response(),
                None => api_error(StatusCode::NOT_FOUND, "Channel not found"),
            }
        }
        _ => api_error(StatusCode::NOT_FOUND, "Not found"),
    }
}

#[derive(Deserialize)]
struct ChannelBody {
    team_id: String,
    name: String,
    #[serde(rename = "type")]
    channel_type: String,
}

async fn create_channel(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(body): Json<ChannelBody>,
) -> Response {
    if !authorized(&state, &headers) {
        return api_error(StatusCode::UNAUTHORIZED, "Invalid or expired session");
    }
    if body.channel_type != "O" {
        return api_error(StatusCode::BAD_REQUEST, "Only open channels");
    }

    state.channel_creates.fetch_add(1, Ordering::SeqCst);
    let id = format!("channel-{}", body.name);
    state
        .channels
        .lock()
        .unwrap()
        .insert((body.team_id, body.name.clone()), id.clone());
    (
        StatusCode::CREATED,
        Json(json!({ "id": id, "name": body.name })),
    )
        .into_response()
}

async fn create_post(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&state, &headers) {
        return api_error(StatusCode::UNAUTHORIZED, "Invalid or expired session");
    }
    if body["message"] == FAILING_MESSAGE {
        return api_error(StatusCode::INTERNAL_SERVER_ERROR, "database down");
    }

    let mut posts = state.posts.lock().unwrap();
    posts.push(body);
    let id = format!("post-{}", posts.len());
    (StatusCode::CREATED, Json(json!({ "id": id }))).into_response()
}

async fn upload_files(
    State(state): State<SharedState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    if !authorized(&state, &headers) {
        return api_error(StatusCode::UNAUTHORIZED, "Invalid or expired session");
    }

    let mut channel_id = String::new();
    let mut stored = Vec::new();
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        if name == "channel_id" {
            channel_id = field.text().await.unwrap_or_default();
        } else if name == "files" {
            let filename = field.file_name().unwrap_or_default().to_string();
            let content_type = field.content_type().unwrap_or_default().to_string();
            let size = field.bytes().await.map(|b| b.len()).unwrap_or(0);
            stored.push((filename, content_type, size));
        }
    }

    if channel_id.is_empty() || stored.is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "Missing channel_id or files");
    }

    let mut uploads = state.uploads.lock().unwrap();
    let file_infos: Vec<Value> = stored
        .into_iter()
        .map(|(filename, content_type, size)| {
            let info = json!({ "id": format!("file-{}", filename) });
            uploads.push(StoredUpload {
                channel_id: channel_id.clone(),
                filename,
                content_type,
                size,
            });
            info
        })
        .collect();
    (StatusCode::CREATED, Json(json!({ "file_infos": file_infos }))).into_response()
}

/// Router mimicking the parts of `/api/v4` the load test touches
pub fn mock_api(state: SharedState) -> Router {
    Router::new()
        .route("/api/v4/users/login", post(login))
        .route("/api/v4/users/me", get(me))
        .route("/api/v4/users/me/teams", get(my_teams))
        .route("/api/v4/teams/*path", get(teams))
        .route("/api/v4/channels", post(create_channel))
        .route("/api/v4/posts", post(create_post))
        .route("/api/v4/files", post(upload_files))
        .with_state(state)
}

/// Serve the mock API on an ephemeral port; returns its base URL
pub async fn spawn_mock_server() -> (String, SharedState) {
    let state = SharedState::default();
    let app = mock_api(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), state)
}

// ============================================================================
// Logging Configuration
// ============================================================================

/// Initialize test logging for detailed output
pub fn init_test_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "collab_loadtest=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}
