//! HTTP implementation of the platform against the `/api/v4` REST API

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url, multipart};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::service::{Platform, PlatformFactory};
use super::types::{ChannelRef, ImageUpload, PlatformError, TeamRef, UploadResult};

/// Header carrying the session token on a successful login
const TOKEN_HEADER: &str = "Token";

#[derive(Serialize)]
struct LoginRequest<'a> {
    login_id: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct TeamResponse {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ChannelResponse {
    id: String,
    name: String,
}

#[derive(Serialize)]
struct CreateChannelRequest<'a> {
    team_id: &'a str,
    name: &'a str,
    display_name: &'a str,
    #[serde(rename = "type")]
    channel_type: &'a str,
}

#[derive(Serialize)]
struct CreatePostRequest<'a> {
    channel_id: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    root_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_ids: Option<&'a [String]>,
}

#[derive(Debug, Deserialize)]
struct FileInfo {
    id: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file_infos: Vec<FileInfo>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Session against a Mattermost-style server
pub struct HttpPlatform {
    client: Client,
    base_url: String,
    token: Option<String>,
    user_id: Option<String>,
    team_ids: Vec<String>,
}

impl HttpPlatform {
    pub fn new(client: Client, server_url: &str) -> Self {
        Self {
            client,
            base_url: server_url.trim_end_matches('/').to_string(),
            token: None,
            user_id: None,
            team_ids: Vec::new(),
        }
    }

    /// Id of the logged-in user
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Team ids loaded by `initial_load`
    pub fn team_ids(&self) -> &[String] {
        &self.team_ids
    }

    /// Endpoint under `/api/v4`; every segment is percent-encoded
    fn url(&self, segments: &[&str]) -> Result<Url, PlatformError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| PlatformError::Encode(format!("server url {}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| {
                PlatformError::Encode(format!("server url {} takes no path", self.base_url))
            })?
            .pop_if_empty()
            .extend(["api", "v4"])
            .extend(segments.iter());
        Ok(url)
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        segments: &[&str],
    ) -> Result<T, PlatformError> {
        let url = self.url(segments)?;
        let resp = self.authed(self.client.get(url)).send().await?;
        let resp = check_status(resp, &route(segments)).await?;
        Ok(resp.json().await?)
    }

    async fn post_json<B: Serialize + ?Sized, T: for<'de> Deserialize<'de>>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<T, PlatformError> {
        let url = self.url(segments)?;
        let resp = self.authed(self.client.post(url)).json(body).send().await?;
        let resp = check_status(resp, &route(segments)).await?;
        Ok(resp.json().await?)
    }

    async fn create_post(
        &self,
        channel: &ChannelRef,
        message: &str,
        root_id: Option<&str>,
        file_ids: &[String],
    ) -> Result<(), PlatformError> {
        let body = CreatePostRequest {
            channel_id: &channel.id,
            message,
            root_id: root_id.filter(|id| !id.is_empty()),
            file_ids: (!file_ids.is_empty()).then_some(file_ids),
        };
        let _: serde_json::Value = self.post_json(&["posts"], &body).await?;
        Ok(())
    }
}

/// Unencoded route used to label errors, e.g. `/teams/name/foo`
fn route(segments: &[&str]) -> String {
    format!("/{}", segments.join("/"))
}

/// Map non-success responses onto `PlatformError`
async fn check_status(resp: Response, path: &str) -> Result<Response, PlatformError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    match status {
        StatusCode::UNAUTHORIZED => Err(PlatformError::SessionExpired),
        StatusCode::NOT_FOUND => Err(PlatformError::NotFound(path.to_string())),
        _ => {
            let text = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&text)
                .map(|body| body.message)
                .unwrap_or(text);
            Err(PlatformError::Http {
                status: status.as_u16(),
                message,
            })
        }
    }
}

#[async_trait]
impl Platform for HttpPlatform {
    async fn login(&mut self, email: &str, password: &str) -> Result<(), PlatformError> {
        let segments = ["users", "login"];
        let resp = self
            .client
            .post(self.url(&segments)?)
            .json(&LoginRequest {
                login_id: email,
                password,
            })
            .send()
            .await?;
        let resp = check_status(resp, &route(&segments)).await?;

        let token = resp
            .headers()
            .get(TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
            .ok_or_else(|| PlatformError::Decode("login response carried no token".into()))?;
        let user: UserResponse = resp.json().await?;

        debug!("Logged in {} as user {}", email, user.id);
        self.token = Some(token);
        self.user_id = Some(user.id);
        Ok(())
    }

    async fn initial_load(&mut self) -> Result<(), PlatformError> {
        let me: UserResponse = self.get_json(&["users", "me"]).await?;
        let teams: Vec<TeamResponse> = self.get_json(&["users", "me", "teams"]).await?;

        self.user_id = Some(me.id);
        self.team_ids = teams.into_iter().map(|t| t.id).collect();
        Ok(())
    }

    async fn find_team(&mut self, name: &str) -> Result<TeamRef, PlatformError> {
        let team: TeamResponse = self.get_json(&["teams", "name", name]).await?;
        Ok(TeamRef {
            id: team.id,
            name: team.name,
        })
    }

    async fn find_or_create_channel(
        &mut self,
        team: &TeamRef,
        name: &str,
        create: bool,
    ) -> Result<ChannelRef, PlatformError> {
        let lookup = ["teams", team.id.as_str(), "channels", "name", name];
        let channel: ChannelResponse = match self.get_json(&lookup).await {
            Ok(channel) => channel,
            Err(PlatformError::NotFound(_)) if create => {
                debug!("Channel {} missing in team {}, creating", name, team.name);
                let body = CreateChannelRequest {
                    team_id: &team.id,
                    name,
                    display_name: name,
                    channel_type: "O",
                };
                self.post_json(&["channels"], &body).await?
            }
            Err(e) => return Err(e),
        };

        Ok(ChannelRef {
            id: channel.id,
            name: channel.name,
        })
    }

    async fn send_message(
        &mut self,
        channel: &ChannelRef,
        text: &str,
        reply_root_id: Option<&str>,
    ) -> Result<(), PlatformError> {
        self.create_post(channel, text, reply_root_id, &[]).await
    }

    async fn upload_image(
        &mut self,
        channel: &ChannelRef,
        image: ImageUpload,
    ) -> Result<UploadResult, PlatformError> {
        let segments = ["files"];
        let part = multipart::Part::bytes(image.bytes)
            .file_name(image.filename)
            .mime_str(image.content_type)
            .map_err(|e| PlatformError::Encode(e.to_string()))?;
        let form = multipart::Form::new()
            .text("channel_id", channel.id.clone())
            .part("files", part);

        let resp = self
            .authed(self.client.post(self.url(&segments)?))
            .multipart(form)
            .send()
            .await?;
        let resp = check_status(resp, &route(&segments)).await?;
        let upload: UploadResponse = resp.json().await?;

        Ok(UploadResult {
            filenames: upload.file_infos.into_iter().map(|f| f.id).collect(),
        })
    }

    async fn send_attachment(
        &mut self,
        channel: &ChannelRef,
        caption: &str,
        filenames: &[String],
        reply_root_id: Option<&str>,
    ) -> Result<(), PlatformError> {
        self.create_post(channel, caption, reply_root_id, filenames)
            .await
    }

    fn session_token(&self) -> Option<String> {
        self.token.clone()
    }
}

/// Hands out `HttpPlatform` sessions sharing one connection pool
#[derive(Clone)]
pub struct HttpPlatformFactory {
    client: Client,
}

impl HttpPlatformFactory {
    pub fn new(request_timeout: Duration) -> Result<Self, PlatformError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| PlatformError::Transport(e.to_string()))?;
        Ok(Self { client })
    }
}

impl PlatformFactory for HttpPlatformFactory {
    fn connect(&self, server_url: &str) -> Box<dyn Platform> {
        Box::new(HttpPlatform::new(self.client.clone(), server_url))
    }
}
