//! Platform trait definitions

use async_trait::async_trait;

use super::types::{ChannelRef, ImageUpload, PlatformError, TeamRef, UploadResult};

/// One user's session against the target collaboration service.
///
/// Every worker owns its own handle; implementations do not need to be
/// shareable across workers.
#[async_trait]
pub trait Platform: Send {
    /// Authenticate with email and password
    async fn login(&mut self, email: &str, password: &str) -> Result<(), PlatformError>;

    /// Fetch what a client loads right after login (profile, memberships)
    async fn initial_load(&mut self) -> Result<(), PlatformError>;

    /// Look up a team by name
    async fn find_team(&mut self, name: &str) -> Result<TeamRef, PlatformError>;

    /// Look up a channel by name, creating it when missing and `create` is set
    async fn find_or_create_channel(
        &mut self,
        team: &TeamRef,
        name: &str,
        create: bool,
    ) -> Result<ChannelRef, PlatformError>;

    /// Post a plain text message
    async fn send_message(
        &mut self,
        channel: &ChannelRef,
        text: &str,
        reply_root_id: Option<&str>,
    ) -> Result<(), PlatformError>;

    /// Upload an image into a channel without posting it
    async fn upload_image(
        &mut self,
        channel: &ChannelRef,
        image: ImageUpload,
    ) -> Result<UploadResult, PlatformError>;

    /// Post a message referencing previously uploaded files
    async fn send_attachment(
        &mut self,
        channel: &ChannelRef,
        caption: &str,
        filenames: &[String],
        reply_root_id: Option<&str>,
    ) -> Result<(), PlatformError>;

    /// Session token of the authenticated user, if the backend exposes one
    fn session_token(&self) -> Option<String> {
        None
    }
}

/// Creates fresh platform handles bound to a target URL
pub trait PlatformFactory: Send + Sync {
    fn connect(&self, server_url: &str) -> Box<dyn Platform>;
}
