//! Platform-related types and error definitions

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned by the target collaboration service
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlatformError {
    #[error("Session expired or rejected")]
    SessionExpired,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Failed to encode payload: {0}")]
    Encode(String),

    #[error("{0}")]
    Other(String),
}

impl PlatformError {
    /// Whether the failure means the user's session is gone and further
    /// calls on this handle cannot succeed.
    pub fn is_session_loss(&self) -> bool {
        matches!(self, PlatformError::SessionExpired)
    }
}

impl From<reqwest::Error> for PlatformError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            PlatformError::Decode(err.to_string())
        } else {
            PlatformError::Transport(err.to_string())
        }
    }
}

/// Resolved team reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamRef {
    pub id: String,
    pub name: String,
}

/// Resolved channel reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRef {
    pub id: String,
    pub name: String,
}

/// Image file to upload into a channel
#[derive(Debug, Clone)]
pub struct ImageUpload {
    /// File name presented to the server
    pub filename: String,
    /// MIME type of `bytes`
    pub content_type: &'static str,
    /// Encoded image
    pub bytes: Vec<u8>,
}

/// Result of a successful upload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadResult {
    /// Server-side file identifiers to reference from a post
    pub filenames: Vec<String>,
}
