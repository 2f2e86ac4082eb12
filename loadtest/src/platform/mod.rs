//! Target service access
//!
//! This module provides:
//! - `Platform` trait for one simulated user's session
//! - `PlatformFactory` for handing every worker its own session
//! - `HttpPlatform` speaking the Mattermost-style `/api/v4` REST API

mod http;
mod service;
mod types;

pub use http::{HttpPlatform, HttpPlatformFactory};
pub use service::{Platform, PlatformFactory};
pub use types::{ChannelRef, ImageUpload, PlatformError, TeamRef, UploadResult};
