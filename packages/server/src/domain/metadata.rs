//! External video-metadata provider interface.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{MetadataError, VideoId};

/// Provider answer for one video
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoMetadata {
    pub title: String,
    pub duration_seconds: u32,
    pub is_available: bool,
    /// False for non-embeddable or restricted videos
    pub is_appropriate: bool,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataLookup: Send + Sync {
    async fn lookup(&self, video_id: &VideoId) -> Result<VideoMetadata, MetadataError>;
}
