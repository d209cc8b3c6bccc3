//! In-memory metadata catalog.
//!
//! Used when no provider URL is configured, and by tests that need a
//! deterministic provider.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{MetadataError, MetadataLookup, VideoId, VideoMetadata};

/// Video ID → metadata の固定カタログ
#[derive(Default)]
pub struct StaticMetadataCatalog {
    entries: RwLock<HashMap<String, VideoMetadata>>,
}

impl StaticMetadataCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// カタログに登録済みのエントリで初期化
    pub fn with_entries(entries: impl IntoIterator<Item = (String, VideoMetadata)>) -> Self {
        Self {
            entries: RwLock::new(entries.into_iter().collect()),
        }
    }

    pub async fn insert(&self, video_id: impl Into<String>, metadata: VideoMetadata) {
        self.entries.write().await.insert(video_id.into(), metadata);
    }
}

#[async_trait]
impl MetadataLookup for StaticMetadataCatalog {
    async fn lookup(&self, video_id: &VideoId) -> Result<VideoMetadata, MetadataError> {
        self.entries
            .read()
            .await
            .get(video_id.as_str())
            .cloned()
            .ok_or_else(|| MetadataError::NotFound(video_id.as_str().to_string()))
    }
}
