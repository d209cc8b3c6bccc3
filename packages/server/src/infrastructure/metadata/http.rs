//! HTTP metadata provider client.
//!
//! `GET {base_url}/videos/{video_id}` returning a [`VideoMetadata`] JSON body.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::domain::{MetadataError, MetadataLookup, VideoId, VideoMetadata};

pub struct HttpMetadataClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpMetadataClient {
    /// Build a client whose requests give up after `timeout`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, MetadataError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                MetadataError::Unavailable(format!("Failed to create HTTP client: {}", e))
            })?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn video_url(&self, video_id: &VideoId) -> String {
        format!("{}/videos/{}", self.base_url, video_id.as_str())
    }
}

#[async_trait]
impl MetadataLookup for HttpMetadataClient {
    async fn lookup(&self, video_id: &VideoId) -> Result<VideoMetadata, MetadataError> {
        let url = self.video_url(video_id);
        tracing::debug!("Looking up video metadata: {}", url);

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                MetadataError::Timeout
            } else {
                MetadataError::Unavailable(format!("request failed: {}", e))
            }
        })?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                return Err(MetadataError::NotFound(video_id.as_str().to_string()));
            }
            status if !status.is_success() => {
                return Err(MetadataError::Unavailable(format!(
                    "provider responded {}",
                    status
                )));
            }
            _ => {}
        }

        response
            .json::<VideoMetadata>()
            .await
            .map_err(|e| MetadataError::Malformed(e.to_string()))
    }
}
