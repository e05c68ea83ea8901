//! Durable artifact storage client
//!
//! Re-hosts validated provider artifacts under our own domain. Provider CDN
//! URLs expire, so every audio and cover URL a customer sees must point at
//! storage we control.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const USER_AGENT: &str = "TuneGift/0.1.0 (+https://tunegift.example.com)";

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage backend not configured")]
    NotConfigured,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Storage error {0}: {1}")]
    Api(u16, String),
}

/// Seam for durable artifact storage, mockable in tests
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store `bytes` under `key`; returns the durable public URL
    async fn store(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<String, StorageError>;
}

/// Object key for a separated stem track
pub fn stem_key(song_id: uuid::Uuid, stem: &str) -> String {
    format!("stems/{}/{}.mp3", song_id, stem)
}

/// HTTP implementation of [`ArtifactStore`] against an S3-style PUT endpoint
pub struct StorageClient {
    http_client: reqwest::Client,
    base_url: Option<String>,
    api_key: Option<String>,
}

impl StorageClient {
    pub fn new(base_url: Option<String>, api_key: Option<String>) -> Result<Self, StorageError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StorageError::Network(e.to_string()))?;
        Ok(Self { http_client, base_url, api_key })
    }
}

#[async_trait]
impl ArtifactStore for StorageClient {
    async fn store(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<String, StorageError> {
        let base_url = self.base_url.as_ref().ok_or(StorageError::NotConfigured)?;
        let api_key = self.api_key.as_ref().ok_or(StorageError::NotConfigured)?;

        let url = format!("{}/{}", base_url.trim_end_matches('/'), key);
        let size = bytes.len();

        let mut request = self.http_client.put(&url).bearer_auth(api_key).body(bytes);
        if let Some(ct) = content_type {
            request = request.header(reqwest::header::CONTENT_TYPE, ct);
        }

        let response = request.send().await.map_err(|e| StorageError::Network(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(StorageError::Api(status.as_u16(), text));
        }

        tracing::debug!(key, size, "Artifact stored");
        Ok(url)
    }
}
