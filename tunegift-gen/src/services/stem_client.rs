//! Stem separation provider client
//!
//! Submits a vocal/instrumental split for an already-rendered song. The
//! provider reports results only through its callback, so the submit call
//! carries a callback URL tagged with our own identifiers.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = "TuneGift/0.1.0 (+https://tunegift.example.com)";

/// Stem provider errors
#[derive(Debug, Error)]
pub enum StemError {
    #[error("Stem provider not configured")]
    NotConfigured,

    #[error("Invalid callback URL: {0}")]
    Callback(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Malformed provider response: {0}")]
    Parse(String),
}

/// Seam for the separation provider, mockable in tests
#[async_trait]
pub trait StemProvider: Send + Sync {
    /// Submit a separation for `audio_url`; returns the provider's task id.
    /// `song_id` and `separation_id` are embedded in the callback URL so the
    /// callback can be resolved even when the provider echoes nothing back.
    async fn submit(
        &self,
        audio_url: &str,
        audio_id: Option<&str>,
        song_id: Uuid,
        separation_id: Uuid,
    ) -> Result<String, StemError>;
}

/// Build the callback URL the provider will POST results to
pub fn build_callback_url(
    callback_base: &str,
    song_id: Uuid,
    separation_id: Uuid,
) -> Result<String, StemError> {
    let mut url = Url::parse(callback_base).map_err(|e| StemError::Callback(e.to_string()))?;
    url.query_pairs_mut()
        .append_pair("song_id", &song_id.to_string())
        .append_pair("separation_id", &separation_id.to_string());
    Ok(url.to_string())
}

/// HTTP implementation of [`StemProvider`]
pub struct StemClient {
    http_client: reqwest::Client,
    base_url: Option<String>,
    api_key: Option<String>,
    callback_base: Option<String>,
}

impl StemClient {
    pub fn new(
        base_url: Option<String>,
        api_key: Option<String>,
        callback_base: Option<String>,
    ) -> Result<Self, StemError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StemError::Network(e.to_string()))?;

        Ok(Self { http_client, base_url, api_key, callback_base })
    }
}

#[async_trait]
impl StemProvider for StemClient {
    async fn submit(
        &self,
        audio_url: &str,
        audio_id: Option<&str>,
        song_id: Uuid,
        separation_id: Uuid,
    ) -> Result<String, StemError> {
        let base_url = self.base_url.as_ref().ok_or(StemError::NotConfigured)?;
        let api_key = self.api_key.as_ref().ok_or(StemError::NotConfigured)?;
        let callback_base = self.callback_base.as_ref().ok_or(StemError::NotConfigured)?;

        let callback_url = build_callback_url(callback_base, song_id, separation_id)?;

        let mut body = serde_json::json!({
            "audio_url": audio_url,
            "type": "separate_vocal",
            "callback_url": callback_url,
        });
        if let Some(audio_id) = audio_id {
            body["audio_id"] = Value::String(audio_id.to_string());
        }

        tracing::info!(%song_id, %separation_id, "Submitting stem separation task");

        let response = self
            .http_client
            .post(format!("{}/api/v1/vocal-removal/generate", base_url.trim_end_matches('/')))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| StemError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(StemError::Api(status.as_u16(), text));
        }

        let payload: Value = response.json().await.map_err(|e| StemError::Parse(e.to_string()))?;
        let task_id = super::music_client::extract_task_id(&payload).ok_or_else(|| {
            StemError::Parse(format!("no task id in separation response: {}", payload))
        })?;

        tracing::info!(%song_id, task_id = %task_id, "Stem separation task accepted");
        Ok(task_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_url_carries_both_ids() {
        let song_id = Uuid::new_v4();
        let separation_id = Uuid::new_v4();
        let url =
            build_callback_url("https://gen.example.com/webhooks/stems", song_id, separation_id)
                .unwrap();

        let parsed = Url::parse(&url).unwrap();
        let pairs: Vec<(String, String)> =
            parsed.query_pairs().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        assert!(pairs.contains(&("song_id".to_string(), song_id.to_string())));
        assert!(pairs.contains(&("separation_id".to_string(), separation_id.to_string())));
    }

    #[test]
    fn test_callback_url_preserves_existing_query() {
        let url = build_callback_url(
            "https://gen.example.com/webhooks/stems?source=provider",
            Uuid::nil(),
            Uuid::nil(),
        )
        .unwrap();
        assert!(url.contains("source=provider"));
        assert!(url.contains("song_id="));
    }

    #[test]
    fn test_invalid_callback_base_rejected() {
        let err = build_callback_url("not a url", Uuid::nil(), Uuid::nil()).unwrap_err();
        assert!(matches!(err, StemError::Callback(_)));
    }
}
