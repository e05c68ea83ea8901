//! Music synthesis provider client
//!
//! The provider's payloads drift between versions (camelCase vs snake_case,
//! different envelope keys), so every field is read through an ordered
//! candidate list. All of that tolerance lives here; the pipeline only sees
//! [`TaskStatus`] and [`VariantPayload`].

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = "TuneGift/0.1.0 (+https://tunegift.example.com)";

/// Candidate keys for the task identifier in submit responses
const TASK_ID_KEYS: &[&str] = &["task_id", "taskId", "id", "task"];

/// Candidate keys for arrays of rendered variants
const VARIANT_LIST_KEYS: &[&str] = &["data", "clips", "songs", "items", "output"];

const AUDIO_URL_KEYS: &[&str] = &["audio_url", "audioUrl", "url", "song_url", "stream_audio_url"];
const COVER_URL_KEYS: &[&str] = &["image_url", "cover_url", "imageUrl", "image_large_url", "cover"];
const CLIP_ID_KEYS: &[&str] = &["clip_id", "clipId", "id", "song_id", "audio_id"];
const DURATION_KEYS: &[&str] = &["duration", "audio_duration", "duration_seconds"];
const ERROR_KEYS: &[&str] = &["error", "message", "error_message", "msg"];

/// Music provider errors
#[derive(Debug, Error)]
pub enum MusicError {
    #[error("Music provider not configured")]
    NotConfigured,

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Malformed provider response: {0}")]
    Parse(String),
}

/// What the pipeline asks the provider to render
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub lyrics: String,
    pub title: String,
    pub style: String,
    pub voice_type: String,
}

/// Coarse task lifecycle, mapped from whatever status strings the provider
/// currently emits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPhase {
    Processing,
    Complete,
    Failed,
}

/// One rendered audio variant as reported by the provider
#[derive(Debug, Clone, PartialEq)]
pub struct VariantPayload {
    pub audio_url: String,
    pub cover_url: Option<String>,
    pub duration_secs: Option<f64>,
    pub clip_id: Option<String>,
}

/// Normalized view of a generation task
#[derive(Debug, Clone)]
pub struct TaskStatus {
    pub phase: TaskPhase,
    pub error: Option<String>,
    pub variants: Vec<VariantPayload>,
}

/// Seam for the synthesis provider, mockable in tests
#[async_trait]
pub trait MusicProvider: Send + Sync {
    /// Submit a render job; returns the provider's task id
    async fn submit(&self, request: &GenerationRequest) -> Result<String, MusicError>;

    /// Query current task state
    async fn query_status(&self, task_id: &str) -> Result<TaskStatus, MusicError>;
}

fn first_str<'a>(obj: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| obj.get(*k).and_then(|v| v.as_str()).filter(|s| !s.is_empty()))
}

fn first_f64(obj: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| {
        let v = obj.get(*k)?;
        v.as_f64().or_else(|| v.as_str().and_then(|s| s.parse().ok()))
    })
}

/// Find the task id anywhere the provider is known to put it
pub fn extract_task_id(payload: &Value) -> Option<String> {
    if let Some(id) = first_str(payload, TASK_ID_KEYS) {
        return Some(id.to_string());
    }
    // Some envelope versions nest the real payload one level down
    for key in VARIANT_LIST_KEYS {
        if let Some(inner) = payload.get(*key) {
            if inner.is_object() {
                if let Some(id) = first_str(inner, TASK_ID_KEYS) {
                    return Some(id.to_string());
                }
            }
        }
    }
    None
}

fn variant_from_value(value: &Value) -> Option<VariantPayload> {
    let audio_url = first_str(value, AUDIO_URL_KEYS)?;
    Some(VariantPayload {
        audio_url: audio_url.to_string(),
        cover_url: first_str(value, COVER_URL_KEYS).map(|s| s.to_string()),
        duration_secs: first_f64(value, DURATION_KEYS),
        clip_id: first_str(value, CLIP_ID_KEYS).map(|s| s.to_string()),
    })
}

/// Collect rendered variants from any of the known list shapes.
/// Entries without an audio URL are skipped, they are still rendering.
pub fn extract_variants(payload: &Value) -> Vec<VariantPayload> {
    let list = if let Some(array) = payload.as_array() {
        Some(array)
    } else {
        VARIANT_LIST_KEYS.iter().find_map(|k| {
            let v = payload.get(*k)?;
            v.as_array().or_else(|| v.get("clips").and_then(|c| c.as_array()))
        })
    };

    list.map(|items| items.iter().filter_map(variant_from_value).collect()).unwrap_or_default()
}

/// Map the provider's status string onto a coarse phase.
/// Unknown strings read as still-processing, never as failed.
pub fn payload_phase(payload: &Value) -> TaskPhase {
    let status = first_str(payload, &["status", "state", "task_status"])
        .map(|s| s.to_ascii_lowercase())
        .unwrap_or_default();

    match status.as_str() {
        "complete" | "completed" | "success" | "succeeded" | "finished" | "done" => {
            TaskPhase::Complete
        }
        "failed" | "error" | "cancelled" | "canceled" => TaskPhase::Failed,
        _ => TaskPhase::Processing,
    }
}

/// Best-effort human-readable error from a failed payload
pub fn payload_error(payload: &Value) -> Option<String> {
    first_str(payload, ERROR_KEYS).map(|s| s.to_string()).or_else(|| {
        payload.get("error").and_then(|e| first_str(e, &["message", "msg"])).map(|s| s.to_string())
    })
}

/// Normalize a raw status payload into a [`TaskStatus`]
pub fn normalize_status(payload: &Value) -> TaskStatus {
    let phase = payload_phase(payload);
    TaskStatus {
        phase,
        error: if phase == TaskPhase::Failed { payload_error(payload) } else { None },
        variants: extract_variants(payload),
    }
}

/// HTTP implementation of [`MusicProvider`]
pub struct MusicClient {
    http_client: reqwest::Client,
    base_url: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    callback_url: Option<String>,
}

impl MusicClient {
    pub fn new(
        base_url: Option<String>,
        api_key: Option<String>,
        model: Option<String>,
        callback_url: Option<String>,
    ) -> Result<Self, MusicError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| MusicError::Network(e.to_string()))?;

        Ok(Self { http_client, base_url, api_key, model, callback_url })
    }

    fn endpoint(&self, path: &str) -> Result<String, MusicError> {
        let base = self.base_url.as_ref().ok_or(MusicError::NotConfigured)?;
        Ok(format!("{}{}", base.trim_end_matches('/'), path))
    }
}

#[async_trait]
impl MusicProvider for MusicClient {
    async fn submit(&self, request: &GenerationRequest) -> Result<String, MusicError> {
        let api_key = self.api_key.as_ref().ok_or(MusicError::NotConfigured)?;
        let url = self.endpoint("/api/v1/generate")?;

        let mut body = serde_json::json!({
            "prompt": request.lyrics,
            "title": request.title,
            "style": request.style,
            "vocal_gender": request.voice_type,
            "custom_mode": true,
            "instrumental": false,
        });
        if let Some(model) = &self.model {
            body["model"] = Value::String(model.clone());
        }
        if let Some(callback) = &self.callback_url {
            body["callback_url"] = Value::String(callback.clone());
        }

        tracing::info!(title = %request.title, style = %request.style, "Submitting music generation task");

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| MusicError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(MusicError::Api(status.as_u16(), text));
        }

        let payload: Value =
            response.json().await.map_err(|e| MusicError::Parse(e.to_string()))?;
        let task_id = extract_task_id(&payload)
            .ok_or_else(|| MusicError::Parse(format!("no task id in submit response: {}", payload)))?;

        tracing::info!(task_id = %task_id, "Music generation task accepted");
        Ok(task_id)
    }

    async fn query_status(&self, task_id: &str) -> Result<TaskStatus, MusicError> {
        let api_key = self.api_key.as_ref().ok_or(MusicError::NotConfigured)?;
        let url = self.endpoint(&format!("/api/v1/generate/record-info?taskId={}", task_id))?;

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(api_key)
            .send()
            .await
            .map_err(|e| MusicError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(MusicError::Api(status.as_u16(), text));
        }

        let payload: Value =
            response.json().await.map_err(|e| MusicError::Parse(e.to_string()))?;

        // The envelope may wrap the task record under "data"
        let record = payload.get("data").filter(|d| d.is_object()).unwrap_or(&payload);
        Ok(normalize_status(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_task_id_aliases() {
        assert_eq!(extract_task_id(&json!({"task_id": "t-1"})), Some("t-1".to_string()));
        assert_eq!(extract_task_id(&json!({"taskId": "t-2"})), Some("t-2".to_string()));
        assert_eq!(extract_task_id(&json!({"id": "t-3"})), Some("t-3".to_string()));
        assert_eq!(extract_task_id(&json!({"data": {"taskId": "t-4"}})), Some("t-4".to_string()));
        assert_eq!(extract_task_id(&json!({"code": 200})), None);
    }

    #[test]
    fn test_extract_variants_snake_and_camel() {
        let payload = json!({
            "data": [
                {"audio_url": "https://cdn/a.mp3", "image_url": "https://cdn/a.jpg",
                 "duration": 182.4, "clip_id": "c-1"},
                {"audioUrl": "https://cdn/b.mp3", "imageUrl": "https://cdn/b.jpg",
                 "duration_seconds": "195.0", "clipId": "c-2"},
            ]
        });

        let variants = extract_variants(&payload);
        assert_eq!(variants.len(), 2);
        assert_eq!(variants[0].audio_url, "https://cdn/a.mp3");
        assert_eq!(variants[0].duration_secs, Some(182.4));
        assert_eq!(variants[0].clip_id.as_deref(), Some("c-1"));
        assert_eq!(variants[1].audio_url, "https://cdn/b.mp3");
        assert_eq!(variants[1].duration_secs, Some(195.0));
        assert_eq!(variants[1].clip_id.as_deref(), Some("c-2"));
    }

    #[test]
    fn test_variants_without_audio_url_skipped() {
        let payload = json!({
            "clips": [
                {"clip_id": "still-rendering"},
                {"audio_url": "https://cdn/done.mp3", "id": "done"},
            ]
        });
        let variants = extract_variants(&payload);
        assert_eq!(variants.len(), 1);
        assert_eq!(variants[0].clip_id.as_deref(), Some("done"));
    }

    #[test]
    fn test_payload_as_bare_array() {
        let payload = json!([{"url": "https://cdn/x.mp3"}]);
        assert_eq!(extract_variants(&payload).len(), 1);
    }

    #[test]
    fn test_phase_mapping() {
        assert_eq!(payload_phase(&json!({"status": "SUCCESS"})), TaskPhase::Complete);
        assert_eq!(payload_phase(&json!({"state": "completed"})), TaskPhase::Complete);
        assert_eq!(payload_phase(&json!({"status": "failed"})), TaskPhase::Failed);
        assert_eq!(payload_phase(&json!({"status": "TEXT_SUCCESS_PENDING_AUDIO"})), TaskPhase::Processing);
        assert_eq!(payload_phase(&json!({})), TaskPhase::Processing);
    }

    #[test]
    fn test_error_extraction() {
        assert_eq!(
            payload_error(&json!({"error_message": "quota exceeded"})),
            Some("quota exceeded".to_string())
        );
        assert_eq!(
            payload_error(&json!({"error": {"message": "bad lyrics"}})),
            Some("bad lyrics".to_string())
        );
        assert_eq!(payload_error(&json!({"status": "failed"})), None);
    }

    #[test]
    fn test_normalize_failed_status_carries_error() {
        let status = normalize_status(&json!({"status": "failed", "msg": "render aborted"}));
        assert_eq!(status.phase, TaskPhase::Failed);
        assert_eq!(status.error.as_deref(), Some("render aborted"));
        assert!(status.variants.is_empty());
    }
}
