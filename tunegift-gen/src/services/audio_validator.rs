//! Audio artifact integrity validation
//!
//! Downloads a remote audio artifact and validates size, type and
//! completeness before anything is persisted. Transient failures (timeout,
//! network, 5xx, 429) are retried with exponential backoff; everything else
//! fails immediately.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Hard timeout for one artifact fetch
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Total attempts for transient failures (initial + 2 retries)
pub const MAX_FETCH_ATTEMPTS: u32 = 3;

/// Largest artifact accepted (50 MB)
pub const MAX_ARTIFACT_BYTES: usize = 50 * 1024 * 1024;

/// Allowed divergence between Content-Length and the delivered byte count
const COMPLETENESS_TOLERANCE: f64 = 0.05;

const USER_AGENT: &str = "TuneGift/0.1.0 (+https://tunegift.example.com)";

/// Content types providers legitimately deliver. Providers are known to
/// mislabel audio, so a mismatch is a warning, never a hard failure.
const AUDIO_CONTENT_TYPES: &[&str] = &[
    "audio/mpeg",
    "audio/mp3",
    "audio/wav",
    "audio/x-wav",
    "audio/mp4",
    "audio/aac",
    "audio/ogg",
    "audio/flac",
    "application/octet-stream",
];

/// Integrity validation errors
#[derive(Debug, Error)]
pub enum IntegrityError {
    #[error("Request timed out")]
    Timeout,

    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP error {0}")]
    Http(u16),

    #[error("Artifact too small: {size} bytes (minimum {min})")]
    TooSmall { size: usize, min: usize },

    #[error("Artifact too large: {size} bytes (maximum {max})")]
    TooLarge { size: usize, max: usize },

    #[error("Incomplete download: Content-Length {expected} bytes, received {actual}")]
    Incomplete { expected: u64, actual: u64 },
}

impl IntegrityError {
    /// Transient errors are worth retrying; all others fail fast
    pub fn is_transient(&self) -> bool {
        match self {
            IntegrityError::Timeout | IntegrityError::Network(_) => true,
            IntegrityError::Http(status) => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            IntegrityError::Timeout
        } else {
            IntegrityError::Network(err.to_string())
        }
    }
}

/// A downloaded artifact that passed validation
#[derive(Debug, Clone)]
pub struct ValidatedArtifact {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    pub size: usize,
}

/// Seam for artifact download + validation, mockable in tests
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    /// Fetch `url` and validate size/type/completeness. `min_size` varies by
    /// caller (full songs demand more bytes than stem tracks).
    async fn fetch_and_validate(
        &self,
        url: &str,
        min_size: usize,
    ) -> Result<ValidatedArtifact, IntegrityError>;
}

/// Backoff before retry `attempt` (1-based): 2^(attempt-1) seconds
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1u64 << (attempt.saturating_sub(1)).min(6))
}

/// Cross-check the Content-Length header against the delivered byte count.
/// More than 5% divergence means the download was interrupted.
pub fn check_completeness(content_length: Option<u64>, actual: u64) -> Result<(), IntegrityError> {
    let Some(expected) = content_length else {
        return Ok(());
    };
    if expected == 0 {
        return Ok(());
    }

    let divergence = (expected as f64 - actual as f64).abs() / expected as f64;
    if divergence > COMPLETENESS_TOLERANCE {
        return Err(IntegrityError::Incomplete { expected, actual });
    }
    Ok(())
}

fn is_known_audio_type(content_type: &str) -> bool {
    let essence = content_type.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    AUDIO_CONTENT_TYPES.contains(&essence.as_str())
}

/// HTTP implementation of [`ArtifactFetcher`]
pub struct HttpArtifactFetcher {
    http_client: reqwest::Client,
}

impl HttpArtifactFetcher {
    pub fn new() -> Result<Self, IntegrityError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| IntegrityError::Network(e.to_string()))?;
        Ok(Self { http_client })
    }

    async fn fetch_once(
        &self,
        url: &str,
        min_size: usize,
    ) -> Result<ValidatedArtifact, IntegrityError> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(IntegrityError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(IntegrityError::Http(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        let content_length = response.content_length();

        let bytes = response.bytes().await.map_err(IntegrityError::from_reqwest)?;
        let size = bytes.len();

        if size < min_size {
            return Err(IntegrityError::TooSmall { size, min: min_size });
        }
        if size > MAX_ARTIFACT_BYTES {
            return Err(IntegrityError::TooLarge { size, max: MAX_ARTIFACT_BYTES });
        }

        check_completeness(content_length, size as u64)?;

        if let Some(ct) = &content_type {
            if !is_known_audio_type(ct) {
                tracing::warn!(url, content_type = %ct, "Unexpected content type for audio artifact");
            }
        }

        Ok(ValidatedArtifact { bytes: bytes.to_vec(), content_type, size })
    }
}

#[async_trait]
impl ArtifactFetcher for HttpArtifactFetcher {
    async fn fetch_and_validate(
        &self,
        url: &str,
        min_size: usize,
    ) -> Result<ValidatedArtifact, IntegrityError> {
        let mut attempt = 1;
        loop {
            match self.fetch_once(url, min_size).await {
                Ok(artifact) => {
                    tracing::debug!(url, size = artifact.size, attempt, "Audio artifact validated");
                    return Ok(artifact);
                }
                Err(err) if err.is_transient() && attempt < MAX_FETCH_ATTEMPTS => {
                    let delay = backoff_delay(attempt);
                    tracing::warn!(
                        url,
                        attempt,
                        delay_secs = delay.as_secs(),
                        error = %err,
                        "Transient artifact fetch failure, will retry"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
