//! LLM lyrics provider client
//!
//! Sends the customer's creative brief as a structured prompt and expects a
//! `{title, lyrics}` JSON object back, with the lyrics section-tagged for
//! the parser.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tunegift_common::db::Quiz;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const USER_AGENT: &str = "TuneGift/0.1.0 (+https://tunegift.example.com)";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Lyrics provider errors
#[derive(Debug, Error)]
pub enum LyricsError {
    #[error("Lyrics provider not configured")]
    NotConfigured,

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Malformed provider response: {0}")]
    Parse(String),
}

/// The customer's creative brief, flattened for prompting
#[derive(Debug, Clone, Serialize)]
pub struct SongBrief {
    pub recipient: String,
    pub relationship: String,
    pub occasion: String,
    pub style: String,
    pub story: String,
    pub voice_type: String,
    pub language: String,
}

impl SongBrief {
    pub fn from_quiz(quiz: &Quiz) -> Self {
        // Legacy orders carry the story in structured answer fields
        let story = quiz
            .message
            .clone()
            .filter(|m| !m.trim().is_empty())
            .or_else(|| legacy_story(&quiz.answers))
            .unwrap_or_default();

        Self {
            recipient: quiz.recipient.clone().unwrap_or_default(),
            relationship: quiz.relationship.clone().unwrap_or_default(),
            occasion: quiz.occasion.clone().unwrap_or_else(|| "no particular occasion".to_string()),
            style: quiz.style.clone().unwrap_or_else(|| "pop".to_string()),
            story,
            voice_type: quiz.voice_type.clone().unwrap_or_else(|| "any".to_string()),
            language: quiz.language.clone().unwrap_or_else(|| "en".to_string()),
        }
    }
}

/// Pull a story out of the legacy structured answer fields
pub fn legacy_story(answers: &serde_json::Value) -> Option<String> {
    for key in ["story", "details", "context"] {
        if let Some(value) = answers.get(key).and_then(|v| v.as_str()) {
            if !value.trim().is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

/// Result of a successful lyrics generation
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeneratedLyrics {
    pub title: String,
    pub lyrics: String,
}

/// Seam for the LLM provider, mockable in tests
#[async_trait]
pub trait LyricsProvider: Send + Sync {
    async fn generate(&self, brief: &SongBrief) -> Result<GeneratedLyrics, LyricsError>;
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// Build the structured prompt from the brief
pub fn build_prompt(brief: &SongBrief) -> String {
    format!(
        "Write an original personalized song.\n\
         Recipient: {recipient}\n\
         Relationship to the customer: {relationship}\n\
         Occasion: {occasion}\n\
         Musical style: {style}\n\
         Desired vocal timbre: {voice}\n\
         Language: {language}\n\
         The customer's story:\n{story}\n\n\
         Respond with a single JSON object: {{\"title\": string, \"lyrics\": string}}.\n\
         The lyrics must use bracketed section tags: [Verse 1], [Pre-Chorus], [Chorus], [Bridge].",
        recipient = brief.recipient,
        relationship = brief.relationship,
        occasion = brief.occasion,
        style = brief.style,
        voice = brief.voice_type,
        language = brief.language,
        story = brief.story,
    )
}

/// Strip a markdown code fence if the model wrapped its JSON in one
pub fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

/// HTTP implementation of [`LyricsProvider`]
pub struct LyricsClient {
    http_client: reqwest::Client,
    base_url: Option<String>,
    api_key: Option<String>,
    model: String,
}

impl LyricsClient {
    pub fn new(
        base_url: Option<String>,
        api_key: Option<String>,
        model: Option<String>,
    ) -> Result<Self, LyricsError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LyricsError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url,
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        })
    }
}

#[async_trait]
impl LyricsProvider for LyricsClient {
    async fn generate(&self, brief: &SongBrief) -> Result<GeneratedLyrics, LyricsError> {
        let base_url = self.base_url.as_ref().ok_or(LyricsError::NotConfigured)?;
        let api_key = self.api_key.as_ref().ok_or(LyricsError::NotConfigured)?;

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: "You are a professional songwriter for personalized gift songs."
                        .to_string(),
                },
                ChatMessage { role: "user", content: build_prompt(brief) },
            ],
            temperature: 0.8,
        };

        tracing::debug!(model = %self.model, recipient = %brief.recipient, "Requesting lyrics generation");

        let response = self
            .http_client
            .post(format!("{}/v1/chat/completions", base_url.trim_end_matches('/')))
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| LyricsError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LyricsError::Api(status.as_u16(), body));
        }

        let chat: ChatResponse =
            response.json().await.map_err(|e| LyricsError::Parse(e.to_string()))?;
        let content = chat
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| LyricsError::Parse("response contained no choices".to_string()))?;

        let generated: GeneratedLyrics = serde_json::from_str(strip_code_fence(content))
            .map_err(|e| LyricsError::Parse(format!("expected {{title, lyrics}} JSON: {}", e)))?;

        if generated.lyrics.trim().is_empty() {
            return Err(LyricsError::Parse("provider returned empty lyrics".to_string()));
        }

        tracing::info!(title = %generated.title, "Lyrics generated");
        Ok(generated)
    }
}
