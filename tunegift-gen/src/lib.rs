//! tunegift-gen library interface
//!
//! Exposes the application state, router and pipeline modules for
//! integration testing.

pub mod api;
pub mod db;
pub mod error;
pub mod pipeline;
pub mod services;

#[doc(hidden)]
pub mod test_support;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::RwLock;
use tunegift_common::events::EventBus;

use crate::services::audio_validator::ArtifactFetcher;
use crate::services::lyrics_client::LyricsProvider;
use crate::services::music_client::MusicProvider;
use crate::services::stem_client::StemProvider;
use crate::services::storage::ArtifactStore;

/// Application state shared across handlers and pipeline stages
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Event bus decoupling side effects (notifications) from the pipeline
    pub event_bus: EventBus,
    /// LLM lyrics provider
    pub lyrics: Arc<dyn LyricsProvider>,
    /// Music-generation provider
    pub music: Arc<dyn MusicProvider>,
    /// Stem-separation provider
    pub stems: Arc<dyn StemProvider>,
    /// Audio artifact fetcher + integrity validator
    pub fetcher: Arc<dyn ArtifactFetcher>,
    /// Durable storage for separated stems
    pub storage: Arc<dyn ArtifactStore>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        lyrics: Arc<dyn LyricsProvider>,
        music: Arc<dyn MusicProvider>,
        stems: Arc<dyn StemProvider>,
        fetcher: Arc<dyn ArtifactFetcher>,
        storage: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self {
            db,
            event_bus,
            lyrics,
            music,
            stems,
            fetcher,
            storage,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Record an error for the health endpoint, without failing the caller
    pub async fn record_error(&self, message: impl Into<String>) {
        let message = message.into();
        *self.last_error.write().await = Some(message);
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::job_routes())
        .merge(api::webhook_routes())
        .merge(api::sweep_routes())
        .merge(api::health_routes())
        .with_state(state)
}
