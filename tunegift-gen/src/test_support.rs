//! Stub providers and fixtures shared by unit and integration tests.
//! Not part of the public API.

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tunegift_common::db::{init_memory_database, Order, OrderStatus, PlanTier, Quiz};
use tunegift_common::events::EventBus;
use uuid::Uuid;

use crate::db;
use crate::services::audio_validator::{ArtifactFetcher, IntegrityError, ValidatedArtifact};
use crate::services::lyrics_client::{GeneratedLyrics, LyricsError, LyricsProvider, SongBrief};
use crate::services::music_client::{
    GenerationRequest, MusicError, MusicProvider, TaskPhase, TaskStatus,
};
use crate::services::stem_client::{StemError, StemProvider};
use crate::services::storage::{ArtifactStore, StorageError};
use crate::AppState;

pub const STUB_LYRICS: &str =
    "[Verse 1]\nWalking down the old dirt road\n[Pre-Chorus]\nHere it comes\n[Chorus]\nSing it loud";

#[derive(Default)]
pub struct StubLyrics {
    pub fail: AtomicBool,
    pub calls: AtomicU64,
}

#[async_trait]
impl LyricsProvider for StubLyrics {
    async fn generate(&self, brief: &SongBrief) -> Result<GeneratedLyrics, LyricsError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(LyricsError::Api(500, "stub lyrics failure".to_string()));
        }
        Ok(GeneratedLyrics {
            title: format!("Song for {}", brief.recipient),
            lyrics: STUB_LYRICS.to_string(),
        })
    }
}

#[derive(Default)]
pub struct StubMusic {
    pub fail_submit: AtomicBool,
    pub submitted: Mutex<Vec<String>>,
    pub statuses: Mutex<HashMap<String, TaskStatus>>,
    counter: AtomicU64,
}

impl StubMusic {
    pub fn set_status(&self, task_id: &str, status: TaskStatus) {
        self.statuses.lock().unwrap().insert(task_id.to_string(), status);
    }

    pub fn submissions(&self) -> usize {
        self.submitted.lock().unwrap().len()
    }
}

#[async_trait]
impl MusicProvider for StubMusic {
    async fn submit(&self, _request: &GenerationRequest) -> Result<String, MusicError> {
        let task_id = format!("task-{}", self.counter.fetch_add(1, Ordering::SeqCst));
        self.submitted.lock().unwrap().push(task_id.clone());
        if self.fail_submit.load(Ordering::SeqCst) {
            return Err(MusicError::Api(503, "stub submit failure".to_string()));
        }
        Ok(task_id)
    }

    async fn query_status(&self, task_id: &str) -> Result<TaskStatus, MusicError> {
        Ok(self.statuses.lock().unwrap().get(task_id).cloned().unwrap_or(TaskStatus {
            phase: TaskPhase::Processing,
            error: None,
            variants: Vec::new(),
        }))
    }
}

#[derive(Default)]
pub struct StubStems {
    pub submitted: Mutex<Vec<(String, Uuid, Uuid)>>,
    counter: AtomicU64,
}

#[async_trait]
impl StemProvider for StubStems {
    async fn submit(
        &self,
        audio_url: &str,
        _audio_id: Option<&str>,
        song_id: Uuid,
        separation_id: Uuid,
    ) -> Result<String, StemError> {
        self.submitted.lock().unwrap().push((audio_url.to_string(), song_id, separation_id));
        Ok(format!("stem-task-{}", self.counter.fetch_add(1, Ordering::SeqCst)))
    }
}

#[derive(Default)]
pub struct StubFetcher {
    pub broken_urls: Mutex<HashSet<String>>,
}

impl StubFetcher {
    pub fn break_url(&self, url: &str) {
        self.broken_urls.lock().unwrap().insert(url.to_string());
    }
}

#[async_trait]
impl ArtifactFetcher for StubFetcher {
    async fn fetch_and_validate(
        &self,
        url: &str,
        min_size: usize,
    ) -> Result<ValidatedArtifact, IntegrityError> {
        if self.broken_urls.lock().unwrap().contains(url) {
            return Err(IntegrityError::Http(404));
        }
        let size = min_size.max(1);
        Ok(ValidatedArtifact {
            bytes: vec![0u8; size],
            content_type: Some("audio/mpeg".to_string()),
            size,
        })
    }
}

#[derive(Default)]
pub struct StubStore {
    pub stored: Mutex<Vec<String>>,
}

#[async_trait]
impl ArtifactStore for StubStore {
    async fn store(
        &self,
        key: &str,
        _bytes: Vec<u8>,
        _content_type: Option<&str>,
    ) -> Result<String, StorageError> {
        self.stored.lock().unwrap().push(key.to_string());
        Ok(format!("https://store.test/{}", key))
    }
}

/// All stubs plus the state wired around them
pub struct TestHarness {
    pub state: AppState,
    pub lyrics: Arc<StubLyrics>,
    pub music: Arc<StubMusic>,
    pub stems: Arc<StubStems>,
    pub fetcher: Arc<StubFetcher>,
    pub storage: Arc<StubStore>,
}

pub async fn test_harness() -> TestHarness {
    let pool: SqlitePool = init_memory_database().await.unwrap();
    let lyrics = Arc::new(StubLyrics::default());
    let music = Arc::new(StubMusic::default());
    let stems = Arc::new(StubStems::default());
    let fetcher = Arc::new(StubFetcher::default());
    let storage = Arc::new(StubStore::default());

    let state = AppState::new(
        pool,
        EventBus::new(64),
        lyrics.clone(),
        music.clone(),
        stems.clone(),
        fetcher.clone(),
        storage.clone(),
    );

    TestHarness { state, lyrics, music, stems, fetcher, storage }
}

pub async fn test_state() -> AppState {
    test_harness().await.state
}

/// Seed a paid order with a complete quiz; returns the order
pub async fn seed_paid_order(pool: &SqlitePool, plan: PlanTier) -> Order {
    let quiz = Quiz {
        id: Uuid::new_v4(),
        recipient: Some("Maria".to_string()),
        relationship: Some("wife".to_string()),
        occasion: Some("anniversary".to_string()),
        style: Some("acoustic".to_string()),
        message: Some("ten years together".to_string()),
        voice_type: Some("female".to_string()),
        language: Some("en".to_string()),
        answers: serde_json::json!({}),
    };
    db::orders::insert_quiz(pool, &quiz).await.unwrap();

    let order = Order { id: Uuid::new_v4(), plan, status: OrderStatus::Paid, quiz_id: quiz.id };
    db::orders::insert_order(pool, &order).await.unwrap();
    order
}

/// A provider status payload with `count` completed variants
pub fn completed_status(count: usize) -> TaskStatus {
    use crate::services::music_client::VariantPayload;
    TaskStatus {
        phase: TaskPhase::Complete,
        error: None,
        variants: (1..=count)
            .map(|i| VariantPayload {
                audio_url: format!("https://cdn.test/variant-{}.mp3", i),
                cover_url: Some(format!("https://cdn.test/cover-{}.jpg", i)),
                duration_secs: Some(180.0 + i as f64),
                clip_id: Some(format!("clip-{}", i)),
            })
            .collect(),
    }
}

/// A provider status payload reporting terminal failure
pub fn failed_status(message: &str) -> TaskStatus {
    TaskStatus { phase: TaskPhase::Failed, error: Some(message.to_string()), variants: Vec::new() }
}
