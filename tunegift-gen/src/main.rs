//! tunegift-gen - Song Generation Pipeline Microservice
//!
//! Drives a paid order through lyrics generation, audio generation and
//! optional stem separation, reconciling provider results from both the
//! webhook callbacks and the polling sweep.

use anyhow::Result;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use tunegift_common::config::Config;
use tunegift_common::db::init_database;
use tunegift_common::events::EventBus;

use tunegift_gen::pipeline::poll;
use tunegift_gen::services::audio_validator::HttpArtifactFetcher;
use tunegift_gen::services::lyrics_client::LyricsClient;
use tunegift_gen::services::music_client::MusicClient;
use tunegift_gen::services::notifier;
use tunegift_gen::services::stem_client::StemClient;
use tunegift_gen::services::storage::StorageClient;
use tunegift_gen::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting tunegift-gen (Song Generation Pipeline) microservice");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;
    let bind_address = config.bind_address();

    let db_path = config.database_path();
    info!("Database: {}", db_path.display());
    let db_pool = init_database(&db_path).await?;
    info!("Database connection established");

    let event_bus = EventBus::new(100);

    let lyrics = LyricsClient::new(
        config.lyrics.base_url.clone(),
        config.lyrics.api_key.clone(),
        config.lyrics.model.clone(),
    )?;
    let music = MusicClient::new(
        config.music.base_url.clone(),
        config.music.api_key.clone(),
        config.music.model.clone(),
        config.callback_url("/webhooks/music"),
    )?;
    let stems = StemClient::new(
        config.stems.base_url.clone(),
        config.stems.api_key.clone(),
        config.callback_url("/webhooks/stems"),
    )?;
    let fetcher = HttpArtifactFetcher::new()?;
    let storage = StorageClient::new(
        config.storage.base_url.clone(),
        config.storage.api_key.clone(),
    )?;

    let state = AppState::new(
        db_pool,
        event_bus.clone(),
        Arc::new(lyrics),
        Arc::new(music),
        Arc::new(stems),
        Arc::new(fetcher),
        Arc::new(storage),
    );

    notifier::spawn_notifier(event_bus, config.notify_url.clone());
    poll::spawn_poll_scheduler(state.clone(), config.poll_interval().as_secs());

    let app = tunegift_gen::build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!("Listening on http://{}", bind_address);
    info!("Health check: http://{}/health", bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}
