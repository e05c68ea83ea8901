//! Stem separation sub-pipeline
//!
//! Optional per-song vocal/instrumental split. Success is all-or-nothing:
//! both stems validate and upload, or the separation fails with a
//! descriptive error and the song row stays untouched.

use chrono::Utc;
use serde_json::Value;
use tunegift_common::db::{SeparationStatus, SongStatus, StemSeparation};
use tunegift_common::events::PipelineEvent;
use tunegift_common::{Error, Result};
use url::Url;
use uuid::Uuid;

use crate::db;
use crate::services::music_client;
use crate::services::storage;
use crate::AppState;

/// Smallest plausible stem track
pub const MIN_STEM_BYTES: usize = 1024;

const VOCALS_KEYS: &[&str] = &["vocal_url", "vocals_url", "vocal_removal_url", "vocal", "vocals"];
const INSTRUMENTAL_KEYS: &[&str] =
    &["instrumental_url", "backing_url", "accompaniment_url", "instrumental"];
const INFO_KEYS: &[&str] = &["vocal_removal_info", "response", "result"];

/// Submit a separation request for a ready song
pub async fn request_separation(state: &AppState, song_id: Uuid) -> Result<StemSeparation> {
    let song = db::songs::get_song(&state.db, song_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("song {}", song_id)))?;
    if song.status != SongStatus::Ready {
        return Err(Error::InvalidInput(format!("song {} is not ready", song_id)));
    }
    let audio_url = song
        .audio_url
        .as_deref()
        .ok_or_else(|| Error::InvalidInput(format!("song {} has no audio URL", song_id)))?;

    let separation = StemSeparation {
        id: Uuid::new_v4(),
        song_id,
        task_id: None,
        audio_id: song.clip_id.clone(),
        status: SeparationStatus::Pending,
        error: None,
    };
    db::stems::insert_separation(&state.db, &separation).await?;

    match state.stems.submit(audio_url, song.clip_id.as_deref(), song_id, separation.id).await {
        Ok(task_id) => {
            db::stems::set_task(&state.db, separation.id, &task_id).await?;
            tracing::info!(%song_id, separation_id = %separation.id, task_id = %task_id, "Stem separation submitted");
        }
        Err(e) => {
            let message = e.to_string();
            db::stems::set_status(&state.db, separation.id, SeparationStatus::Failed, Some(&message))
                .await?;
            tracing::error!(%song_id, separation_id = %separation.id, error = %message, "Stem separation submit failed");
            return Err(Error::Provider(message));
        }
    }

    db::stems::get_separation(&state.db, separation.id)
        .await?
        .ok_or_else(|| Error::Internal("separation missing after insert".to_string()))
}

fn first_url<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| value.get(*k).and_then(|v| v.as_str()).filter(|s| !s.is_empty()))
}

/// Pull vocal and instrumental URLs out of whichever nesting the provider
/// used for this payload version
pub fn extract_stem_urls(payload: &Value) -> (Option<String>, Option<String>) {
    let mut candidates = vec![payload];
    if let Some(data) = payload.get("data").filter(|d| d.is_object()) {
        candidates.push(data);
    }
    for base in candidates.clone() {
        for key in INFO_KEYS {
            if let Some(info) = base.get(*key).filter(|v| v.is_object()) {
                candidates.push(info);
            }
        }
    }

    let vocals = candidates.iter().find_map(|c| first_url(c, VOCALS_KEYS));
    let instrumental = candidates.iter().find_map(|c| first_url(c, INSTRUMENTAL_KEYS));
    (vocals.map(|s| s.to_string()), instrumental.map(|s| s.to_string()))
}

/// Resolve which separation a callback belongs to.
///
/// Order: explicit separation id from the callback query, then the
/// provider's task id, then the most recent separation for the audio id,
/// then the most recent separation for the song id from the query.
pub async fn resolve_separation(
    state: &AppState,
    separation_id: Option<Uuid>,
    song_id: Option<Uuid>,
    payload: &Value,
) -> Result<Option<StemSeparation>> {
    if let Some(id) = separation_id {
        if let Some(separation) = db::stems::get_separation(&state.db, id).await? {
            return Ok(Some(separation));
        }
    }

    let record = payload.get("data").filter(|d| d.is_object()).unwrap_or(payload);
    if let Some(task_id) = music_client::extract_task_id(record) {
        if let Some(separation) = db::stems::find_by_task_id(&state.db, &task_id).await? {
            return Ok(Some(separation));
        }
    }

    if let Some(audio_id) = first_url(record, &["audio_id", "audioId", "clip_id"]) {
        if let Some(separation) = db::stems::find_latest_by_audio_id(&state.db, audio_id).await? {
            return Ok(Some(separation));
        }
    }

    if let Some(song_id) = song_id {
        if let Some(separation) = db::stems::find_latest_for_song(&state.db, song_id).await? {
            return Ok(Some(separation));
        }
    }

    Ok(None)
}

/// Process a stem-separation callback. Callers always ack 200; errors here
/// are recorded on the separation row, never surfaced to the provider.
pub async fn handle_callback(
    state: &AppState,
    separation_id: Option<Uuid>,
    song_id: Option<Uuid>,
    payload: &Value,
) -> Result<()> {
    let Some(separation) = resolve_separation(state, separation_id, song_id, payload).await? else {
        tracing::warn!("Stem callback matched no separation, ignoring");
        return Ok(());
    };

    let record = payload.get("data").filter(|d| d.is_object()).unwrap_or(payload);
    if music_client::payload_phase(record) == music_client::TaskPhase::Failed {
        let message = music_client::payload_error(record)
            .unwrap_or_else(|| "provider reported separation failure".to_string());
        tracing::error!(separation_id = %separation.id, error = %message, "Stem separation failed");
        db::stems::set_status(&state.db, separation.id, SeparationStatus::Failed, Some(&message))
            .await?;
        return Ok(());
    }

    let (vocals, instrumental) = extract_stem_urls(payload);
    let (Some(vocals_url), Some(instrumental_url)) = (vocals, instrumental) else {
        let message = "callback missing vocal or instrumental URL";
        tracing::error!(separation_id = %separation.id, "{}", message);
        db::stems::set_status(&state.db, separation.id, SeparationStatus::Failed, Some(message))
            .await?;
        return Ok(());
    };
    if Url::parse(&vocals_url).is_err() || Url::parse(&instrumental_url).is_err() {
        let message = "callback stem URLs are not valid URLs";
        tracing::error!(separation_id = %separation.id, "{}", message);
        db::stems::set_status(&state.db, separation.id, SeparationStatus::Failed, Some(message))
            .await?;
        return Ok(());
    }

    match finalize(state, &separation, &vocals_url, &instrumental_url).await {
        Ok(()) => {
            db::stems::set_status(&state.db, separation.id, SeparationStatus::Completed, None)
                .await?;
            tracing::info!(separation_id = %separation.id, song_id = %separation.song_id, "Stem separation completed");
            state.event_bus.emit(PipelineEvent::StemsSeparated {
                song_id: separation.song_id,
                timestamp: Utc::now(),
            });
        }
        Err(e) => {
            let message = e.to_string();
            tracing::error!(separation_id = %separation.id, error = %message, "Stem finalization failed");
            db::stems::set_status(&state.db, separation.id, SeparationStatus::Failed, Some(&message))
                .await?;
        }
    }
    Ok(())
}

/// Validate both stems, re-host them, and stamp the song row
async fn finalize(
    state: &AppState,
    separation: &StemSeparation,
    vocals_url: &str,
    instrumental_url: &str,
) -> Result<()> {
    let vocals = state
        .fetcher
        .fetch_and_validate(vocals_url, MIN_STEM_BYTES)
        .await
        .map_err(|e| Error::Provider(format!("vocals artifact: {}", e)))?;
    let instrumental = state
        .fetcher
        .fetch_and_validate(instrumental_url, MIN_STEM_BYTES)
        .await
        .map_err(|e| Error::Provider(format!("instrumental artifact: {}", e)))?;

    let stored_vocals = state
        .storage
        .store(
            &storage::stem_key(separation.song_id, "vocals"),
            vocals.bytes,
            vocals.content_type.as_deref(),
        )
        .await
        .map_err(|e| Error::Provider(format!("vocals upload: {}", e)))?;
    let stored_instrumental = state
        .storage
        .store(
            &storage::stem_key(separation.song_id, "instrumental"),
            instrumental.bytes,
            instrumental.content_type.as_deref(),
        )
        .await
        .map_err(|e| Error::Provider(format!("instrumental upload: {}", e)))?;

    db::songs::set_stem_urls(
        &state.db,
        separation.song_id,
        &stored_vocals,
        &stored_instrumental,
        &Utc::now().to_rfc3339(),
    )
    .await
}
