//! Stem separation database operations
//!
//! Providers are inconsistent about which identifier they echo back, so
//! lookups exist for every identifier the callback may carry: separation id,
//! external task id, and audio (clip) id.

use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tunegift_common::db::{SeparationStatus, StemSeparation};
use tunegift_common::{Error, Result};
use uuid::Uuid;

use super::parse_uuid;

fn separation_from_row(row: &SqliteRow) -> Result<StemSeparation> {
    let id_str: String = row.get("id");
    let song_id_str: String = row.get("song_id");
    let status_str: String = row.get("status");

    Ok(StemSeparation {
        id: parse_uuid(&id_str, "stem_separations.id")?,
        song_id: parse_uuid(&song_id_str, "stem_separations.song_id")?,
        task_id: row.get("task_id"),
        audio_id: row.get("audio_id"),
        status: SeparationStatus::parse(&status_str).ok_or_else(|| {
            Error::Internal(format!("unknown separation status: {}", status_str))
        })?,
        error: row.get("error"),
    })
}

const SEPARATION_COLUMNS: &str = "id, song_id, task_id, audio_id, status, error";

/// Insert a new separation request record
pub async fn insert_separation(pool: &SqlitePool, separation: &StemSeparation) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO stem_separations (
            id, song_id, task_id, audio_id, status, error, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
        "#,
    )
    .bind(separation.id.to_string())
    .bind(separation.song_id.to_string())
    .bind(&separation.task_id)
    .bind(&separation.audio_id)
    .bind(separation.status.as_str())
    .bind(&separation.error)
    .execute(pool)
    .await?;
    Ok(())
}

/// Load a separation by id
pub async fn get_separation(pool: &SqlitePool, id: Uuid) -> Result<Option<StemSeparation>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM stem_separations WHERE id = ?",
        SEPARATION_COLUMNS
    ))
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(separation_from_row).transpose()
}

/// Find a separation by the provider's task id
pub async fn find_by_task_id(pool: &SqlitePool, task_id: &str) -> Result<Option<StemSeparation>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM stem_separations WHERE task_id = ? ORDER BY created_at DESC LIMIT 1",
        SEPARATION_COLUMNS
    ))
    .bind(task_id)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(separation_from_row).transpose()
}

/// Most recent separation for an audio (clip) id
pub async fn find_latest_by_audio_id(
    pool: &SqlitePool,
    audio_id: &str,
) -> Result<Option<StemSeparation>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM stem_separations WHERE audio_id = ? \
         ORDER BY created_at DESC, id DESC LIMIT 1",
        SEPARATION_COLUMNS
    ))
    .bind(audio_id)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(separation_from_row).transpose()
}

/// Most recent separation for a song
pub async fn find_latest_for_song(
    pool: &SqlitePool,
    song_id: Uuid,
) -> Result<Option<StemSeparation>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM stem_separations WHERE song_id = ? \
         ORDER BY created_at DESC, id DESC LIMIT 1",
        SEPARATION_COLUMNS
    ))
    .bind(song_id.to_string())
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(separation_from_row).transpose()
}

/// Store the provider task id once submitted
pub async fn set_task(pool: &SqlitePool, id: Uuid, task_id: &str) -> Result<()> {
    sqlx::query(
        "UPDATE stem_separations SET task_id = ?, status = 'processing', \
         updated_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(task_id)
    .bind(id.to_string())
    .execute(pool)
    .await?;
    Ok(())
}

/// Set terminal status; error is kept for `failed`, cleared otherwise
pub async fn set_status(
    pool: &SqlitePool,
    id: Uuid,
    status: SeparationStatus,
    error: Option<&str>,
) -> Result<()> {
    sqlx::query(
        "UPDATE stem_separations SET status = ?, error = ?, \
         updated_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(status.as_str())
    .bind(error)
    .bind(id.to_string())
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tunegift_common::db::init_memory_database;

    fn fixture(song_id: Uuid, audio_id: &str) -> StemSeparation {
        StemSeparation {
            id: Uuid::new_v4(),
            song_id,
            task_id: None,
            audio_id: Some(audio_id.to_string()),
            status: SeparationStatus::Pending,
            error: None,
        }
    }

    #[tokio::test]
    async fn test_lookup_chain() {
        let pool = init_memory_database().await.unwrap();
        let song_id = Uuid::new_v4();
        let separation = fixture(song_id, "clip-9");
        insert_separation(&pool, &separation).await.unwrap();
        set_task(&pool, separation.id, "sep-task-1").await.unwrap();

        let by_id = get_separation(&pool, separation.id).await.unwrap().unwrap();
        assert_eq!(by_id.status, SeparationStatus::Processing);

        let by_task = find_by_task_id(&pool, "sep-task-1").await.unwrap().unwrap();
        assert_eq!(by_task.id, separation.id);

        let by_audio = find_latest_by_audio_id(&pool, "clip-9").await.unwrap().unwrap();
        assert_eq!(by_audio.id, separation.id);

        let by_song = find_latest_for_song(&pool, song_id).await.unwrap().unwrap();
        assert_eq!(by_song.id, separation.id);
    }

    #[tokio::test]
    async fn test_failed_keeps_error() {
        let pool = init_memory_database().await.unwrap();
        let separation = fixture(Uuid::new_v4(), "clip-1");
        insert_separation(&pool, &separation).await.unwrap();

        set_status(&pool, separation.id, SeparationStatus::Failed, Some("missing vocals URL"))
            .await
            .unwrap();

        let loaded = get_separation(&pool, separation.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, SeparationStatus::Failed);
        assert_eq!(loaded.error.as_deref(), Some("missing vocals URL"));
    }
}
