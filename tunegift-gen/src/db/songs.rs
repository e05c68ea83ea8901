//! Song database operations
//!
//! The (order_id, variant) unique key is the idempotency boundary for
//! reconciliation: duplicate callback delivery and overlapping poll sweeps
//! converge on the same rows through the conditional upsert.

use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tunegift_common::db::{Song, SongStatus};
use tunegift_common::{Error, Result};
use uuid::Uuid;

use super::parse_uuid;

fn song_from_row(row: &SqliteRow) -> Result<Song> {
    let id_str: String = row.get("id");
    let order_id_str: String = row.get("order_id");
    let status_str: String = row.get("status");

    Ok(Song {
        id: parse_uuid(&id_str, "songs.id")?,
        order_id: parse_uuid(&order_id_str, "songs.order_id")?,
        variant: row.get("variant"),
        audio_url: row.get("audio_url"),
        cover_url: row.get("cover_url"),
        duration_secs: row.get("duration_secs"),
        clip_id: row.get("clip_id"),
        status: SongStatus::parse(&status_str)
            .ok_or_else(|| Error::Internal(format!("unknown song status: {}", status_str)))?,
        release_at: row.get("release_at"),
        vocals_url: row.get("vocals_url"),
        instrumental_url: row.get("instrumental_url"),
        stems_separated_at: row.get("stems_separated_at"),
    })
}

const SONG_COLUMNS: &str = "id, order_id, variant, audio_url, cover_url, duration_secs, \
                            clip_id, status, release_at, vocals_url, instrumental_url, \
                            stems_separated_at";

/// Fields written by reconciliation for one variant
#[derive(Debug, Clone)]
pub struct SongUpsert {
    pub order_id: Uuid,
    pub variant: i64,
    pub audio_url: String,
    pub cover_url: Option<String>,
    pub duration_secs: Option<f64>,
    pub clip_id: String,
    pub release_at: Option<String>,
}

/// Insert or update the song for (order_id, variant); returns the stored row
pub async fn upsert_song(pool: &SqlitePool, song: &SongUpsert) -> Result<Song> {
    sqlx::query(
        r#"
        INSERT INTO songs (
            id, order_id, variant, audio_url, cover_url, duration_secs,
            clip_id, status, release_at, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, 'ready', ?, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
        ON CONFLICT(order_id, variant) DO UPDATE SET
            audio_url = excluded.audio_url,
            cover_url = excluded.cover_url,
            duration_secs = excluded.duration_secs,
            clip_id = excluded.clip_id,
            status = 'ready',
            release_at = COALESCE(songs.release_at, excluded.release_at),
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(song.order_id.to_string())
    .bind(song.variant)
    .bind(&song.audio_url)
    .bind(&song.cover_url)
    .bind(song.duration_secs)
    .bind(&song.clip_id)
    .bind(&song.release_at)
    .execute(pool)
    .await?;

    get_by_order_and_variant(pool, song.order_id, song.variant)
        .await?
        .ok_or_else(|| Error::Internal("song missing after upsert".to_string()))
}

/// Load one song by its natural key
pub async fn get_by_order_and_variant(
    pool: &SqlitePool,
    order_id: Uuid,
    variant: i64,
) -> Result<Option<Song>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM songs WHERE order_id = ? AND variant = ?",
        SONG_COLUMNS
    ))
    .bind(order_id.to_string())
    .bind(variant)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(song_from_row).transpose()
}

/// Load a song by id
pub async fn get_song(pool: &SqlitePool, id: Uuid) -> Result<Option<Song>> {
    let row = sqlx::query(&format!("SELECT {} FROM songs WHERE id = ?", SONG_COLUMNS))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(song_from_row).transpose()
}

/// All songs for an order, in variant order
pub async fn list_for_order(pool: &SqlitePool, order_id: Uuid) -> Result<Vec<Song>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM songs WHERE order_id = ? ORDER BY variant ASC",
        SONG_COLUMNS
    ))
    .bind(order_id.to_string())
    .fetch_all(pool)
    .await?;
    rows.iter().map(song_from_row).collect()
}

/// Self-healing: fill any song rows for the order still missing an audio URL.
/// Returns the number of rows repaired.
pub async fn backfill_missing_audio(
    pool: &SqlitePool,
    order_id: Uuid,
    audio_url: &str,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE songs SET audio_url = ?, updated_at = CURRENT_TIMESTAMP \
         WHERE order_id = ? AND (audio_url IS NULL OR audio_url = '')",
    )
    .bind(audio_url)
    .bind(order_id.to_string())
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Store stem URLs after a successful separation; primary status untouched
pub async fn set_stem_urls(
    pool: &SqlitePool,
    id: Uuid,
    vocals_url: &str,
    instrumental_url: &str,
    separated_at: &str,
) -> Result<()> {
    sqlx::query(
        "UPDATE songs SET vocals_url = ?, instrumental_url = ?, stems_separated_at = ?, \
         updated_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(vocals_url)
    .bind(instrumental_url)
    .bind(separated_at)
    .bind(id.to_string())
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tunegift_common::db::init_memory_database;

    fn upsert_fixture(order_id: Uuid, variant: i64, url: &str) -> SongUpsert {
        SongUpsert {
            order_id,
            variant,
            audio_url: url.to_string(),
            cover_url: Some("https://cdn.example.com/cover.jpg".to_string()),
            duration_secs: Some(182.5),
            clip_id: format!("clip-{}", variant),
            release_at: Some("2026-09-01T00:00:00Z".to_string()),
        }
    }

    #[tokio::test]
    async fn test_upsert_twice_keeps_one_row() {
        let pool = init_memory_database().await.unwrap();
        let order_id = Uuid::new_v4();

        let first =
            upsert_song(&pool, &upsert_fixture(order_id, 1, "https://cdn.example.com/a.mp3"))
                .await
                .unwrap();
        let second =
            upsert_song(&pool, &upsert_fixture(order_id, 1, "https://cdn.example.com/b.mp3"))
                .await
                .unwrap();

        assert_eq!(first.id, second.id, "same natural key must reuse the row");
        assert_eq!(second.audio_url.as_deref(), Some("https://cdn.example.com/b.mp3"));
        assert_eq!(list_for_order(&pool, order_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_preserves_existing_release_schedule() {
        let pool = init_memory_database().await.unwrap();
        let order_id = Uuid::new_v4();

        let mut fixture = upsert_fixture(order_id, 1, "https://cdn.example.com/a.mp3");
        upsert_song(&pool, &fixture).await.unwrap();

        fixture.release_at = Some("2026-12-31T00:00:00Z".to_string());
        let updated = upsert_song(&pool, &fixture).await.unwrap();

        // First reconciliation fixed the release time; replays must not move it
        assert_eq!(updated.release_at.as_deref(), Some("2026-09-01T00:00:00Z"));
    }

    #[tokio::test]
    async fn test_backfill_missing_audio() {
        let pool = init_memory_database().await.unwrap();
        let order_id = Uuid::new_v4();

        sqlx::query("INSERT INTO songs (id, order_id, variant) VALUES (?, ?, 1)")
            .bind(Uuid::new_v4().to_string())
            .bind(order_id.to_string())
            .execute(&pool)
            .await
            .unwrap();
        upsert_song(&pool, &upsert_fixture(order_id, 2, "https://cdn.example.com/b.mp3"))
            .await
            .unwrap();

        let repaired =
            backfill_missing_audio(&pool, order_id, "https://cdn.example.com/fallback.mp3")
                .await
                .unwrap();
        assert_eq!(repaired, 1);

        let songs = list_for_order(&pool, order_id).await.unwrap();
        assert!(songs.iter().all(|s| s.audio_url.is_some()));
    }

    #[tokio::test]
    async fn test_set_stem_urls_keeps_status() {
        let pool = init_memory_database().await.unwrap();
        let order_id = Uuid::new_v4();
        let song = upsert_song(&pool, &upsert_fixture(order_id, 1, "https://cdn.example.com/a.mp3"))
            .await
            .unwrap();

        set_stem_urls(
            &pool,
            song.id,
            "https://store.example.com/v.mp3",
            "https://store.example.com/i.mp3",
            "2026-08-29T12:00:00Z",
        )
        .await
        .unwrap();

        let loaded = get_song(&pool, song.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, SongStatus::Ready);
        assert_eq!(loaded.vocals_url.as_deref(), Some("https://store.example.com/v.mp3"));
        assert!(loaded.stems_separated_at.is_some());
    }
}
