//! Audio generation audit records
//!
//! Links an external (task_id, clip_id) pair to the Song it produced, so
//! stem separation and replay operations stay resolvable independent of
//! later Song mutation. Unique per (task_id, clip_id).

use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tunegift_common::db::AudioGeneration;
use tunegift_common::Result;
use uuid::Uuid;

use super::parse_uuid;

fn generation_from_row(row: &SqliteRow) -> Result<AudioGeneration> {
    let id_str: String = row.get("id");
    let song_id_str: String = row.get("song_id");
    let order_id_str: String = row.get("order_id");

    Ok(AudioGeneration {
        id: parse_uuid(&id_str, "audio_generations.id")?,
        task_id: row.get("task_id"),
        clip_id: row.get("clip_id"),
        song_id: parse_uuid(&song_id_str, "audio_generations.song_id")?,
        order_id: parse_uuid(&order_id_str, "audio_generations.order_id")?,
        status: row.get("status"),
    })
}

/// Insert or update the audit record for (task_id, clip_id)
pub async fn upsert_generation(
    pool: &SqlitePool,
    task_id: &str,
    clip_id: &str,
    song_id: Uuid,
    order_id: Uuid,
    status: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO audio_generations (id, task_id, clip_id, song_id, order_id, status, created_at)
        VALUES (?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(task_id, clip_id) DO UPDATE SET
            song_id = excluded.song_id,
            order_id = excluded.order_id,
            status = excluded.status
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(task_id)
    .bind(clip_id)
    .bind(song_id.to_string())
    .bind(order_id.to_string())
    .bind(status)
    .execute(pool)
    .await?;
    Ok(())
}

/// All audit records for a task, in clip order
pub async fn list_for_task(pool: &SqlitePool, task_id: &str) -> Result<Vec<AudioGeneration>> {
    let rows = sqlx::query(
        "SELECT id, task_id, clip_id, song_id, order_id, status \
         FROM audio_generations WHERE task_id = ? ORDER BY clip_id ASC",
    )
    .bind(task_id)
    .fetch_all(pool)
    .await?;
    rows.iter().map(generation_from_row).collect()
}
