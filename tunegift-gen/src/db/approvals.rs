//! Lyrics approval database operations
//!
//! One approval per order. The upsert checks for an existing row before
//! inserting (pending first, any-status second) and treats an insert race as
//! recoverable: on a uniqueness violation the now-existing row is re-read and
//! updated instead of propagating the conflict.

use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tunegift_common::db::{ApprovalStatus, LyricsApproval};
use tunegift_common::{Error, Result};
use uuid::Uuid;

use super::parse_uuid;

fn approval_from_row(row: &SqliteRow) -> Result<LyricsApproval> {
    let id_str: String = row.get("id");
    let order_id_str: String = row.get("order_id");
    let job_id_str: String = row.get("job_id");
    let status_str: String = row.get("status");

    Ok(LyricsApproval {
        id: parse_uuid(&id_str, "lyrics_approvals.id")?,
        order_id: parse_uuid(&order_id_str, "lyrics_approvals.order_id")?,
        job_id: parse_uuid(&job_id_str, "lyrics_approvals.job_id")?,
        lyrics: row.get("lyrics"),
        status: ApprovalStatus::parse(&status_str)
            .ok_or_else(|| Error::Internal(format!("unknown approval status: {}", status_str)))?,
        expires_at: row.get("expires_at"),
    })
}

const APPROVAL_COLUMNS: &str = "id, order_id, job_id, lyrics, status, expires_at";

/// Load the approval for an order
pub async fn get_by_order(pool: &SqlitePool, order_id: Uuid) -> Result<Option<LyricsApproval>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM lyrics_approvals WHERE order_id = ?",
        APPROVAL_COLUMNS
    ))
    .bind(order_id.to_string())
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(approval_from_row).transpose()
}

async fn get_by_order_and_status(
    pool: &SqlitePool,
    order_id: Uuid,
    status: ApprovalStatus,
) -> Result<Option<LyricsApproval>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM lyrics_approvals WHERE order_id = ? AND status = ?",
        APPROVAL_COLUMNS
    ))
    .bind(order_id.to_string())
    .bind(status.as_str())
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(approval_from_row).transpose()
}

async fn update_row(
    pool: &SqlitePool,
    id: Uuid,
    job_id: Uuid,
    lyrics: &str,
    status: ApprovalStatus,
    expires_at: &str,
) -> Result<()> {
    sqlx::query(
        "UPDATE lyrics_approvals SET job_id = ?, lyrics = ?, status = ?, expires_at = ?, \
         updated_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(job_id.to_string())
    .bind(lyrics)
    .bind(status.as_str())
    .bind(expires_at)
    .bind(id.to_string())
    .execute(pool)
    .await?;
    Ok(())
}

/// Create or update the approval for an order.
///
/// Returns the persisted row. Never duplicate-inserts, regardless of how
/// many concurrent creators race on the same order.
pub async fn upsert_for_order(
    pool: &SqlitePool,
    order_id: Uuid,
    job_id: Uuid,
    lyrics: &str,
    status: ApprovalStatus,
    expires_at: &str,
) -> Result<LyricsApproval> {
    // Prefer updating a pending row, then any existing row
    let existing = match get_by_order_and_status(pool, order_id, ApprovalStatus::Pending).await? {
        Some(row) => Some(row),
        None => get_by_order(pool, order_id).await?,
    };

    if let Some(row) = existing {
        update_row(pool, row.id, job_id, lyrics, status, expires_at).await?;
        return get_by_order(pool, order_id)
            .await?
            .ok_or_else(|| Error::Internal("approval vanished during update".to_string()));
    }

    let id = Uuid::new_v4();
    let insert = sqlx::query(
        r#"
        INSERT INTO lyrics_approvals (
            id, order_id, job_id, lyrics, status, expires_at, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
        "#,
    )
    .bind(id.to_string())
    .bind(order_id.to_string())
    .bind(job_id.to_string())
    .bind(lyrics)
    .bind(status.as_str())
    .bind(expires_at)
    .execute(pool)
    .await;

    match insert {
        Ok(_) => {}
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            // A concurrent creator won the insert race; update its row
            tracing::warn!(
                order_id = %order_id,
                "Approval insert raced with a concurrent creator, updating existing row"
            );
            let row = get_by_order(pool, order_id).await?.ok_or_else(|| {
                Error::Internal("approval unique violation without existing row".to_string())
            })?;
            update_row(pool, row.id, job_id, lyrics, status, expires_at).await?;
        }
        Err(e) => return Err(e.into()),
    }

    get_by_order(pool, order_id)
        .await?
        .ok_or_else(|| Error::Internal("approval missing after upsert".to_string()))
}

/// Set approval status (manual operator approval/rejection)
pub async fn set_status(pool: &SqlitePool, id: Uuid, status: ApprovalStatus) -> Result<()> {
    sqlx::query(
        "UPDATE lyrics_approvals SET status = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(status.as_str())
    .bind(id.to_string())
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tunegift_common::db::init_memory_database;

    #[tokio::test]
    async fn test_upsert_is_single_row_per_order() {
        let pool = init_memory_database().await.unwrap();
        let order_id = Uuid::new_v4();
        let job_id = Uuid::new_v4();

        let first = upsert_for_order(
            &pool,
            order_id,
            job_id,
            "first draft",
            ApprovalStatus::Pending,
            "2026-01-01T00:00:00Z",
        )
        .await
        .unwrap();

        let second = upsert_for_order(
            &pool,
            order_id,
            job_id,
            "second draft",
            ApprovalStatus::Pending,
            "2026-01-02T00:00:00Z",
        )
        .await
        .unwrap();

        assert_eq!(first.id, second.id, "regeneration must update, not duplicate");
        assert_eq!(second.lyrics, "second draft");

        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM lyrics_approvals WHERE order_id = ?")
                .bind(order_id.to_string())
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_approve() {
        let pool = init_memory_database().await.unwrap();
        let order_id = Uuid::new_v4();

        let approval = upsert_for_order(
            &pool,
            order_id,
            Uuid::new_v4(),
            "lyrics",
            ApprovalStatus::Pending,
            "2026-01-01T00:00:00Z",
        )
        .await
        .unwrap();

        set_status(&pool, approval.id, ApprovalStatus::Approved).await.unwrap();
        let loaded = get_by_order(&pool, order_id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ApprovalStatus::Approved);
    }
}
