//! Generation credit ledger
//!
//! The deduction is one transaction: a conditional balance decrement plus a
//! ledger entry. Credit accounting is a business concern separate from
//! generation correctness; callers log a failed deduction and continue in a
//! degraded "uncharged" mode rather than blocking customer delivery.

use sqlx::SqlitePool;
use tunegift_common::{Error, Result};
use uuid::Uuid;

/// Atomically deduct `amount` credits from `account` and record the entry
pub async fn deduct(pool: &SqlitePool, account: &str, amount: i64, order_id: Uuid) -> Result<()> {
    let mut tx = pool.begin().await?;

    let updated = sqlx::query(
        "UPDATE credit_accounts SET credits = credits - ? WHERE account = ? AND credits >= ?",
    )
    .bind(amount)
    .bind(account)
    .bind(amount)
    .execute(&mut *tx)
    .await?;

    if updated.rows_affected() == 0 {
        tx.rollback().await?;
        return Err(Error::InvalidInput(format!(
            "credit deduction failed: account '{}' missing or below {} credits",
            account, amount
        )));
    }

    sqlx::query(
        r#"
        INSERT INTO credit_ledger (id, account, delta, reason, order_id, created_at)
        VALUES (?, ?, ?, 'generation', ?, CURRENT_TIMESTAMP)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(account)
    .bind(-amount)
    .bind(order_id.to_string())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

/// Add credits to an account, creating it if needed
pub async fn grant(pool: &SqlitePool, account: &str, amount: i64) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO credit_accounts (account, credits) VALUES (?, ?)
        ON CONFLICT(account) DO UPDATE SET credits = credits + excluded.credits
        "#,
    )
    .bind(account)
    .bind(amount)
    .execute(pool)
    .await?;
    Ok(())
}

/// Current balance for an account
pub async fn balance(pool: &SqlitePool, account: &str) -> Result<Option<i64>> {
    let balance =
        sqlx::query_scalar("SELECT credits FROM credit_accounts WHERE account = ?")
            .bind(account)
            .fetch_optional(pool)
            .await?;
    Ok(balance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tunegift_common::db::init_memory_database;

    #[tokio::test]
    async fn test_deduct_writes_ledger() {
        let pool = init_memory_database().await.unwrap();
        grant(&pool, "generation", 5).await.unwrap();

        deduct(&pool, "generation", 1, Uuid::new_v4()).await.unwrap();
        assert_eq!(balance(&pool, "generation").await.unwrap(), Some(4));

        let entries: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM credit_ledger WHERE account = 'generation' AND delta = -1",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(entries, 1);
    }

    #[tokio::test]
    async fn test_deduct_insufficient_credits() {
        let pool = init_memory_database().await.unwrap();
        grant(&pool, "generation", 0).await.unwrap();

        let result = deduct(&pool, "generation", 1, Uuid::new_v4()).await;
        assert!(result.is_err());

        // Nothing partially committed
        assert_eq!(balance(&pool, "generation").await.unwrap(), Some(0));
        let entries: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM credit_ledger").fetch_one(&pool).await.unwrap();
        assert_eq!(entries, 0);
    }

    #[tokio::test]
    async fn test_deduct_unknown_account() {
        let pool = init_memory_database().await.unwrap();
        assert!(deduct(&pool, "nope", 1, Uuid::new_v4()).await.is_err());
    }
}
