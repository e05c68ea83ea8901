//! Order and quiz read access
//!
//! Orders and quizzes are owned by the checkout/payment collaborators; the
//! pipeline reads them for status checks and the creative brief. Insert
//! helpers exist for collaborator integration and test seeding.

use sqlx::{Row, SqlitePool};
use tunegift_common::db::{Order, OrderStatus, PlanTier, Quiz};
use tunegift_common::{Error, Result};
use uuid::Uuid;

use super::parse_uuid;

/// Load an order by id
pub async fn get_order(pool: &SqlitePool, id: Uuid) -> Result<Option<Order>> {
    let row = sqlx::query("SELECT id, plan, status, quiz_id FROM orders WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    match row {
        Some(row) => {
            let id_str: String = row.get("id");
            let quiz_id_str: String = row.get("quiz_id");
            let status_str: String = row.get("status");
            let plan_str: String = row.get("plan");

            Ok(Some(Order {
                id: parse_uuid(&id_str, "orders.id")?,
                plan: PlanTier::parse(&plan_str),
                status: OrderStatus::parse(&status_str).ok_or_else(|| {
                    Error::Internal(format!("unknown order status: {}", status_str))
                })?,
                quiz_id: parse_uuid(&quiz_id_str, "orders.quiz_id")?,
            }))
        }
        None => Ok(None),
    }
}

/// Load a quiz by id
pub async fn get_quiz(pool: &SqlitePool, id: Uuid) -> Result<Option<Quiz>> {
    let row = sqlx::query(
        r#"
        SELECT id, recipient, relationship, occasion, style, message,
               voice_type, language, answers
        FROM quizzes
        WHERE id = ?
        "#,
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => {
            let id_str: String = row.get("id");
            let answers_str: String = row.get("answers");

            Ok(Some(Quiz {
                id: parse_uuid(&id_str, "quizzes.id")?,
                recipient: row.get("recipient"),
                relationship: row.get("relationship"),
                occasion: row.get("occasion"),
                style: row.get("style"),
                message: row.get("message"),
                voice_type: row.get("voice_type"),
                language: row.get("language"),
                answers: serde_json::from_str(&answers_str)
                    .unwrap_or(serde_json::Value::Object(Default::default())),
            }))
        }
        None => Ok(None),
    }
}

/// Insert an order row (collaborator integration / test seeding)
pub async fn insert_order(pool: &SqlitePool, order: &Order) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO orders (id, plan, status, quiz_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
        "#,
    )
    .bind(order.id.to_string())
    .bind(order.plan.as_str())
    .bind(order.status.as_str())
    .bind(order.quiz_id.to_string())
    .execute(pool)
    .await?;
    Ok(())
}

/// Insert a quiz row (collaborator integration / test seeding)
pub async fn insert_quiz(pool: &SqlitePool, quiz: &Quiz) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO quizzes (
            id, recipient, relationship, occasion, style, message,
            voice_type, language, answers, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
        "#,
    )
    .bind(quiz.id.to_string())
    .bind(&quiz.recipient)
    .bind(&quiz.relationship)
    .bind(&quiz.occasion)
    .bind(&quiz.style)
    .bind(&quiz.message)
    .bind(&quiz.voice_type)
    .bind(&quiz.language)
    .bind(quiz.answers.to_string())
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tunegift_common::db::init_memory_database;

    #[tokio::test]
    async fn test_insert_and_load_order_with_quiz() {
        let pool = init_memory_database().await.unwrap();

        let quiz = Quiz {
            id: Uuid::new_v4(),
            recipient: Some("Maria".to_string()),
            relationship: Some("wife".to_string()),
            occasion: Some("anniversary".to_string()),
            style: Some("acoustic pop".to_string()),
            message: Some("Ten wonderful years together".to_string()),
            voice_type: Some("female".to_string()),
            language: Some("en".to_string()),
            answers: serde_json::json!({}),
        };
        insert_quiz(&pool, &quiz).await.unwrap();

        let order = Order {
            id: Uuid::new_v4(),
            plan: PlanTier::Express,
            status: OrderStatus::Paid,
            quiz_id: quiz.id,
        };
        insert_order(&pool, &order).await.unwrap();

        let loaded = get_order(&pool, order.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, OrderStatus::Paid);
        assert_eq!(loaded.plan, PlanTier::Express);

        let loaded_quiz = get_quiz(&pool, loaded.quiz_id).await.unwrap().unwrap();
        assert_eq!(loaded_quiz.recipient.as_deref(), Some("Maria"));
    }

    #[tokio::test]
    async fn test_get_order_missing() {
        let pool = init_memory_database().await.unwrap();
        assert!(get_order(&pool, Uuid::new_v4()).await.unwrap().is_none());
    }
}
