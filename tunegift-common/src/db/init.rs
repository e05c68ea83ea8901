//! Database initialization
//!
//! Opens (or creates) the SQLite database and creates the pipeline schema.
//! Schema creation is idempotent: every statement is CREATE TABLE IF NOT
//! EXISTS, safe to run on every startup.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    // WAL allows concurrent readers with one writer; webhook handlers and
    // the poll sweep may hit the same rows at the same time
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_schema(&pool).await?;

    Ok(pool)
}

/// In-memory database with the full schema, primarily for tests.
///
/// Capped at one connection: each SQLite in-memory connection is its own
/// database, so a larger pool would scatter tables across connections.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;
    create_schema(&pool).await?;
    Ok(pool)
}

/// Create all pipeline tables (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_orders_table(pool).await?;
    create_quizzes_table(pool).await?;
    create_jobs_table(pool).await?;
    create_lyrics_approvals_table(pool).await?;
    create_songs_table(pool).await?;
    create_audio_generations_table(pool).await?;
    create_stem_separations_table(pool).await?;
    create_credit_tables(pool).await?;

    info!("Database schema initialized");
    Ok(())
}

async fn create_orders_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS orders (
            id TEXT PRIMARY KEY,
            plan TEXT NOT NULL DEFAULT 'standard',
            status TEXT NOT NULL DEFAULT 'pending',
            quiz_id TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_quizzes_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS quizzes (
            id TEXT PRIMARY KEY,
            recipient TEXT,
            relationship TEXT,
            occasion TEXT,
            style TEXT,
            message TEXT,
            voice_type TEXT,
            language TEXT,
            answers TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_jobs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id TEXT PRIMARY KEY,
            order_id TEXT NOT NULL,
            quiz_id TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            title TEXT,
            lyrics TEXT,
            external_task_id TEXT,
            retry_count INTEGER NOT NULL DEFAULT 0,
            audio_url TEXT,
            error TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_order ON jobs(order_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_task ON jobs(external_task_id)")
        .execute(pool)
        .await?;
    Ok(())
}

async fn create_lyrics_approvals_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS lyrics_approvals (
            id TEXT PRIMARY KEY,
            order_id TEXT NOT NULL UNIQUE,
            job_id TEXT NOT NULL,
            lyrics TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT 'pending',
            expires_at TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_songs_table(pool: &SqlitePool) -> Result<()> {
    // (order_id, variant) is the idempotency anchor for reconciliation
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS songs (
            id TEXT PRIMARY KEY,
            order_id TEXT NOT NULL,
            variant INTEGER NOT NULL,
            audio_url TEXT,
            cover_url TEXT,
            duration_secs REAL,
            clip_id TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            release_at TEXT,
            vocals_url TEXT,
            instrumental_url TEXT,
            stems_separated_at TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(order_id, variant)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_audio_generations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS audio_generations (
            id TEXT PRIMARY KEY,
            task_id TEXT NOT NULL,
            clip_id TEXT NOT NULL,
            song_id TEXT NOT NULL,
            order_id TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'completed',
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(task_id, clip_id)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_stem_separations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS stem_separations (
            id TEXT PRIMARY KEY,
            song_id TEXT NOT NULL,
            task_id TEXT,
            audio_id TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            error TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_credit_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS credit_accounts (
            account TEXT PRIMARY KEY,
            credits INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS credit_ledger (
            id TEXT PRIMARY KEY,
            account TEXT NOT NULL,
            delta INTEGER NOT NULL,
            reason TEXT NOT NULL,
            order_id TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}
