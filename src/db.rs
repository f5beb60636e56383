//! Database bootstrap / 数据库初始化
//!
//! The `documents` table is owned by the document-write collaborator; it is
//! created here so the search index has something to attach to.

use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite, SqlitePool};
use anyhow::Result;

use crate::config::AppConfig;

/// Open the main pool and apply connection pragmas / 打开主数据库连接池
pub async fn connect(config: &AppConfig, database_url: &str) -> Result<SqlitePool> {
    let db = SqlitePoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(database_url)
        .await?;

    // 启用WAL模式，提高并发性能
    sqlx::query("PRAGMA journal_mode=WAL")
        .execute(&db)
        .await?;

    // 设置busy_timeout，避免锁超时
    sqlx::query(&format!("PRAGMA busy_timeout={}", config.database.busy_timeout_ms))
        .execute(&db)
        .await?;

    sqlx::query("PRAGMA synchronous=NORMAL")
        .execute(&db)
        .await?;

    tracing::info!("Database connected: {} (WAL mode)", database_url);
    Ok(db)
}

/// Run database migrations / 运行数据库迁移
pub async fn run_migrations(pool: &Pool<Sqlite>) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_id TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT,
            tags TEXT,
            original_file_name TEXT NOT NULL,
            file_type TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT 'active',
            file_size INTEGER NOT NULL DEFAULT 0,
            view_count INTEGER NOT NULL DEFAULT 0,
            download_count INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
