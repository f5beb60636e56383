//! Shared fixtures for in-crate tests / 测试辅助

use chrono::Utc;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

use crate::db;
use crate::search::{IndexSettings, SchemaReport, SearchIndexManager};

/// Pool with no tables at all. One connection, since every connection to
/// `sqlite::memory:` opens its own database.
pub async fn bare_pool() -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap()
}

/// Pool with the `documents` table but no search index
pub async fn memory_pool() -> SqlitePool {
    let pool = bare_pool().await;
    db::run_migrations(&pool).await.unwrap();
    pool
}

/// Pool with the full search index installed
pub async fn memory_pool_with_index() -> (SqlitePool, SchemaReport) {
    let pool = memory_pool().await;
    let report = SearchIndexManager::new(pool.clone(), IndexSettings::default())
        .setup()
        .await
        .unwrap();
    (pool, report)
}

/// Document row builder
#[derive(Debug, Clone)]
pub struct DocSeed {
    owner_id: String,
    title: String,
    description: Option<String>,
    tags: Option<String>,
    file_name: String,
    file_type: String,
    status: String,
    file_size: i64,
    view_count: i64,
    created_at: String,
}

impl DocSeed {
    pub fn new(owner_id: &str, title: &str) -> Self {
        Self {
            owner_id: owner_id.to_string(),
            title: title.to_string(),
            description: None,
            tags: None,
            file_name: "file.pdf".to_string(),
            file_type: "pdf".to_string(),
            status: "active".to_string(),
            file_size: 0,
            view_count: 0,
            created_at: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    pub fn description(mut self, value: &str) -> Self {
        self.description = Some(value.to_string());
        self
    }

    pub fn tags(mut self, value: &str) -> Self {
        self.tags = Some(value.to_string());
        self
    }

    pub fn file_name(mut self, value: &str) -> Self {
        self.file_name = value.to_string();
        self
    }

    pub fn file_type(mut self, value: &str) -> Self {
        self.file_type = value.to_string();
        self
    }

    pub fn status(mut self, value: &str) -> Self {
        self.status = value.to_string();
        self
    }

    pub fn file_size(mut self, value: i64) -> Self {
        self.file_size = value;
        self
    }

    pub fn views(mut self, value: i64) -> Self {
        self.view_count = value;
        self
    }

    pub fn created(mut self, value: &str) -> Self {
        self.created_at = value.to_string();
        self
    }
}

/// Insert a document and return its id
pub async fn seed(pool: &SqlitePool, doc: DocSeed) -> i64 {
    sqlx::query(
        "INSERT INTO documents (owner_id, title, description, tags, original_file_name, \
         file_type, status, file_size, view_count, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&doc.owner_id)
    .bind(&doc.title)
    .bind(&doc.description)
    .bind(&doc.tags)
    .bind(&doc.file_name)
    .bind(&doc.file_type)
    .bind(&doc.status)
    .bind(doc.file_size)
    .bind(doc.view_count)
    .bind(&doc.created_at)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await
    .unwrap()
    .last_insert_rowid()
}
