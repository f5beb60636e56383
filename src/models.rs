use serde::{Deserialize, Serialize};

/// Searchable projection of a document row / 文档的可搜索投影
///
/// `score` is filled by the strategy that produced the row; listings leave it at 0.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SearchableDocument {
    pub id: i64,
    pub owner_id: String,
    pub title: String,
    pub description: Option<String>,
    pub tags: Option<String>,
    pub original_file_name: String,
    pub file_type: String,
    pub status: String,
    pub file_size: i64,
    pub view_count: i64,
    pub download_count: i64,
    pub created_at: String,
    pub updated_at: String,
    #[sqlx(default)]
    pub score: f64,
}

/// Column list shared by every query that materializes a `SearchableDocument`
pub const DOCUMENT_COLUMNS: &str = "d.id, d.owner_id, d.title, d.description, d.tags, \
    d.original_file_name, d.file_type, d.status, d.file_size, d.view_count, \
    d.download_count, d.created_at, d.updated_at";
