//! 数据库搜索索引 - schema/index manager
//!
//! Installs the searchable representation on top of `documents`:
//! - documents_search: FTS5 search vector, columns in tier order (title, description, tags, filename)
//! - sync triggers recomputing the vector on insert/update/delete
//! - documents_trigram: trigram index, Unicode case-folded substring lookups (optional)
//! - expression indexes on lower(field) and (owner_id, created_at)
//! - search_settings: text-search configuration + similarity threshold
//!
//! Setup is idempotent. Critical steps abort, the rest log and continue.

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use thiserror::Error;

use super::schema::FieldTier;

/// Search vector table / 搜索向量表
pub const SEARCH_VECTOR_TABLE: &str = "documents_search";
/// Trigram accelerator table / 三元组加速表
pub const TRIGRAM_TABLE: &str = "documents_trigram";
/// Settings table / 搜索设置表
pub const SETTINGS_TABLE: &str = "search_settings";

/// Built-in tokenizer used when the language tokenizer is unavailable
pub const DEFAULT_TEXT_CONFIG: &str = "unicode61";

const CASE_INDEXES: [(&str, &str); 4] = [
    ("idx_documents_title_lower", "lower(title)"),
    ("idx_documents_description_lower", "lower(description)"),
    ("idx_documents_tags_lower", "lower(tags)"),
    ("idx_documents_file_name_lower", "lower(original_file_name)"),
];
const OWNER_CREATED_INDEX: &str = "idx_documents_owner_created";

/// Setup failure that makes search unusable / 关键步骤失败
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("critical search schema step '{step}' failed: {source}")]
    Critical {
        step: &'static str,
        #[source]
        source: sqlx::Error,
    },
}

/// Where the similarity threshold ended up / 相似度阈值的生效范围
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdScope {
    /// Persisted in search_settings / 持久化
    Database,
    /// Held by this process only / 仅当前进程
    Session,
}

/// Verification sample / 校验结果
#[derive(Debug, Clone, Default, Serialize)]
pub struct VerifyReport {
    pub fts5_available: bool,
    pub trigram_available: bool,
    pub documents: u64,
    pub vectors: u64,
    /// vectors / documents, 1.0 for an empty table
    pub population_ratio: f64,
    pub smoke_test_ok: bool,
}

/// Outcome of `setup` / 初始化结果
#[derive(Debug, Clone, Serialize)]
pub struct SchemaReport {
    /// FTS5 tokenizer backing the search vector / 文本检索配置
    pub text_config: String,
    pub used_default_config: bool,
    /// Documents given a vector row by the backfill / 回填数量
    pub backfilled: u64,
    pub trigram_ready: bool,
    pub similarity_threshold: f64,
    pub threshold_scope: ThresholdScope,
    /// Non-critical steps that failed / 跳过的非关键步骤
    pub skipped: Vec<String>,
    pub verify: VerifyReport,
}

/// Index tuning inputs / 索引参数
#[derive(Debug, Clone)]
pub struct IndexSettings {
    pub language: String,
    pub similarity_threshold: f64,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            language: "english".to_string(),
            similarity_threshold: 0.3,
        }
    }
}

impl From<&crate::config::SearchConfig> for IndexSettings {
    fn from(config: &crate::config::SearchConfig) -> Self {
        Self {
            language: config.language.clone(),
            similarity_threshold: config.similarity_threshold,
        }
    }
}

/// FTS5 tokenizer for a configured language / 语言对应的分词器
pub fn tokenizer_for_language(language: &str) -> Option<&'static str> {
    match language.trim().to_ascii_lowercase().as_str() {
        "english" | "en" => Some("porter unicode61 remove_diacritics 2"),
        "simple" => Some("unicode61 remove_diacritics 2"),
        _ => None,
    }
}

/// `tokenize = '...'` option as written into the vector's CREATE statement
fn tokenize_clause(text_config: &str) -> String {
    format!("tokenize = '{}'", text_config)
}

/// Whether a stored CREATE statement was built with exactly `text_config`
fn uses_tokenizer(create_sql: &str, text_config: &str) -> bool {
    create_sql.contains(&tokenize_clause(text_config))
}

fn columns_list() -> String {
    FieldTier::ALL
        .iter()
        .map(|t| t.column())
        .collect::<Vec<_>>()
        .join(", ")
}

/// `new.title, COALESCE(new.description, ''), ...` for trigger bodies
fn row_values(prefix: &str) -> String {
    FieldTier::ALL
        .iter()
        .map(|t| match t {
            FieldTier::Title | FieldTier::FileName => format!("{}.{}", prefix, t.column()),
            _ => format!("COALESCE({}.{}, '')", prefix, t.column()),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Insert/delete/update triggers keeping `table` in step with `documents`
fn sync_trigger_statements(table: &str) -> Vec<String> {
    let cols = columns_list();
    let new_values = row_values("new");
    vec![
        format!(
            "CREATE TRIGGER IF NOT EXISTS {t}_ai AFTER INSERT ON documents BEGIN \
             INSERT INTO {t}(rowid, {cols}) VALUES (new.id, {vals}); END",
            t = table, cols = cols, vals = new_values
        ),
        format!(
            "CREATE TRIGGER IF NOT EXISTS {t}_ad AFTER DELETE ON documents BEGIN \
             DELETE FROM {t} WHERE rowid = old.id; END",
            t = table
        ),
        format!(
            "CREATE TRIGGER IF NOT EXISTS {t}_au AFTER UPDATE OF {cols} ON documents BEGIN \
             DELETE FROM {t} WHERE rowid = old.id; \
             INSERT INTO {t}(rowid, {cols}) VALUES (new.id, {vals}); END",
            t = table, cols = cols, vals = new_values
        ),
    ]
}

fn trigger_names(table: &str) -> [String; 3] {
    [
        format!("{}_au", table),
        format!("{}_ad", table),
        format!("{}_ai", table),
    ]
}

/// Schema/index manager / 搜索索引管理器
pub struct SearchIndexManager {
    db: SqlitePool,
    settings: IndexSettings,
    /// Fallback when the durable threshold cannot be written
    session_threshold: RwLock<Option<f64>>,
}

impl SearchIndexManager {
    pub fn new(db: SqlitePool, settings: IndexSettings) -> Self {
        Self {
            db,
            settings,
            session_threshold: RwLock::new(None),
        }
    }

    /// Run every setup step / 初始化搜索索引
    pub async fn setup(&self) -> Result<SchemaReport, SchemaError> {
        let mut skipped = Vec::new();

        let (text_config, used_default_config) = self.ensure_text_config(&mut skipped).await;

        if self.ensure_search_vector(&text_config).await? {
            skipped.push(format!("search_vector: built with a config other than '{}'", text_config));
        }
        self.install_sync_triggers().await?;

        let backfilled = match self.backfill_vectors().await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!("Search vector backfill failed: {}", e);
                skipped.push(format!("backfill: {}", e));
                0
            }
        };

        let trigram_ready = match self.ensure_trigram_index().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Trigram index unavailable, substring search unaccelerated: {}", e);
                skipped.push(format!("trigram_index: {}", e));
                false
            }
        };
        self.ensure_lookup_indexes().await?;

        let (similarity_threshold, threshold_scope) = self.tune_similarity_threshold(&mut skipped).await;

        let verify = self.verify().await;

        tracing::info!(
            "Search index ready: config={} backfilled={} trigram={} threshold={} ({:?}) skipped={}",
            text_config,
            backfilled,
            trigram_ready,
            similarity_threshold,
            threshold_scope,
            skipped.len()
        );

        Ok(SchemaReport {
            text_config,
            used_default_config,
            backfilled,
            trigram_ready,
            similarity_threshold,
            threshold_scope,
            skipped,
            verify,
        })
    }

    /// Step 1: pick the language tokenizer, falling back to the built-in one
    async fn ensure_text_config(&self, skipped: &mut Vec<String>) -> (String, bool) {
        if let Err(e) = self.ensure_settings_table().await {
            tracing::warn!("Search settings table unavailable: {}", e);
            skipped.push(format!("settings_table: {}", e));
        }

        let chosen = match tokenizer_for_language(&self.settings.language) {
            Some(tokenizer) => match self.probe_tokenizer(tokenizer).await {
                Ok(()) => Some(tokenizer),
                Err(e) => {
                    tracing::warn!("Text search config '{}' unsupported, using default: {}", tokenizer, e);
                    skipped.push(format!("text_config: {}", e));
                    None
                }
            },
            None => {
                tracing::warn!("No text search config for language '{}', using default", self.settings.language);
                skipped.push(format!("text_config: unknown language {}", self.settings.language));
                None
            }
        };

        let (config, used_default) = match chosen {
            Some(tokenizer) => (tokenizer.to_string(), false),
            None => (DEFAULT_TEXT_CONFIG.to_string(), true),
        };

        if let Err(e) = self.put_setting("text_search_config", &config).await {
            tracing::debug!("Could not persist text search config: {}", e);
        }
        (config, used_default)
    }

    async fn ensure_settings_table(&self) -> Result<(), sqlx::Error> {
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} (key TEXT PRIMARY KEY, value TEXT NOT NULL, updated_at TEXT NOT NULL)",
            SETTINGS_TABLE
        ))
        .execute(&self.db)
        .await?;
        Ok(())
    }

    /// Create and drop a throwaway temp table on one connection
    async fn probe_tokenizer(&self, tokenizer: &str) -> Result<(), sqlx::Error> {
        let mut conn = self.db.acquire().await?;
        sqlx::query("DROP TABLE IF EXISTS temp.search_config_probe")
            .execute(&mut *conn)
            .await?;
        sqlx::query(&format!(
            "CREATE VIRTUAL TABLE temp.search_config_probe USING fts5(probe, tokenize = '{}')",
            tokenizer
        ))
        .execute(&mut *conn)
        .await?;
        sqlx::query("DROP TABLE temp.search_config_probe")
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Step 2 (critical): the search vector itself
    ///
    /// Returns `true` when an existing vector uses another tokenizer.
    async fn ensure_search_vector(&self, text_config: &str) -> Result<bool, SchemaError> {
        let existing: Option<String> = sqlx::query_scalar(
            "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(SEARCH_VECTOR_TABLE)
        .fetch_optional(&self.db)
        .await
        .map_err(|source| SchemaError::Critical { step: "search_vector", source })?;

        if let Some(sql) = existing {
            let mismatch = !uses_tokenizer(&sql, text_config);
            if mismatch {
                tracing::warn!(
                    "{} was built with a different text search config than '{}'; rollback and rerun setup to rebuild it",
                    SEARCH_VECTOR_TABLE,
                    text_config
                );
            }
            return Ok(mismatch);
        }

        sqlx::query(&format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS {} USING fts5({}, {})",
            SEARCH_VECTOR_TABLE,
            columns_list(),
            tokenize_clause(text_config)
        ))
        .execute(&self.db)
        .await
        .map_err(|source| SchemaError::Critical { step: "search_vector", source })?;

        tracing::info!("Created search vector {} ({})", SEARCH_VECTOR_TABLE, text_config);
        Ok(false)
    }

    /// Step 3 (critical): write-time sync triggers
    async fn install_sync_triggers(&self) -> Result<(), SchemaError> {
        for statement in sync_trigger_statements(SEARCH_VECTOR_TABLE) {
            sqlx::query(&statement)
                .execute(&self.db)
                .await
                .map_err(|source| SchemaError::Critical { step: "sync_trigger", source })?;
        }
        Ok(())
    }

    /// Step 4: vectors for rows written before the triggers existed / 回填
    async fn backfill_vectors(&self) -> Result<u64, sqlx::Error> {
        let mut tx = self.db.begin().await?;

        let missing: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM documents WHERE id NOT IN (SELECT rowid FROM {})",
            SEARCH_VECTOR_TABLE
        ))
        .fetch_one(&mut *tx)
        .await?;

        if missing > 0 {
            sqlx::query(&format!(
                "INSERT INTO {t}(rowid, {cols}) SELECT d.id, {vals} FROM documents d \
                 WHERE d.id NOT IN (SELECT rowid FROM {t})",
                t = SEARCH_VECTOR_TABLE,
                cols = columns_list(),
                vals = row_values("d")
            ))
            .execute(&mut *tx)
            .await?;
        }

        let orphans = sqlx::query(&format!(
            "DELETE FROM {t} WHERE rowid NOT IN (SELECT id FROM documents)",
            t = SEARCH_VECTOR_TABLE
        ))
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        if missing > 0 || orphans > 0 {
            tracing::info!("Search vector backfill: {} added, {} orphans removed", missing, orphans);
        }
        Ok(missing as u64)
    }

    /// Step 5a: trigram accelerator, all-or-nothing
    async fn ensure_trigram_index(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.db.begin().await?;

        sqlx::query(&format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS {} USING fts5({}, tokenize = 'trigram')",
            TRIGRAM_TABLE,
            columns_list()
        ))
        .execute(&mut *tx)
        .await?;

        for statement in sync_trigger_statements(TRIGRAM_TABLE) {
            sqlx::query(&statement).execute(&mut *tx).await?;
        }

        sqlx::query(&format!(
            "INSERT INTO {t}(rowid, {cols}) SELECT d.id, {vals} FROM documents d \
             WHERE d.id NOT IN (SELECT rowid FROM {t})",
            t = TRIGRAM_TABLE,
            cols = columns_list(),
            vals = row_values("d")
        ))
        .execute(&mut *tx)
        .await?;

        tx.commit().await
    }

    /// Step 5b (critical): case-normalized and listing indexes
    async fn ensure_lookup_indexes(&self) -> Result<(), SchemaError> {
        for (name, expr) in CASE_INDEXES {
            sqlx::query(&format!("CREATE INDEX IF NOT EXISTS {} ON documents({})", name, expr))
                .execute(&self.db)
                .await
                .map_err(|source| SchemaError::Critical { step: "case_index", source })?;
        }

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS {} ON documents(owner_id, created_at DESC)",
            OWNER_CREATED_INDEX
        ))
        .execute(&self.db)
        .await
        .map_err(|source| SchemaError::Critical { step: "owner_created_index", source })?;

        Ok(())
    }

    /// Step 6: durable threshold, session fallback / 相似度阈值
    async fn tune_similarity_threshold(&self, skipped: &mut Vec<String>) -> (f64, ThresholdScope) {
        let threshold = self.settings.similarity_threshold.clamp(0.0, 1.0);

        match self.put_setting("similarity_threshold", &threshold.to_string()).await {
            Ok(()) => {
                *self.session_threshold.write() = None;
                (threshold, ThresholdScope::Database)
            }
            Err(e) => {
                tracing::warn!("Durable similarity threshold unavailable, using session value: {}", e);
                skipped.push(format!("similarity_threshold: {}", e));
                *self.session_threshold.write() = Some(threshold);
                (threshold, ThresholdScope::Session)
            }
        }
    }

    async fn put_setting(&self, key: &str, value: &str) -> Result<(), sqlx::Error> {
        sqlx::query(&format!(
            "INSERT INTO {} (key, value, updated_at) VALUES (?, ?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            SETTINGS_TABLE
        ))
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn get_setting(&self, key: &str) -> Option<String> {
        sqlx::query_scalar(&format!("SELECT value FROM {} WHERE key = ?", SETTINGS_TABLE))
            .bind(key)
            .fetch_optional(&self.db)
            .await
            .ok()
            .flatten()
    }

    /// Effective similarity threshold: session value first, then the stored one
    pub async fn similarity_threshold(&self) -> Option<(f64, ThresholdScope)> {
        if let Some(value) = *self.session_threshold.read() {
            return Some((value, ThresholdScope::Session));
        }
        self.get_setting("similarity_threshold")
            .await
            .and_then(|v| v.parse::<f64>().ok())
            .map(|v| (v, ThresholdScope::Database))
    }

    /// Text search configuration recorded by setup / 当前文本检索配置
    pub async fn text_config(&self) -> Option<String> {
        self.get_setting("text_search_config").await
    }

    async fn table_exists(&self, name: &str) -> bool {
        sqlx::query("SELECT 1 FROM sqlite_master WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.db)
            .await
            .ok()
            .flatten()
            .is_some()
    }

    async fn count(&self, sql: &str) -> Option<u64> {
        match sqlx::query(sql).fetch_one(&self.db).await {
            Ok(row) => row.try_get::<i64, _>(0).ok().map(|v| v.max(0) as u64),
            Err(e) => {
                tracing::warn!("Search verify query failed ({}): {}", sql, e);
                None
            }
        }
    }

    /// Step 7: sample the installed index, log only / 校验
    pub async fn verify(&self) -> VerifyReport {
        let fts5_available = self
            .count("SELECT sqlite_compileoption_used('ENABLE_FTS5')")
            .await
            .map(|v| v == 1)
            .unwrap_or(false)
            || self.table_exists(SEARCH_VECTOR_TABLE).await;

        let trigram_available = self.table_exists(TRIGRAM_TABLE).await;
        let documents = self.count("SELECT COUNT(*) FROM documents").await.unwrap_or(0);
        let vectors = self
            .count(&format!("SELECT COUNT(*) FROM {}", SEARCH_VECTOR_TABLE))
            .await
            .unwrap_or(0);
        let population_ratio = if documents == 0 {
            1.0
        } else {
            vectors as f64 / documents as f64
        };

        let smoke_test_ok = self
            .count(&format!(
                "SELECT COUNT(*) FROM {0} WHERE {0} MATCH '\"search\"*'",
                SEARCH_VECTOR_TABLE
            ))
            .await
            .is_some();

        if !fts5_available {
            tracing::warn!("FTS5 is not available; fuzzy search will fail");
        }
        if population_ratio < 1.0 {
            tracing::warn!("Search vector covers {}/{} documents", vectors, documents);
        }
        if !smoke_test_ok {
            tracing::warn!("Search vector smoke test failed");
        }
        tracing::info!(
            "Search verify: fts5={} trigram={} vectors={}/{} smoke_test={}",
            fts5_available,
            trigram_available,
            vectors,
            documents,
            smoke_test_ok
        );

        VerifyReport {
            fts5_available,
            trigram_available,
            documents,
            vectors,
            population_ratio,
            smoke_test_ok,
        }
    }

    /// Remove everything `setup` created, tolerating missing objects / 回滚
    ///
    /// Returns the statements that succeeded.
    pub async fn rollback(&self) -> Vec<String> {
        let mut statements = Vec::new();
        for table in [TRIGRAM_TABLE, SEARCH_VECTOR_TABLE] {
            for trigger in trigger_names(table) {
                statements.push(format!("DROP TRIGGER IF EXISTS {}", trigger));
            }
        }
        statements.push(format!("DROP TABLE IF EXISTS {}", TRIGRAM_TABLE));
        statements.push(format!("DROP TABLE IF EXISTS {}", SEARCH_VECTOR_TABLE));
        statements.push(format!("DROP INDEX IF EXISTS {}", OWNER_CREATED_INDEX));
        for (name, _) in CASE_INDEXES.iter().rev() {
            statements.push(format!("DROP INDEX IF EXISTS {}", name));
        }
        statements.push(format!("DROP TABLE IF EXISTS {}", SETTINGS_TABLE));

        let mut done = Vec::with_capacity(statements.len());
        for statement in statements {
            match sqlx::query(&statement).execute(&self.db).await {
                Ok(_) => done.push(statement),
                Err(e) => tracing::warn!("Search rollback step failed ({}): {}", statement, e),
            }
        }
        *self.session_threshold.write() = None;

        tracing::info!("Search index rolled back ({} steps)", done.len());
        done
    }
}
