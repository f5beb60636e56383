use parking_lot::RwLock;
use sqlx::SqlitePool;
use std::sync::Arc;

use docvault_search::config::AppConfig;
use docvault_search::search::{SchemaReport, SearchCoordinator, SearchIndexManager};

/// Shared application state / 应用共享状态
pub struct AppState {
    pub db: SqlitePool,
    pub config: Arc<RwLock<AppConfig>>,
    pub coordinator: SearchCoordinator,
    pub index_manager: SearchIndexManager,
    /// Result of the startup setup run / 启动时的索引初始化结果
    pub schema_report: SchemaReport,
}

impl AppState {
    /// Wire the coordinator from a finished setup run
    pub fn new(
        db: SqlitePool,
        config: Arc<RwLock<AppConfig>>,
        index_manager: SearchIndexManager,
        schema_report: SchemaReport,
    ) -> Self {
        let coordinator = SearchCoordinator::with_default_strategies(db.clone(), schema_report.trigram_ready);
        Self {
            db,
            config,
            coordinator,
            index_manager,
            schema_report,
        }
    }
}
