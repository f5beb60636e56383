use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod state;

use docvault_search::config;
use docvault_search::db;
use docvault_search::search::{IndexSettings, SearchIndexManager};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docvault_search=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("docvault-search built {}", env!("BUILD_TIME"));

    // Load configuration / 加载配置
    config::init_config().map_err(anyhow::Error::msg)?;
    let shared_config = config::get_config();
    let app_config = shared_config.read().clone();

    // Create data directory if not exists / 创建数据目录
    let data_dir = app_config.get_data_dir();
    if !data_dir.exists() {
        std::fs::create_dir_all(&data_dir)?;
        tracing::info!("Created data directory: {:?}", data_dir);
    }

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| app_config.get_database_url());

    let pool = db::connect(&app_config, &database_url).await?;
    db::run_migrations(&pool).await?;

    let index_manager = SearchIndexManager::new(pool.clone(), IndexSettings::from(&app_config.search));

    // 回滚搜索索引后退出
    if std::env::args().skip(1).any(|arg| arg == "--rollback") {
        let dropped = index_manager.rollback().await;
        for statement in &dropped {
            tracing::info!("{}", statement);
        }
        return Ok(());
    }

    // Critical schema failures abort startup / 关键步骤失败则退出
    let report = index_manager.setup().await?;
    if !report.skipped.is_empty() {
        tracing::warn!("Search running degraded: {:?}", report.skipped);
    }

    let state = Arc::new(AppState::new(pool, shared_config, index_manager, report));
    let app = api::router(state);

    let bind_addr = app_config.get_bind_address();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    tracing::info!("Server running at http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
