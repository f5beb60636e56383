//! Search strategy interface / 搜索策略接口
//!
//! A strategy only exposes primitive operations: name, can_handle, search.
//! Selection, deadlines and failure absorption belong to the coordinator.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::filter::ScopeFilter;
use super::schema::{SearchRequest, SearchResult};

/// Query-time failure / 查询期错误
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search query failed: {0}")]
    Query(#[from] sqlx::Error),

    #[error("search timed out after {0:?}")]
    TimedOut(Duration),

    #[error("search cancelled")]
    Cancelled,
}

/// Caller-supplied execution context / 调用方提供的执行上下文
#[derive(Debug, Clone, Default)]
pub struct SearchContext {
    /// Overall deadline for one search / 超时时间
    pub timeout: Option<Duration>,
    /// Cancelled when the caller no longer needs the result / 取消信号
    pub cancel: CancellationToken,
}

impl SearchContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Ranking algorithm that can opt in or out of a request / 搜索策略
#[async_trait]
pub trait SearchStrategy: Send + Sync {
    /// Strategy name, for logs and diagnostics only / 策略名称
    fn name(&self) -> &str;

    /// Cheap, side-effect-free guard / 是否可处理该请求
    fn can_handle(&self, request: &SearchRequest) -> bool;

    /// Run the ranked, paginated query; `scope` applies before counting / 执行搜索
    async fn search(
        &self,
        ctx: &SearchContext,
        request: &SearchRequest,
        scope: &ScopeFilter,
    ) -> Result<SearchResult, SearchError>;
}
