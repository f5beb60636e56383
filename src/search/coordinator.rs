//! Strategy coordinator / 搜索策略调度
//!
//! Holds strategies in priority order and delegates to the first one that can
//! handle a request. `search` is best-effort: every failure becomes an empty
//! page and is only visible through `diagnostics`. `try_search` returns it.

use parking_lot::Mutex;
use serde::Serialize;
use sqlx::SqlitePool;
use std::borrow::Cow;
use std::sync::atomic::{AtomicU64, Ordering};

use super::filter::ScopeFilter;
use super::fuzzy::FuzzyPrefixStrategy;
use super::pattern::WeightedPatternStrategy;
use super::schema::{SearchRequest, SearchResult};
use super::strategy::{SearchContext, SearchError, SearchStrategy};
use super::tokenizer::tokenize_query;

/// Snapshot of out-of-band search health / 搜索诊断快照
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchDiagnostics {
    pub searches: u64,
    /// Requests no strategy accepted / 无策略可处理的请求
    pub unhandled: u64,
    pub failures: u64,
    pub timeouts: u64,
    pub cancellations: u64,
    pub last_error: Option<String>,
    pub last_strategy: Option<String>,
}

#[derive(Default)]
struct DiagnosticsRecorder {
    searches: AtomicU64,
    unhandled: AtomicU64,
    failures: AtomicU64,
    timeouts: AtomicU64,
    cancellations: AtomicU64,
    last_error: Mutex<Option<String>>,
    last_strategy: Mutex<Option<String>>,
}

impl DiagnosticsRecorder {
    fn record_error(&self, error: &SearchError) {
        let counter = match error {
            SearchError::Query(_) => &self.failures,
            SearchError::TimedOut(_) => &self.timeouts,
            SearchError::Cancelled => &self.cancellations,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        *self.last_error.lock() = Some(error.to_string());
    }

    fn snapshot(&self) -> SearchDiagnostics {
        SearchDiagnostics {
            searches: self.searches.load(Ordering::Relaxed),
            unhandled: self.unhandled.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            cancellations: self.cancellations.load(Ordering::Relaxed),
            last_error: self.last_error.lock().clone(),
            last_strategy: self.last_strategy.lock().clone(),
        }
    }
}

/// Search coordinator / 搜索调度器
pub struct SearchCoordinator {
    strategies: Vec<Box<dyn SearchStrategy>>,
    diagnostics: DiagnosticsRecorder,
}

impl SearchCoordinator {
    /// Strategies are tried in the given order / 按顺序尝试策略
    pub fn new(strategies: Vec<Box<dyn SearchStrategy>>) -> Self {
        Self {
            strategies,
            diagnostics: DiagnosticsRecorder::default(),
        }
    }

    /// Fuzzy-prefix first, weighted-pattern as fallback / 默认策略组合
    pub fn with_default_strategies(db: SqlitePool, trigram_ready: bool) -> Self {
        Self::new(vec![
            Box::new(FuzzyPrefixStrategy::new(db.clone())),
            Box::new(WeightedPatternStrategy::new(db).with_trigram(trigram_ready)),
        ])
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// First strategy that accepts the request / 选择策略
    pub fn select(&self, request: &SearchRequest) -> Option<&dyn SearchStrategy> {
        self.strategies
            .iter()
            .find(|s| s.can_handle(request))
            .map(Box::as_ref)
    }

    pub fn diagnostics(&self) -> SearchDiagnostics {
        self.diagnostics.snapshot()
    }

    /// Search, surfacing failures to the caller / 搜索（返回错误）
    pub async fn try_search(
        &self,
        ctx: &SearchContext,
        request: &SearchRequest,
    ) -> Result<SearchResult, SearchError> {
        self.diagnostics.searches.fetch_add(1, Ordering::Relaxed);

        let request = with_tokens(request);
        let Some(strategy) = self.select(&request) else {
            self.diagnostics.unhandled.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("No search strategy for query {:?}", request.query);
            return Ok(SearchResult::empty(&request));
        };
        *self.diagnostics.last_strategy.lock() = Some(strategy.name().to_string());

        let scope = ScopeFilter::from_request(&request);
        let result = run_guarded(ctx, strategy, &request, &scope).await;

        match &result {
            Ok(page) => tracing::debug!(
                "Search via {}: query={:?} total={} returned={}",
                strategy.name(),
                request.query,
                page.total,
                page.documents.len()
            ),
            Err(e) => self.diagnostics.record_error(e),
        }
        result
    }

    /// Best-effort search, failures become an empty page / 搜索（失败返回空结果）
    pub async fn search(&self, ctx: &SearchContext, request: &SearchRequest) -> SearchResult {
        match self.try_search(ctx, request).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!("Search failed, returning no results: {}", e);
                SearchResult::empty(request)
            }
        }
    }
}

/// Tokenize the query when the caller did not supply tokens
fn with_tokens(request: &SearchRequest) -> Cow<'_, SearchRequest> {
    if request.tokens.is_empty() && !request.query.trim().is_empty() {
        let mut filled = request.clone();
        filled.tokens = tokenize_query(&request.query);
        Cow::Owned(filled)
    } else {
        Cow::Borrowed(request)
    }
}

/// Run one strategy under the context's deadline and cancellation token
async fn run_guarded(
    ctx: &SearchContext,
    strategy: &dyn SearchStrategy,
    request: &SearchRequest,
    scope: &ScopeFilter,
) -> Result<SearchResult, SearchError> {
    let run = async {
        match ctx.timeout {
            Some(limit) => match tokio::time::timeout(limit, strategy.search(ctx, request, scope)).await {
                Ok(result) => result,
                Err(_) => Err(SearchError::TimedOut(limit)),
            },
            None => strategy.search(ctx, request, scope).await,
        }
    };

    tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => Err(SearchError::Cancelled),
        result = run => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    use crate::test_support::{memory_pool, memory_pool_with_index, seed, DocSeed};

    /// Strategy that sleeps, counting how often it ran
    struct SlowStrategy {
        delay: Duration,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SearchStrategy for SlowStrategy {
        fn name(&self) -> &str {
            "slow"
        }

        fn can_handle(&self, request: &SearchRequest) -> bool {
            !request.tokens.is_empty()
        }

        async fn search(
            &self,
            _ctx: &SearchContext,
            request: &SearchRequest,
            _scope: &ScopeFilter,
        ) -> Result<SearchResult, SearchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(SearchResult::empty(request))
        }
    }

    fn slow(delay: Duration) -> (SearchCoordinator, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let coordinator = SearchCoordinator::new(vec![Box::new(SlowStrategy {
            delay,
            calls: calls.clone(),
        })]);
        (coordinator, calls)
    }

    #[tokio::test]
    async fn test_strategy_priority() {
        let pool = memory_pool().await;
        let coordinator = SearchCoordinator::with_default_strategies(pool, false);
        assert_eq!(coordinator.strategy_names(), vec!["fuzzy_prefix", "weighted_pattern"]);

        let rep = SearchRequest::new("u1", "rep");
        assert_eq!(coordinator.select(&rep).map(|s| s.name()), Some("fuzzy_prefix"));

        let ai = SearchRequest::new("u1", "ai");
        assert_eq!(coordinator.select(&ai).map(|s| s.name()), Some("weighted_pattern"));

        let blank = SearchRequest::new("u1", "   ");
        assert!(coordinator.select(&blank).is_none());
    }

    #[tokio::test]
    async fn test_empty_tokens_issue_no_query() {
        // No schema installed: any query would error out
        let pool = memory_pool().await;
        let coordinator = SearchCoordinator::with_default_strategies(pool, false);
        let result = coordinator
            .try_search(&SearchContext::new(), &SearchRequest::new("u1", ""))
            .await
            .unwrap();
        assert!(result.is_empty());
        assert_eq!(result.total_pages, 0);

        let diagnostics = coordinator.diagnostics();
        assert_eq!(diagnostics.unhandled, 1);
        assert_eq!(diagnostics.failures, 0);
    }

    #[tokio::test]
    async fn test_query_errors_are_absorbed() {
        let pool = memory_pool().await;
        let coordinator = SearchCoordinator::with_default_strategies(pool, false);
        let req = SearchRequest::new("u1", "report");

        let result = coordinator.search(&SearchContext::new(), &req).await;
        assert!(result.is_empty());
        assert!(result.documents.is_empty());

        let err = coordinator.try_search(&SearchContext::new(), &req).await.unwrap_err();
        assert!(matches!(err, SearchError::Query(_)));

        let diagnostics = coordinator.diagnostics();
        assert_eq!(diagnostics.failures, 2);
        assert_eq!(diagnostics.last_strategy.as_deref(), Some("fuzzy_prefix"));
        assert!(diagnostics.last_error.is_some());
    }

    #[tokio::test]
    async fn test_timeout_becomes_empty_result() {
        let (coordinator, calls) = slow(Duration::from_secs(5));
        let ctx = SearchContext::new().with_timeout(Some(Duration::from_millis(20)));
        let req = SearchRequest::new("u1", "report");

        let err = coordinator.try_search(&ctx, &req).await.unwrap_err();
        assert!(matches!(err, SearchError::TimedOut(_)));

        let result = coordinator.search(&ctx, &req).await;
        assert!(result.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(coordinator.diagnostics().timeouts, 2);
    }

    #[tokio::test]
    async fn test_cancelled_context() {
        let (coordinator, _) = slow(Duration::from_secs(5));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let ctx = SearchContext::new().with_cancel(cancel);

        let err = coordinator
            .try_search(&ctx, &SearchRequest::new("u1", "report"))
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::Cancelled));
        assert_eq!(coordinator.diagnostics().cancellations, 1);
    }

    #[tokio::test]
    async fn test_fills_missing_tokens() {
        let (coordinator, calls) = slow(Duration::from_millis(1));
        let req = SearchRequest::new("u1", "report").with_tokens(Vec::new());
        coordinator.search(&SearchContext::new(), &req).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_end_to_end_scenarios() {
        let (pool, report) = memory_pool_with_index().await;
        seed(&pool, DocSeed::new("u1", "Quarterly Report").created("2024-01-01T00:00:00Z")).await;
        seed(&pool, DocSeed::new("u1", "Report Card").created("2024-02-01T00:00:00Z")).await;
        seed(&pool, DocSeed::new("u1", "Email drafts").created("2024-03-01T00:00:00Z")).await;

        let coordinator = SearchCoordinator::with_default_strategies(pool, report.trigram_ready);
        let ctx = SearchContext::new();

        let rep = coordinator.search(&ctx, &SearchRequest::new("u1", "rep")).await;
        let titles: Vec<&str> = rep.documents.iter().map(|d| d.title.as_str()).collect();
        assert_eq!(titles, vec!["Report Card", "Quarterly Report"]);
        assert_eq!(coordinator.diagnostics().last_strategy.as_deref(), Some("fuzzy_prefix"));

        let ai = coordinator.search(&ctx, &SearchRequest::new("u1", "ai")).await;
        assert_eq!(ai.total, 1);
        assert_eq!(ai.documents[0].title, "Email drafts");
        assert_eq!(coordinator.diagnostics().last_strategy.as_deref(), Some("weighted_pattern"));

        let other_user = coordinator.search(&ctx, &SearchRequest::new("u2", "report")).await;
        assert!(other_user.is_empty());
    }

    #[tokio::test]
    async fn test_page_never_exceeds_limit() {
        let (pool, _) = memory_pool_with_index().await;
        for i in 0..7 {
            seed(&pool, DocSeed::new("u1", &format!("Invoice {}", i))).await;
        }
        let coordinator = SearchCoordinator::with_default_strategies(pool, true);
        let ctx = SearchContext::new();

        for query in ["invoice", "in"] {
            for page in 1..=4 {
                let req = SearchRequest::new("u1", query).with_limit(3).with_page(page);
                let result = coordinator.search(&ctx, &req).await;
                assert!(result.documents.len() <= 3);
                assert_eq!(result.total, 7);
                assert_eq!(result.total_pages, 3);
                let expected = match page {
                    1 | 2 => 3,
                    3 => 1,
                    _ => 0,
                };
                assert_eq!(result.documents.len(), expected, "query={} page={}", query, page);
            }
        }
    }
}
