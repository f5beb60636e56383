//! Fuzzy-prefix strategy / 模糊前缀搜索策略
//!
//! Runs FTS5 prefix terms joined with OR against the weighted search vector
//! (`documents_search`), ranked by bm25 with the field tier weights.

use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use super::db_index::SEARCH_VECTOR_TABLE;
use super::filter::ScopeFilter;
use super::schema::{FieldTier, SearchRequest, SearchResult};
use super::strategy::{SearchContext, SearchError, SearchStrategy};
use super::tokenizer::{token_len, tokens_at_least};
use crate::models::{SearchableDocument, DOCUMENT_COLUMNS};

/// Raw queries shorter than this are rejected / 最短查询长度
pub const MIN_QUERY_LEN: usize = 3;
/// Tokens shorter than this never become search terms / 最短词长
pub const MIN_TOKEN_LEN: usize = 3;

pub struct FuzzyPrefixStrategy {
    db: SqlitePool,
}

impl FuzzyPrefixStrategy {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

/// Build the FTS5 MATCH expression, `None` when no token qualifies / 构建MATCH表达式
///
/// Each token becomes a quoted prefix term; tokens without any letter or digit
/// are skipped since FTS5 would tokenize them to an empty phrase.
pub fn build_match_expression(tokens: &[String]) -> Option<String> {
    let terms: Vec<String> = tokens_at_least(tokens, MIN_TOKEN_LEN)
        .into_iter()
        .filter(|t| t.chars().any(char::is_alphanumeric))
        .map(|t| format!("\"{}\"*", t.replace('"', "\"\"")))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

/// `-bm25(...)` so a larger score is more relevant
fn rank_expression() -> String {
    let weights: Vec<String> = FieldTier::ALL
        .iter()
        .map(|tier| tier.rank_weight().to_string())
        .collect();
    format!("-bm25({}, {})", SEARCH_VECTOR_TABLE, weights.join(", "))
}

#[async_trait]
impl SearchStrategy for FuzzyPrefixStrategy {
    fn name(&self) -> &str {
        "fuzzy_prefix"
    }

    fn can_handle(&self, request: &SearchRequest) -> bool {
        !request.tokens.is_empty() && token_len(request.query.trim()) >= MIN_QUERY_LEN
    }

    async fn search(
        &self,
        ctx: &SearchContext,
        request: &SearchRequest,
        scope: &ScopeFilter,
    ) -> Result<SearchResult, SearchError> {
        let Some(match_expr) = build_match_expression(&request.tokens) else {
            return Ok(SearchResult::empty(request));
        };

        let mut count_qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT COUNT(*) FROM documents d WHERE d.id IN (SELECT rowid FROM {0} WHERE {0} MATCH ",
            SEARCH_VECTOR_TABLE
        ));
        count_qb.push_bind(match_expr.clone());
        count_qb.push(") AND ");
        scope.push_conditions(&mut count_qb);

        let total: i64 = count_qb.build_query_scalar::<i64>().fetch_one(&self.db).await?;
        tracing::debug!("fuzzy_prefix: match={:?} total={}", match_expr, total);
        if total <= 0 {
            return Ok(SearchResult::empty(request));
        }

        if ctx.cancel.is_cancelled() {
            return Err(SearchError::Cancelled);
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {cols}, m.score AS score FROM \
             (SELECT rowid AS doc_id, {rank} AS score FROM {table} WHERE {table} MATCH ",
            cols = DOCUMENT_COLUMNS,
            rank = rank_expression(),
            table = SEARCH_VECTOR_TABLE,
        ));
        qb.push_bind(match_expr);
        qb.push(") m JOIN documents d ON d.id = m.doc_id WHERE ");
        scope.push_conditions(&mut qb);
        qb.push(" ORDER BY m.score DESC, d.created_at DESC, d.id DESC LIMIT ");
        qb.push_bind(i64::from(request.limit));
        qb.push(" OFFSET ");
        qb.push_bind(request.offset());

        let documents = qb
            .build_query_as::<SearchableDocument>()
            .fetch_all(&self.db)
            .await?;

        Ok(SearchResult::new(documents, total as u64, request.page, request.limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::tokenizer::tokenize_query;
    use crate::test_support::{memory_pool_with_index, seed, DocSeed};

    #[test]
    fn test_match_expression_skips_short_tokens() {
        let tokens = tokenize_query("ai rep Report x");
        assert_eq!(
            build_match_expression(&tokens).as_deref(),
            Some("\"rep\"* OR \"report\"*")
        );
        assert_eq!(build_match_expression(&tokenize_query("ai of")), None);
        assert_eq!(build_match_expression(&[]), None);
    }

    #[test]
    fn test_match_expression_quotes_tokens() {
        let tokens = tokenize_query("say\"hi\" o'brien ---");
        assert_eq!(
            build_match_expression(&tokens).as_deref(),
            Some("\"say\"\"hi\"\"\"* OR \"o'brien\"*")
        );
    }

    #[tokio::test]
    async fn test_can_handle_requires_three_chars() {
        let pool = crate::test_support::memory_pool().await;
        let strategy = FuzzyPrefixStrategy::new(pool);
        assert!(!strategy.can_handle(&SearchRequest::new("u1", "ai")));
        assert!(!strategy.can_handle(&SearchRequest::new("u1", "   ")));
        assert!(!strategy.can_handle(&SearchRequest::new("u1", " ai ")));
        assert!(strategy.can_handle(&SearchRequest::new("u1", "rep")));
        assert!(!strategy.can_handle(&SearchRequest::new("u1", "rep").with_tokens(Vec::new())));
    }

    #[test]
    fn test_rank_expression_uses_tier_order() {
        assert_eq!(rank_expression(), "-bm25(documents_search, 1, 0.4, 0.2, 0.1)");
    }

    #[tokio::test]
    async fn test_prefix_scenario_ties_break_by_recency() {
        let (pool, _) = memory_pool_with_index().await;
        seed(&pool, DocSeed::new("u1", "Quarterly Report").created("2024-01-01T00:00:00Z")).await;
        seed(&pool, DocSeed::new("u1", "Report Card").created("2024-02-01T00:00:00Z")).await;
        seed(&pool, DocSeed::new("u2", "Report of someone else").created("2024-03-01T00:00:00Z")).await;

        let strategy = FuzzyPrefixStrategy::new(pool);
        let req = SearchRequest::new("u1", "rep");
        assert!(strategy.can_handle(&req));
        let result = strategy
            .search(&SearchContext::new(), &req, &ScopeFilter::from_request(&req))
            .await
            .unwrap();

        assert_eq!(result.total, 2);
        let titles: Vec<&str> = result.documents.iter().map(|d| d.title.as_str()).collect();
        assert_eq!(titles, vec!["Report Card", "Quarterly Report"]);
        assert!(result.documents[0].score > 0.0);
    }

    #[tokio::test]
    async fn test_title_outranks_filename() {
        let (pool, _) = memory_pool_with_index().await;
        seed(
            &pool,
            DocSeed::new("u1", "Misc notes")
                .file_name("invoice_march.pdf")
                .created("2024-05-01T00:00:00Z"),
        )
        .await;
        seed(
            &pool,
            DocSeed::new("u1", "Invoice March")
                .file_name("scan.pdf")
                .created("2024-01-01T00:00:00Z"),
        )
        .await;

        let strategy = FuzzyPrefixStrategy::new(pool);
        let req = SearchRequest::new("u1", "invoice");
        let result = strategy
            .search(&SearchContext::new(), &req, &ScopeFilter::from_request(&req))
            .await
            .unwrap();

        assert_eq!(result.total, 2);
        assert_eq!(result.documents[0].title, "Invoice March");
        assert!(result.documents[0].score > result.documents[1].score);
    }

    #[tokio::test]
    async fn test_terms_are_ored() {
        let (pool, _) = memory_pool_with_index().await;
        seed(&pool, DocSeed::new("u1", "Running shoes")).await;
        seed(&pool, DocSeed::new("u1", "Budget").description("yearly planning")).await;
        seed(&pool, DocSeed::new("u1", "Unrelated")).await;

        let strategy = FuzzyPrefixStrategy::new(pool);
        let req = SearchRequest::new("u1", "run plan");
        let result = strategy
            .search(&SearchContext::new(), &req, &ScopeFilter::from_request(&req))
            .await
            .unwrap();
        assert_eq!(result.total, 2);
    }

    #[tokio::test]
    async fn test_pagination_slices_page() {
        let (pool, _) = memory_pool_with_index().await;
        for i in 0..5 {
            seed(
                &pool,
                DocSeed::new("u1", &format!("Report {}", i))
                    .created(&format!("2024-01-0{}T00:00:00Z", i + 1)),
            )
            .await;
        }

        let strategy = FuzzyPrefixStrategy::new(pool);
        let req = SearchRequest::new("u1", "report").with_limit(2).with_page(3);
        let result = strategy
            .search(&SearchContext::new(), &req, &ScopeFilter::from_request(&req))
            .await
            .unwrap();
        assert_eq!(result.total, 5);
        assert_eq!(result.total_pages, 3);
        assert_eq!(result.documents.len(), 1);
        assert_eq!(result.documents[0].title, "Report 0");
    }

    #[tokio::test]
    async fn test_no_qualifying_token_issues_no_query() {
        // No search vector installed: any query would fail, so Ok proves none ran
        let pool = crate::test_support::memory_pool().await;
        let strategy = FuzzyPrefixStrategy::new(pool);
        let req = SearchRequest::new("u1", "to be or");
        let result = strategy
            .search(&SearchContext::new(), &req, &ScopeFilter::from_request(&req))
            .await
            .unwrap();
        assert!(result.is_empty());
        assert!(result.documents.is_empty());
    }

    #[tokio::test]
    async fn test_scope_excludes_best_match() {
        let (pool, _) = memory_pool_with_index().await;
        // Title hit outranks the tag-only hits, but lacks the "q3" fragment
        seed(&pool, DocSeed::new("u1", "Invoice").tags("finance").created("2024-06-01T00:00:00Z")).await;
        seed(&pool, DocSeed::new("u1", "Misc").tags("finance, q3, invoice")).await;
        seed(&pool, DocSeed::new("u1", "Scan").file_type("png").tags("q3, invoice")).await;

        let strategy = FuzzyPrefixStrategy::new(pool);

        let req = SearchRequest::new("u1", "invoice").with_tags("Q3");
        let result = strategy
            .search(&SearchContext::new(), &req, &ScopeFilter::from_request(&req))
            .await
            .unwrap();
        assert_eq!(result.total, 2);
        assert!(result.documents.iter().all(|d| d.title != "Invoice"));

        let req = SearchRequest::new("u1", "invoice").with_tags("q3").with_file_type("png");
        let result = strategy
            .search(&SearchContext::new(), &req, &ScopeFilter::from_request(&req))
            .await
            .unwrap();
        assert_eq!(result.total, 1);
        assert_eq!(result.documents[0].title, "Scan");

        let req = SearchRequest::new("u1", "invoice").with_status("archived");
        let result = strategy
            .search(&SearchContext::new(), &req, &ScopeFilter::from_request(&req))
            .await
            .unwrap();
        assert!(result.is_empty());
    }
}
