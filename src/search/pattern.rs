//! Weighted-pattern strategy / 加权子串匹配策略
//!
//! Every token of 2+ chars must be a case-insensitive substring of at least one
//! searchable field. Score per token: title 2, description 1, tags 1, filename 1.
//!
//! With the trigram index ready, tokens of 3+ chars are matched through it, since
//! its folding covers all of Unicode. Shorter tokens, or all tokens without the
//! index, go through `LIKE` over every case spelling `lower()` may leave behind.

use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use super::db_index::TRIGRAM_TABLE;
use super::filter::{push_folded_like, ScopeFilter};
use super::schema::{FieldTier, SearchRequest, SearchResult};
use super::strategy::{SearchContext, SearchError, SearchStrategy};
use super::tokenizer::{token_len, tokens_at_least};
use crate::models::{SearchableDocument, DOCUMENT_COLUMNS};

/// Tokens shorter than this are ignored / 最短词长
pub const MIN_TOKEN_LEN: usize = 2;
/// Trigram index only answers substrings of at least three chars
const TRIGRAM_MIN_LEN: usize = 3;

pub struct WeightedPatternStrategy {
    db: SqlitePool,
    use_trigram: bool,
}

impl WeightedPatternStrategy {
    pub fn new(db: SqlitePool) -> Self {
        Self { db, use_trigram: false }
    }

    /// Match long tokens through the trigram index when it is ready / 启用三元组索引
    pub fn with_trigram(mut self, enabled: bool) -> Self {
        self.use_trigram = enabled;
        self
    }
}

/// Case-normalized column expression for a tier
fn field_expr(tier: FieldTier) -> String {
    format!("lower(COALESCE(d.{}, ''))", tier.column())
}

/// Column-scoped trigram MATCH expression, e.g. `title : "über"`
fn trigram_expression(tier: FieldTier, token: &str) -> String {
    format!("{} : \"{}\"", tier.column(), token.replace('"', "\"\""))
}

impl WeightedPatternStrategy {
    /// Does `tier` of the row contain `token`
    fn push_field_match(&self, qb: &mut QueryBuilder<'_, Sqlite>, tier: FieldTier, token: &str) {
        if self.use_trigram && token_len(token) >= TRIGRAM_MIN_LEN {
            qb.push(format!(
                "d.id IN (SELECT rowid FROM {0} WHERE {0} MATCH ",
                TRIGRAM_TABLE
            ));
            qb.push_bind(trigram_expression(tier, token));
            qb.push(")");
        } else {
            push_folded_like(qb, &field_expr(tier), token);
        }
    }

    /// Scope + per-token field match (AND across tokens, OR across fields)
    fn push_where(&self, qb: &mut QueryBuilder<'_, Sqlite>, scope: &ScopeFilter, tokens: &[&str]) {
        scope.push_conditions(qb);

        for token in tokens {
            qb.push(" AND (");
            for (i, tier) in FieldTier::ALL.iter().enumerate() {
                if i > 0 {
                    qb.push(" OR ");
                }
                self.push_field_match(qb, *tier, token);
            }
            qb.push(")");
        }
    }

    /// Sum of per-token, per-field points as a SQL expression
    fn push_score(&self, qb: &mut QueryBuilder<'_, Sqlite>, tokens: &[&str]) {
        qb.push("CAST((0");
        for token in tokens {
            for tier in FieldTier::ALL {
                qb.push(" + CASE WHEN ");
                self.push_field_match(qb, tier, token);
                qb.push(format!(" THEN {} ELSE 0 END", tier.pattern_points()));
            }
        }
        qb.push(") AS REAL)");
    }
}

#[async_trait]
impl SearchStrategy for WeightedPatternStrategy {
    fn name(&self) -> &str {
        "weighted_pattern"
    }

    fn can_handle(&self, request: &SearchRequest) -> bool {
        !request.tokens.is_empty()
    }

    async fn search(
        &self,
        ctx: &SearchContext,
        request: &SearchRequest,
        scope: &ScopeFilter,
    ) -> Result<SearchResult, SearchError> {
        let tokens = tokens_at_least(&request.tokens, MIN_TOKEN_LEN);
        if tokens.is_empty() {
            return Ok(SearchResult::empty(request));
        }

        let mut count_qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) FROM documents d WHERE ");
        self.push_where(&mut count_qb, scope, &tokens);

        let total: i64 = count_qb.build_query_scalar::<i64>().fetch_one(&self.db).await?;
        tracing::debug!("weighted_pattern: tokens={:?} total={}", tokens, total);
        if total <= 0 {
            return Ok(SearchResult::empty(request));
        }

        if ctx.cancel.is_cancelled() {
            return Err(SearchError::Cancelled);
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!("SELECT {}, ", DOCUMENT_COLUMNS));
        self.push_score(&mut qb, &tokens);
        qb.push(" AS score FROM documents d WHERE ");
        self.push_where(&mut qb, scope, &tokens);
        qb.push(" ORDER BY score DESC, d.created_at DESC, d.id DESC LIMIT ");
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
