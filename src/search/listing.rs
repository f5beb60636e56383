//! Document listing without a query / 文档列表
//!
//! Same scope filter and envelope as search, ordered by `SortSpec`.
//! Errors propagate: a listing that cannot run is not an empty listing.

use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use super::filter::ScopeFilter;
use super::schema::{SearchRequest, SearchResult};
use crate::models::{SearchableDocument, DOCUMENT_COLUMNS};

/// List the caller's documents / 列出用户文档
pub async fn list_documents(db: &SqlitePool, request: &SearchRequest) -> Result<SearchResult, sqlx::Error> {
    let scope = ScopeFilter::from_request(request);

    let mut count_qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM documents d WHERE ");
    scope.push_conditions(&mut count_qb);
    let total: i64 = count_qb.build_query_scalar::<i64>().fetch_one(db).await?;

    if total <= 0 {
        return Ok(SearchResult::empty(request));
    }

    let mut qb: QueryBuilder<Sqlite> =
        QueryBuilder::new(format!("SELECT {} FROM documents d WHERE ", DOCUMENT_COLUMNS));
    scope.push_conditions(&mut qb);
    qb.push(" ORDER BY ");
    qb.push(request.sort.order_clause());
    qb.push(" LIMIT ");
    qb.push_bind(i64::from(request.limit));
    qb.push(" OFFSET ");
    qb.push_bind(request.offset());

    let documents = qb.build_query_as::<SearchableDocument>().fetch_all(db).await?;
    Ok(SearchResult::new(documents, total as u64, request.page, request.limit))
}
