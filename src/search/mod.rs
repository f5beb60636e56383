//! Search module - ranked, owner-scoped document search / 搜索模块
//!
//! Architecture principles / 架构原则：
//! - Strategies only expose primitive operations: name, can_handle, search
//! - The coordinator picks a strategy, applies deadlines and absorbs failures
//! - The index manager owns every schema object search depends on
//! - Call direction: API → Coordinator → Strategy (unidirectional) / 调用方向
//!
//! Strategies / 搜索策略（按优先级）：
//! - Fuzzy prefix: FTS5 prefix terms over the weighted search vector, bm25 ranking
//! - Weighted pattern: case-insensitive substring match, per-field points
//!   (Unicode case folding through the trigram index when it is ready)

pub mod coordinator;
pub mod db_index;
pub mod filter;
pub mod fuzzy;
pub mod listing;
pub mod pattern;
pub mod schema;
pub mod strategy;
pub mod tokenizer;

pub use coordinator::{SearchCoordinator, SearchDiagnostics};
pub use db_index::{
    IndexSettings, SchemaError, SchemaReport, SearchIndexManager, ThresholdScope, VerifyReport,
};
pub use filter::{ScopeFilter, SortBy, SortDir, SortSpec};
pub use listing::list_documents;
pub use schema::{FieldTier, SearchRequest, SearchResult};
pub use strategy::{SearchContext, SearchError, SearchStrategy};
