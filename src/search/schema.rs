//! Search request / result shapes / 搜索请求与结果定义

use serde::{Deserialize, Serialize};

use super::filter::SortSpec;
use super::tokenizer::tokenize_query;
use crate::models::SearchableDocument;

/// Hard upper bound on page size / 单页最大条数
pub const MAX_LIMIT: u32 = 100;
/// Page size used when none is given / 默认单页条数
pub const DEFAULT_LIMIT: u32 = 20;

/// Sentinel meaning "no restriction" for file type and status filters
pub const ALL_SENTINEL: &str = "all";

/// Weight tier of a searchable field, highest first / 字段权重层级
///
/// The order is persisted in the search vector's column order and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldTier {
    Title,
    Description,
    Tags,
    FileName,
}

impl FieldTier {
    /// All tiers in vector column order
    pub const ALL: [FieldTier; 4] = [
        FieldTier::Title,
        FieldTier::Description,
        FieldTier::Tags,
        FieldTier::FileName,
    ];

    /// Source column on `documents`
    pub fn column(self) -> &'static str {
        match self {
            FieldTier::Title => "title",
            FieldTier::Description => "description",
            FieldTier::Tags => "tags",
            FieldTier::FileName => "original_file_name",
        }
    }

    /// bm25 column weight used by the fuzzy strategy (A/B/C/D ladder)
    pub fn rank_weight(self) -> f64 {
        match self {
            FieldTier::Title => 1.0,
            FieldTier::Description => 0.4,
            FieldTier::Tags => 0.2,
            FieldTier::FileName => 0.1,
        }
    }

    /// Points a token earns in the weighted-pattern strategy
    pub fn pattern_points(self) -> i64 {
        match self {
            FieldTier::Title => 2,
            _ => 1,
        }
    }
}

/// Search request / 搜索请求
///
/// Constructed per call and never mutated after it is handed to the coordinator.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// Owner every result is scoped to / 所属用户
    pub user_id: String,
    /// Raw query text / 原始查询
    pub query: String,
    /// Normalized tokens derived from `query` / 分词结果
    pub tokens: Vec<String>,
    /// 1-based page / 页码
    pub page: u32,
    /// Page size, 1..=100 / 每页条数
    pub limit: u32,
    pub file_type: Option<String>,
    pub status: Option<String>,
    /// Comma separated tag fragments / 逗号分隔的标签片段
    pub tags: Option<String>,
    pub sort: SortSpec,
}

impl SearchRequest {
    pub fn new(user_id: impl Into<String>, query: impl Into<String>) -> Self {
        let query = query.into();
        let tokens = tokenize_query(&query);
        Self {
            user_id: user_id.into(),
            query,
            tokens,
            page: 1,
            limit: DEFAULT_LIMIT,
            file_type: None,
            status: None,
            tags: None,
            sort: SortSpec::default(),
        }
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page.max(1);
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit.clamp(1, MAX_LIMIT);
        self
    }

    pub fn with_tokens(mut self, tokens: Vec<String>) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn with_file_type(mut self, file_type: impl Into<String>) -> Self {
        self.file_type = Some(file_type.into());
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_tags(mut self, tags: impl Into<String>) -> Self {
        self.tags = Some(tags.into());
        self
    }

    pub fn with_sort(mut self, sort: SortSpec) -> Self {
        self.sort = sort;
        self
    }

    /// Clamp page/limit into the valid range / 规范化分页参数
    pub fn clamped(mut self, max_limit: u32) -> Self {
        self.page = self.page.max(1);
        self.limit = self.limit.clamp(1, max_limit.clamp(1, MAX_LIMIT));
        self
    }

    /// Row offset of the requested page
    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.limit)
    }
}

/// Search result page / 搜索结果页
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// Documents of the requested page, in strategy order / 当前页文档
    pub documents: Vec<SearchableDocument>,
    /// Matches before pagination / 匹配总数
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u32,
}

impl SearchResult {
    pub fn new(documents: Vec<SearchableDocument>, total: u64, page: u32, limit: u32) -> Self {
        let limit = limit.max(1);
        let total_pages = total.div_ceil(u64::from(limit));
        Self {
            documents,
            total,
            page,
            limit,
            total_pages: u32::try_from(total_pages).unwrap_or(u32::MAX),
        }
    }

    /// Empty page for a request / 空结果
    pub fn empty(request: &SearchRequest) -> Self {
        Self::new(Vec::new(), 0, request.page, request.limit)
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}
