//! Scope filter and sort mapping shared by every strategy / 公共过滤与排序
//!
//! All conditions reference the `documents` table through the alias `d`.

use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite};

use super::schema::{SearchRequest, ALL_SENTINEL};

/// Ownership + structural predicate / 作用域过滤条件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeFilter {
    pub owner_id: String,
    pub file_type: Option<String>,
    pub status: Option<String>,
    /// Lower-cased tag fragments, every one must match / 标签片段（全部匹配）
    pub tag_fragments: Vec<String>,
}

impl ScopeFilter {
    /// Only restrict to the owner / 仅限制所属用户
    pub fn for_owner(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            file_type: None,
            status: None,
            tag_fragments: Vec::new(),
        }
    }

    pub fn from_request(request: &SearchRequest) -> Self {
        Self {
            owner_id: request.user_id.clone(),
            file_type: exact_filter(request.file_type.as_deref()),
            status: exact_filter(request.status.as_deref()),
            tag_fragments: request
                .tags
                .as_deref()
                .map(split_tag_fragments)
                .unwrap_or_default(),
        }
    }

    /// Append the predicate (without a leading WHERE/AND) / 追加过滤条件
    pub fn push_conditions(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        qb.push("d.owner_id = ");
        qb.push_bind(self.owner_id.clone());

        if let Some(ref file_type) = self.file_type {
            qb.push(" AND d.file_type = ");
            qb.push_bind(file_type.clone());
        }

        if let Some(ref status) = self.status {
            qb.push(" AND d.status = ");
            qb.push_bind(status.clone());
        }

        for fragment in &self.tag_fragments {
            qb.push(" AND ");
            push_folded_like(qb, "lower(COALESCE(d.tags, ''))", fragment);
        }
    }
}

/// `None`, empty and the "all" sentinel all mean no restriction
fn exact_filter(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case(ALL_SENTINEL))
        .map(str::to_string)
}

/// Split "a, b,,c" into ["a", "b", "c"] / 拆分标签片段
pub fn split_tag_fragments(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Escape LIKE metacharacters so the text matches literally / 转义LIKE通配符
///
/// Pairs with `ESCAPE '\'`. Quotes need no treatment since patterns are always bound.
pub fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Case-insensitive "contains" pattern for an already lower-cased needle
pub fn like_contains(needle: &str) -> String {
    format!("%{}%", escape_like(needle))
}

/// Cap on spellings produced by `case_variants` / 大小写变体上限
pub const MAX_CASE_VARIANTS: usize = 16;

/// Spellings of `needle` that SQLite's ASCII-only `lower()` can produce / 大小写变体
///
/// ASCII folds to lower case. Each non-ASCII letter with a one-char upper case
/// form yields both forms, until `MAX_CASE_VARIANTS` is reached; later letters
/// keep their lower case form only.
pub fn case_variants(needle: &str) -> Vec<String> {
    let mut variants = vec![String::new()];
    for c in needle.chars() {
        if c.is_ascii() {
            let lower = c.to_ascii_lowercase();
            variants.iter_mut().for_each(|v| v.push(lower));
            continue;
        }

        let lower: String = c.to_lowercase().collect();
        let mut upper = c.to_uppercase();
        let upper = match (upper.next(), upper.next()) {
            (Some(u), None) if lower.chars().ne(std::iter::once(u)) => Some(u),
            _ => None,
        };

        match upper {
            Some(u) if variants.len() * 2 <= MAX_CASE_VARIANTS => {
                variants = variants
                    .into_iter()
                    .flat_map(|v| {
                        let mut with_upper = v.clone();
                        with_upper.push(u);
                        [v + &lower, with_upper]
                    })
                    .collect();
            }
            _ => variants.iter_mut().for_each(|v| v.push_str(&lower)),
        }
    }
    variants
}

/// `(expr LIKE ? OR expr LIKE ? ...)` over every case variant of `needle`
///
/// `expr` must already be wrapped in `lower(...)`.
pub fn push_folded_like(qb: &mut QueryBuilder<'_, Sqlite>, expr: &str, needle: &str) {
    qb.push("(");
    for (i, variant) in case_variants(needle).iter().enumerate() {
        if i > 0 {
            qb.push(" OR ");
        }
        qb.push(expr);
        qb.push(" LIKE ");
        qb.push_bind(like_contains(variant));
        qb.push(" ESCAPE '\\'");
    }
    qb.push(")");
}

/// Sort column / 排序字段
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    #[default]
    Date,
    Title,
    Size,
    Views,
    Downloads,
}

impl SortBy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "date" => Some(SortBy::Date),
            "title" => Some(SortBy::Title),
            "size" => Some(SortBy::Size),
            "views" => Some(SortBy::Views),
            "downloads" => Some(SortBy::Downloads),
            _ => None,
        }
    }

    /// Column expression; title is case-normalized
    fn column(self) -> &'static str {
        match self {
            SortBy::Date => "d.created_at",
            SortBy::Title => "lower(d.title)",
            SortBy::Size => "d.file_size",
            SortBy::Views => "d.view_count",
            SortBy::Downloads => "d.download_count",
        }
    }
}

/// Sort direction / 排序方向
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDir {
    Asc,
    #[default]
    Desc,
}

impl SortDir {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("asc") => SortDir::Asc,
            _ => SortDir::Desc,
        }
    }

    fn keyword(self) -> &'static str {
        match self {
            SortDir::Asc => "ASC",
            SortDir::Desc => "DESC",
        }
    }
}

/// Resolved ordering for non-relevance listings / 列表排序
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub by: SortBy,
    pub dir: SortDir,
}

impl SortSpec {
    pub fn new(by: SortBy, dir: SortDir) -> Self {
        Self { by, dir }
    }

    /// Resolve raw request parameters; an unknown column means newest first
    pub fn parse(sort_by: Option<&str>, sort_dir: Option<&str>) -> Self {
        let dir = SortDir::parse(sort_dir);
        match sort_by.map(str::trim).filter(|s| !s.is_empty()) {
            None => Self::new(SortBy::Date, dir),
            Some(raw) => match SortBy::parse(raw) {
                Some(by) => Self::new(by, dir),
                None => {
                    tracing::debug!("Unknown sort_by {:?}, falling back to created_at DESC", raw);
                    Self::default()
                }
            },
        }
    }

    /// ORDER BY body with recency and id tie-breaks / 排序子句
    pub fn order_clause(&self) -> String {
        match self.by {
            SortBy::Date => format!("d.created_at {0}, d.id {0}", self.dir.keyword()),
            other => format!(
                "{} {}, d.created_at DESC, d.id DESC",
                other.column(),
                self.dir.keyword()
            ),
        }
    }
}
