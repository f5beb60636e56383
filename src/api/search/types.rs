use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};

use docvault_search::config::SearchConfig;
use docvault_search::search::{
    SchemaReport, SearchDiagnostics, SearchRequest, SortSpec, ThresholdScope, VerifyReport,
};

use crate::api::ApiResponse;

/// Header carrying the authenticated user id / 用户标识请求头
pub const USER_HEADER: &str = "x-user-id";

pub type ApiError = (StatusCode, Json<ApiResponse<()>>);

/// Search/listing parameters, JSON body or query string / 搜索参数
#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub query: String,
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub file_type: Option<String>,
    pub status: Option<String>,
    pub tags: Option<String>,
    pub sort_by: Option<String>,
    pub sort_dir: Option<String>,
}

impl SearchParams {
    /// Resolve into a domain request for `user_id` / 转换为搜索请求
    pub fn into_request(self, user_id: String, config: &SearchConfig) -> SearchRequest {
        let mut request = SearchRequest::new(user_id, self.query)
            .with_page(self.page.unwrap_or(1))
            .with_limit(self.limit.unwrap_or(config.default_limit))
            .with_sort(SortSpec::parse(self.sort_by.as_deref(), self.sort_dir.as_deref()));

        if let Some(file_type) = self.file_type {
            request = request.with_file_type(file_type);
        }
        if let Some(status) = self.status {
            request = request.with_status(status);
        }
        if let Some(tags) = self.tags {
            request = request.with_tags(tags);
        }
        request.clamped(config.max_limit)
    }
}

/// Requesting user, set by the authentication layer in front of us
pub fn require_user(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                Json(ApiResponse::error(401, "missing user identity")),
            )
        })
}

/// GET /api/search/status payload / 搜索状态
#[derive(Debug, Serialize)]
pub struct SearchStatus {
    pub text_config: Option<String>,
    pub used_default_config: bool,
    pub similarity_threshold: Option<f64>,
    pub threshold_scope: Option<ThresholdScope>,
    pub trigram_ready: bool,
    pub skipped: Vec<String>,
    pub strategies: Vec<String>,
    pub verify: VerifyReport,
    pub diagnostics: SearchDiagnostics,
}

impl SearchStatus {
    pub fn from_report(report: &SchemaReport) -> Self {
        Self {
            text_config: Some(report.text_config.clone()),
            used_default_config: report.used_default_config,
            similarity_threshold: Some(report.similarity_threshold),
            threshold_scope: Some(report.threshold_scope),
            trigram_ready: report.trigram_ready,
            skipped: report.skipped.clone(),
            strategies: Vec::new(),
            verify: report.verify.clone(),
            diagnostics: SearchDiagnostics::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docvault_search::search::{SortBy, SortDir};

    #[test]
    fn test_params_defaults_and_clamp() {
        let config = SearchConfig { max_limit: 50, ..SearchConfig::default() };
        let req = SearchParams { limit: Some(80), page: Some(0), ..Default::default() }
            .into_request("u1".into(), &config);
        assert_eq!(req.limit, 50);
        assert_eq!(req.page, 1);

        let req = SearchParams::default().into_request("u1".into(), &config);
        assert_eq!(req.limit, config.default_limit);
        assert_eq!(req.sort, SortSpec::new(SortBy::Date, SortDir::Desc));
    }

    #[test]
    fn test_require_user() {
        let mut headers = HeaderMap::new();
        assert!(require_user(&headers).is_err());
        headers.insert(USER_HEADER, " u7 ".parse().unwrap());
        assert_eq!(require_user(&headers).unwrap(), "u7");
    }
}
