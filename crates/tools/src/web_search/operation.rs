use crate::error::ToolError;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct SearchParams {
    pub query: String,
    #[serde(default)]
    pub search_engine: Option<String>,
    #[serde(default)]
    pub max_results: Option<usize>,
    #[serde(default)]
    pub extract_content: bool,
    #[serde(default)]
    pub time_range: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkOperation {
    #[default]
    ValidateUrl,
    ExtractContent,
    GetPageInfo,
}

impl BulkOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            BulkOperation::ValidateUrl => "validate_url",
            BulkOperation::ExtractContent => "extract_content",
            BulkOperation::GetPageInfo => "get_page_info",
        }
    }
}

/// URL-taking operations carry the URL in `query`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum WebOperation {
    Search(SearchParams),
    SearchNews(SearchParams),
    ExtractContent {
        query: String,
    },
    ValidateUrl {
        query: String,
    },
    ParseRss {
        query: String,
    },
    GetPageInfo {
        query: String,
    },
    BulkSearch {
        urls: Vec<String>,
        #[serde(default)]
        bulk_operation: BulkOperation,
    },
}

impl WebOperation {
    pub const NAMES: &'static [&'static str] = &[
        "search",
        "search_news",
        "extract_content",
        "validate_url",
        "parse_rss",
        "get_page_info",
        "bulk_search",
    ];

    pub fn parse(params: &Value) -> Result<Self, ToolError> {
        serde_json::from_value(params.clone())
            .map_err(|e| ToolError::Validation(format!("Invalid web_search parameters: {}", e)))
    }

    pub fn name(&self) -> &'static str {
        match self {
            WebOperation::Search(_) => "search",
            WebOperation::SearchNews(_) => "search_news",
            WebOperation::ExtractContent { .. } => "extract_content",
            WebOperation::ValidateUrl { .. } => "validate_url",
            WebOperation::ParseRss { .. } => "parse_rss",
            WebOperation::GetPageInfo { .. } => "get_page_info",
            WebOperation::BulkSearch { .. } => "bulk_search",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_search() {
        let op = WebOperation::parse(&json!({
            "operation": "search",
            "query": "rust",
            "max_results": 3,
            "extract_content": true
        }))
        .unwrap();
        match op {
            WebOperation::Search(p) => {
                assert_eq!(p.query, "rust");
                assert_eq!(p.max_results, Some(3));
                assert!(p.extract_content);
                assert!(p.search_engine.is_none());
            }
            other => panic!("Expected Search, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_bulk_default_operation() {
        let op = WebOperation::parse(&json!({
            "operation": "bulk_search",
            "urls": ["https://example.com"]
        }))
        .unwrap();
        assert!(matches!(
            op,
            WebOperation::BulkSearch { bulk_operation: BulkOperation::ValidateUrl, .. }
        ));
    }

    #[test]
    fn test_url_operation_requires_query() {
        assert!(WebOperation::parse(&json!({"operation": "validate_url"})).is_err());
        assert!(WebOperation::parse(&json!({"operation": "search_images", "query": "x"})).is_err());
    }
}
