//! Policy-governed web search and retrieval tool.

mod cache;
mod config;
mod engine;
mod feed;
mod fetch;
mod html;
mod operation;

pub use cache::{CacheKey, ResponseCache};
pub use config::WebSearchConfig;
pub use engine::{DuckDuckGo, SearchEngine, SearchHit, SearchRequest};
pub use feed::{Feed, FeedEntry, FeedInfo};
pub use fetch::{Fetcher, MAX_REDIRECTS};
pub use html::{PageContent, PageLink};
pub use operation::{BulkOperation, SearchParams, WebOperation};

use crate::config::ToolConfig;
use crate::error::ToolError;
use crate::traits::Tool;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use toolwarden_policy::{PolicyViolation, QueryGuard, UrlPolicy};
use tracing::{debug, info, warn};

const HIT_CONTENT_CHARS: usize = 1000;
const MAX_RESULTS_CAP: usize = 50;

pub struct WebSearchTool {
    config: WebSearchConfig,
    fetcher: Fetcher,
    engines: HashMap<String, Arc<dyn SearchEngine>>,
    cache: ResponseCache,
}

impl WebSearchTool {
    pub fn new(config: WebSearchConfig) -> Result<Self, ToolError> {
        let policy = UrlPolicy::new()
            .with_allowed_domains(config.allowed_domains.clone())
            .with_blocked_domains(config.blocked_domains.clone())
            .allow_private_network(config.allow_private_network);
        let fetcher = Fetcher::new(
            policy,
            &config.user_agent,
            Duration::from_secs(config.request_timeout_secs),
            config.max_content_length,
        )?;

        let ddg = DuckDuckGo::new(
            fetcher.client().clone(),
            config.duckduckgo_endpoint.clone(),
            config.max_content_length,
        );
        let cache = ResponseCache::new(
            Duration::from_secs(config.cache_ttl_secs),
            config.enable_caching,
        );

        info!(
            blocked = config.blocked_domains.len(),
            allowed = config.allowed_domains.len(),
            engine = %config.default_search_engine,
            "WebSearchTool initialized"
        );

        let mut tool = Self {
            config,
            fetcher,
            engines: HashMap::new(),
            cache,
        };
        tool.engines.insert(ddg.name().to_string(), Arc::new(ddg));
        Ok(tool)
    }

    /// Register an additional backend, replacing any with the same name.
    pub fn with_engine(mut self, engine: Arc<dyn SearchEngine>) -> Self {
        self.engines.insert(engine.name().to_string(), engine);
        self
    }

    pub fn web_config(&self) -> &WebSearchConfig {
        &self.config
    }

    pub fn url_policy(&self) -> &UrlPolicy {
        self.fetcher.policy()
    }

    pub fn cached_responses(&self) -> usize {
        self.cache.len()
    }

    fn check_url(&self, raw: &str) -> Result<(), PolicyViolation> {
        self.fetcher.policy().check(raw).map(|_| ())
    }

    async fn search(&self, params: SearchParams, news: bool) -> Result<Value, ToolError> {
        let engine_name = params
            .search_engine
            .clone()
            .unwrap_or_else(|| self.config.default_search_engine.clone());
        let engine = self.engines.get(&engine_name).cloned().ok_or_else(|| {
            ToolError::Validation(format!("Unsupported search engine: {}", engine_name))
        })?;

        let query = if news {
            format!("{} news", params.query)
        } else {
            params.query.clone()
        };
        let default_range = if news { "week" } else { "all" };
        let time_range = params
            .time_range
            .clone()
            .unwrap_or_else(|| default_range.to_string());
        let max_results = params
            .max_results
            .unwrap_or(self.config.max_results)
            .clamp(1, MAX_RESULTS_CAP);

        let key = CacheKey {
            operation: match (news, params.extract_content) {
                (false, false) => "search",
                (false, true) => "search_with_content",
                (true, false) => "search_news",
                (true, true) => "search_news_with_content",
            },
            query: query.clone(),
            engine: engine_name.clone(),
            time_range: time_range.clone(),
            language: params.language.clone().unwrap_or_default(),
            max_results,
        };
        if let Some(hit) = self.cache.get(&key) {
            debug!(query = %query, "Search served from cache");
            return Ok(hit);
        }

        let request = SearchRequest {
            query: query.clone(),
            max_results,
            time_range: time_range.clone(),
            language: key.language.clone(),
        };
        let mut hits = engine.search(&request).await?;
        hits.truncate(max_results);

        if params.extract_content {
            for hit in hits.iter_mut() {
                if hit.url.is_empty() || self.check_url(&hit.url).is_err() {
                    continue;
                }
                hit.extracted_content = Some(match self.extract_content(&hit.url).await {
                    Ok(page) => page.content.chars().take(HIT_CONTENT_CHARS).collect(),
                    Err(e) => {
                        debug!(url = %hit.url, error = %e, "Hit content extraction failed");
                        "Content extraction failed".to_string()
                    }
                });
            }
        }

        let mut value = json!({
            "query": query,
            "search_engine": engine_name,
            "total_results": hits.len(),
            "results": hits,
            "timestamp": Utc::now().to_rfc3339(),
        });
        if news {
            value["time_range"] = json!(time_range);
        }
        self.cache.insert(key, value.clone());
        Ok(value)
    }

    async fn extract_content(&self, url: &str) -> Result<PageContent, ToolError> {
        let body = self.fetcher.get(url).await?;
        if !fetch::is_html(&body.content_type) {
            return Err(ToolError::Execution(format!(
                "Unsupported content type for extraction: {}",
                if body.content_type.is_empty() { "unknown" } else { body.content_type.as_str() }
            )));
        }
        html::extract(
            &body.text(),
            &body.final_url,
            self.config.max_extracted_chars,
            self.config.max_links,
        )
    }

    async fn extract_content_value(&self, url: &str) -> Result<Value, ToolError> {
        let key = CacheKey::for_url("extract_content", url);
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit);
        }
        let page = self.extract_content(url).await?;
        let value = json!({
            "url": url,
            "title": page.title,
            "description": page.description,
            "content": page.content,
            "content_length": page.content_length,
            "links": page.links,
            "extraction_timestamp": Utc::now().to_rfc3339(),
        });
        self.cache.insert(key, value.clone());
        Ok(value)
    }

    async fn validate_url(&self, url: &str) -> Result<Value, ToolError> {
        // Policy denials propagate; only reachability problems are reported inline.
        match self.fetcher.send(Method::HEAD, url).await {
            Ok((final_url, response)) => {
                let header = |name: &str| fetch::header_string(&response, name);
                let status = response.status();
                Ok(json!({
                    "url": url,
                    "final_url": final_url.as_str(),
                    "accessible": status.is_success(),
                    "status_code": status.as_u16(),
                    "content_type": header("content-type"),
                    "content_length": header("content-length"),
                    "last_modified": header("last-modified"),
                    "server": header("server"),
                    "validation_timestamp": Utc::now().to_rfc3339(),
                }))
            }
            Err(e @ ToolError::SecurityDenied(_)) => Err(e),
            Err(e) => Ok(json!({
                "url": url,
                "accessible": false,
                "error": e.to_string(),
                "validation_timestamp": Utc::now().to_rfc3339(),
            })),
        }
    }

    async fn parse_rss(&self, url: &str) -> Result<Value, ToolError> {
        let key = CacheKey::for_url("parse_rss", url);
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit);
        }
        let body = self.fetcher.get(url).await?;
        if !fetch::is_feed(&body.content_type) {
            return Err(ToolError::Execution(format!(
                "Unsupported content type for feed: {}",
                if body.content_type.is_empty() { "unknown" } else { body.content_type.as_str() }
            )));
        }
        let parsed = feed::parse(&body.text(), self.config.max_feed_entries)?;
        let value = json!({
            "url": url,
            "feed_info": parsed.feed_info,
            "entries": parsed.entries,
            "parsing_timestamp": Utc::now().to_rfc3339(),
        });
        self.cache.insert(key, value.clone());
        Ok(value)
    }

    async fn get_page_info(&self, url: &str) -> Result<Value, ToolError> {
        let validation = self.validate_url(url).await?;
        let accessible = validation["accessible"].as_bool().unwrap_or(false);
        let content = if accessible {
            self.extract_content_value(url).await?
        } else {
            Value::Null
        };
        Ok(json!({
            "url": url,
            "validation": validation,
            "content": content,
            "comprehensive": accessible,
            "timestamp": Utc::now().to_rfc3339(),
        }))
    }

    async fn bulk(&self, urls: Vec<String>, operation: BulkOperation) -> Result<Value, ToolError> {
        if urls.is_empty() {
            return Err(ToolError::Validation(
                "bulk_search requires at least one URL".to_string(),
            ));
        }
        let total = urls.len();
        let delay = Duration::from_millis(self.config.bulk_delay_ms);
        let mut results = Vec::new();

        for (index, url) in urls.into_iter().take(self.config.bulk_max_urls).enumerate() {
            if index > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let outcome = match operation {
                BulkOperation::ValidateUrl => self.validate_url(&url).await,
                BulkOperation::ExtractContent => self.extract_content_value(&url).await,
                BulkOperation::GetPageInfo => self.get_page_info(&url).await,
            };
            results.push(match outcome {
                Ok(value) => value,
                Err(e) => {
                    warn!(url = %url, error = %e, "Bulk item failed");
                    let mut item = json!({
                        "url": url,
                        "error": e.to_string(),
                        "error_kind": e.kind().as_str(),
                        "operation": operation.as_str(),
                    });
                    if let Some(reason) = e.deny_reason() {
                        item["deny_reason"] = json!(reason.as_str());
                    }
                    item
                }
            });
        }

        Ok(json!({
            "operation": operation.as_str(),
            "total_urls": total,
            "processed_urls": results.len(),
            "results": results,
            "timestamp": Utc::now().to_rfc3339(),
        }))
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web and retrieve public pages. Can search, search news, extract page \
         content, validate URLs, parse RSS or Atom feeds, summarise a page and process \
         several URLs at once."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "operation": {
                    "type": "string",
                    "enum": WebOperation::NAMES,
                    "description": "Web operation to perform"
                },
                "query": {
                    "type": "string",
                    "description": "Search query, or the URL for URL operations"
                },
                "search_engine": {
                    "type": "string",
                    "default": self.config.default_search_engine,
                    "description": "Search backend"
                },
                "max_results": {
                    "type": "integer",
                    "default": self.config.max_results,
                    "description": "Maximum number of results"
                },
                "extract_content": {
                    "type": "boolean",
                    "default": false,
                    "description": "Attach page text to each search hit"
                },
                "time_range": {
                    "type": "string",
                    "enum": ["day", "week", "month", "year", "all"],
                    "description": "Time window for results"
                },
                "language": {
                    "type": "string",
                    "description": "Result language"
                },
                "urls": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "URLs to process (bulk_search)"
                },
                "bulk_operation": {
                    "type": "string",
                    "enum": ["validate_url", "extract_content", "get_page_info"],
                    "default": "validate_url",
                    "description": "Operation applied to each URL (bulk_search)"
                }
            },
            "required": ["operation"]
        })
    }

    fn config(&self) -> ToolConfig {
        self.config.tool.clone()
    }

    fn check_security(&self, params: &Value) -> Result<(), PolicyViolation> {
        let Ok(op) = WebOperation::parse(params) else {
            return Ok(());
        };
        match &op {
            WebOperation::Search(p) | WebOperation::SearchNews(p) => {
                QueryGuard::validate(&p.query)?;
                let trimmed = p.query.trim_start().to_ascii_lowercase();
                if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
                    self.check_url(p.query.trim())?;
                }
                Ok(())
            }
            WebOperation::ExtractContent { query }
            | WebOperation::ValidateUrl { query }
            | WebOperation::ParseRss { query }
            | WebOperation::GetPageInfo { query } => self.check_url(query),
            // Each URL is judged individually and reported in its own result.
            WebOperation::BulkSearch { .. } => Ok(()),
        }
    }

    async fn run(&self, params: Value) -> Result<Value, ToolError> {
        let op = WebOperation::parse(&params)?;
        debug!(operation = op.name(), "web_search");
        match op {
            WebOperation::Search(p) => self.search(p, false).await,
            WebOperation::SearchNews(p) => self.search(p, true).await,
            WebOperation::ExtractContent { query } => {
                self.check_url(&query)?;
                self.extract_content_value(&query).await
            }
            WebOperation::ValidateUrl { query } => self.validate_url(&query).await,
            WebOperation::ParseRss { query } => self.parse_rss(&query).await,
            WebOperation::GetPageInfo { query } => self.get_page_info(&query).await,
            WebOperation::BulkSearch {
                urls,
                bulk_operation,
            } => self.bulk(urls, bulk_operation).await,
        }
    }

    async fn shutdown(&self) {
        self.cache.clear();
        info!("WebSearchTool cache cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolwarden_policy::DenyReason;

    fn tool() -> WebSearchTool {
        WebSearchTool::new(WebSearchConfig::default()).unwrap()
    }

    #[test]
    fn test_blocked_domain_denied_before_io() {
        let err = tool()
            .check_security(&json!({
                "operation": "extract_content",
                "query": "https://cdn.malware.com/payload"
            }))
            .unwrap_err();
        assert_eq!(err.reason, DenyReason::BlockedDomain);
    }

    #[test]
    fn test_script_query_denied() {
        let err = tool()
            .check_security(&json!({
                "operation": "search",
                "query": "<script>alert(1)</script>"
            }))
            .unwrap_err();
        assert_eq!(err.reason, DenyReason::InjectionSuspected);
    }

    #[test]
    fn test_url_shaped_query_checked() {
        let err = tool()
            .check_security(&json!({
                "operation": "search",
                "query": "http://10.0.0.1/admin"
            }))
            .unwrap_err();
        assert_eq!(err.reason, DenyReason::SsrfSuspected);
        assert!(tool()
            .check_security(&json!({"operation": "search", "query": "rust ownership"}))
            .is_ok());
    }

    #[tokio::test]
    async fn test_unknown_engine_is_validation_error() {
        let err = tool()
            .run(json!({"operation": "search", "query": "x", "search_engine": "altavista"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Validation(_)));
    }

    #[tokio::test]
    async fn test_bulk_reports_denials_per_url() {
        let mut config = WebSearchConfig::default();
        config.bulk_delay_ms = 0;
        let tool = WebSearchTool::new(config).unwrap();
        let out = tool
            .run(json!({
                "operation": "bulk_search",
                "urls": ["http://127.0.0.1/", "ftp://example.com/file"]
            }))
            .await
            .unwrap();
        assert_eq!(out["processed_urls"], 2);
        assert_eq!(out["results"][0]["deny_reason"], "ssrf_suspected");
        assert_eq!(out["results"][1]["error_kind"], "security_denied");
    }
}
