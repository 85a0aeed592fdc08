use crate::config::ToolConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSearchConfig {
    #[serde(flatten)]
    pub tool: ToolConfig,
    pub max_results: usize,
    /// Bytes read from any single response body.
    pub max_content_length: usize,
    pub request_timeout_secs: u64,
    pub user_agent: String,
    pub allowed_domains: Vec<String>,
    pub blocked_domains: Vec<String>,
    pub default_search_engine: String,
    pub duckduckgo_endpoint: String,
    pub enable_caching: bool,
    pub cache_ttl_secs: u64,
    pub bulk_max_urls: usize,
    pub bulk_delay_ms: u64,
    pub max_extracted_chars: usize,
    pub max_links: usize,
    pub max_feed_entries: usize,
    /// Lets requests reach loopback and private addresses. Local testing only.
    pub allow_private_network: bool,
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            tool: ToolConfig::default(),
            max_results: 10,
            max_content_length: 50_000,
            request_timeout_secs: 30,
            user_agent: "toolwarden-web/0.1".to_string(),
            allowed_domains: Vec::new(),
            blocked_domains: vec![
                "malware.com".to_string(),
                "phishing.com".to_string(),
                "spam.com".to_string(),
            ],
            default_search_engine: "duckduckgo".to_string(),
            duckduckgo_endpoint: "https://api.duckduckgo.com/".to_string(),
            enable_caching: true,
            cache_ttl_secs: 3600,
            bulk_max_urls: 10,
            bulk_delay_ms: 500,
            max_extracted_chars: 5000,
            max_links: 20,
            max_feed_entries: 20,
            allow_private_network: false,
        }
    }
}
