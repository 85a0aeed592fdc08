use super::fetch::read_capped;
use crate::error::ToolError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub max_results: usize,
    pub time_range: String,
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_content: Option<String>,
}

/// A backend that turns a query into ranked hits.
#[async_trait]
pub trait SearchEngine: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>, ToolError>;
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "PascalCase")]
struct InstantAnswer {
    heading: String,
    #[serde(rename = "AbstractText")]
    abstract_text: String,
    #[serde(rename = "Abstract")]
    abstract_html: String,
    #[serde(rename = "AbstractURL")]
    abstract_url: String,
    abstract_source: String,
    related_topics: Vec<RelatedTopic>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "PascalCase")]
struct RelatedTopic {
    text: Option<String>,
    #[serde(rename = "FirstURL")]
    first_url: Option<String>,
    /// Present on category groups instead of `Text`.
    topics: Vec<RelatedTopic>,
}

/// DuckDuckGo instant-answer API.
pub struct DuckDuckGo {
    client: reqwest::Client,
    endpoint: String,
    max_bytes: usize,
}

impl DuckDuckGo {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>, max_bytes: usize) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            max_bytes,
        }
    }
}

fn title_from_url(url: &str) -> String {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .map(|segment| segment.replace('_', " "))
        .unwrap_or_default()
}

fn collect_topics(topics: &[RelatedTopic], out: &mut Vec<SearchHit>, limit: usize) {
    for topic in topics {
        if out.len() >= limit {
            return;
        }
        match (&topic.text, &topic.first_url) {
            (Some(text), Some(url)) if !text.is_empty() => out.push(SearchHit {
                title: title_from_url(url),
                url: url.clone(),
                snippet: text.clone(),
                source: "DuckDuckGo".to_string(),
                extracted_content: None,
            }),
            _ => collect_topics(&topic.topics, out, limit),
        }
    }
}

fn hits_from_answer(answer: InstantAnswer, limit: usize) -> Vec<SearchHit> {
    let mut hits = Vec::new();
    let snippet = if answer.abstract_text.is_empty() {
        answer.abstract_html
    } else {
        answer.abstract_text
    };
    if !snippet.is_empty() && limit > 0 {
        hits.push(SearchHit {
            title: answer.heading,
            url: answer.abstract_url,
            snippet,
            source: answer.abstract_source,
            extracted_content: None,
        });
    }
    collect_topics(&answer.related_topics, &mut hits, limit);
    hits
}

#[async_trait]
impl SearchEngine for DuckDuckGo {
    fn name(&self) -> &str {
        "duckduckgo"
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>, ToolError> {
        let mut query = vec![
            ("q", request.query.as_str()),
            ("format", "json"),
            ("no_html", "1"),
            ("skip_disambig", "1"),
        ];
        if !request.language.is_empty() {
            query.push(("kl", request.language.as_str()));
        }

        let response = self
            .client
            .get(&self.endpoint)
            .query(&query)
            .send()
            .await
            .map_err(|e| ToolError::Execution(format!("DuckDuckGo request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::Execution(format!(
                "DuckDuckGo returned HTTP {}",
                status.as_u16()
            )));
        }

        // The API answers with a javascript content type, so decode by hand.
        let body = read_capped(response, self.max_bytes).await?;
        let answer: InstantAnswer = serde_json::from_slice(&body)
            .map_err(|e| ToolError::Execution(format!("Invalid DuckDuckGo response: {}", e)))?;

        let hits = hits_from_answer(answer, request.max_results);
        debug!(query = %request.query, hits = hits.len(), "DuckDuckGo search complete");
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn answer(value: serde_json::Value) -> InstantAnswer {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_abstract_becomes_first_hit() {
        let hits = hits_from_answer(
            answer(json!({
                "Heading": "Rust (programming language)",
                "AbstractText": "Rust is a language.",
                "AbstractURL": "https://en.wikipedia.org/wiki/Rust_(programming_language)",
                "AbstractSource": "Wikipedia",
                "RelatedTopics": [
                    {"Text": "Cargo - the package manager", "FirstURL": "https://duckduckgo.com/Cargo_(software)"}
                ]
            })),
            10,
        );
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].title, "Rust (programming language)");
        assert_eq!(hits[0].source, "Wikipedia");
        assert_eq!(hits[1].title, "Cargo (software)");
        assert_eq!(hits[1].source, "DuckDuckGo");
    }

    #[test]
    fn test_grouped_topics_flattened_and_limited() {
        let hits = hits_from_answer(
            answer(json!({
                "RelatedTopics": [
                    {"Name": "Group", "Topics": [
                        {"Text": "A", "FirstURL": "https://duckduckgo.com/A"},
                        {"Text": "B", "FirstURL": "https://duckduckgo.com/B"}
                    ]},
                    {"Text": "C", "FirstURL": "https://duckduckgo.com/C"}
                ]
            })),
            2,
        );
        let titles: Vec<&str> = hits.iter().map(|h| h.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "B"]);
    }

    #[test]
    fn test_empty_answer() {
        assert!(hits_from_answer(InstantAnswer::default(), 10).is_empty());
    }
}
