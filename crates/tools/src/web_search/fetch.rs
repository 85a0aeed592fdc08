//! Outbound HTTP under URL policy.
//!
//! Redirects are followed by hand so every hop is re-checked, and each
//! hostname is resolved and vetted before a connection is attempted.

use crate::error::ToolError;
use reqwest::header::{CONTENT_LENGTH, LOCATION};
use reqwest::{Method, Response};
use std::net::IpAddr;
use std::time::Duration;
use toolwarden_policy::{DenyReason, PolicyViolation, UrlPolicy};
use tracing::{debug, warn};
use url::{Host, Url};

pub const MAX_REDIRECTS: usize = 5;

pub struct Fetcher {
    client: reqwest::Client,
    policy: UrlPolicy,
    max_bytes: usize,
}

/// A fully read response body plus the headers callers care about.
#[derive(Debug)]
pub struct FetchedBody {
    pub final_url: Url,
    pub status: u16,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl FetchedBody {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

impl Fetcher {
    pub fn new(
        policy: UrlPolicy,
        user_agent: &str,
        timeout: Duration,
        max_bytes: usize,
    ) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ToolError::Execution(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            policy,
            max_bytes,
        })
    }

    pub fn policy(&self) -> &UrlPolicy {
        &self.policy
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Static policy check plus DNS vetting of every resolved address.
    pub async fn vet(&self, raw: &str) -> Result<Url, ToolError> {
        let url = self.policy.check(raw)?;
        self.vet_resolved(&url).await?;
        Ok(url)
    }

    async fn vet_resolved(&self, url: &Url) -> Result<(), ToolError> {
        let host = match url.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            // Literals were already judged by the static check.
            Some(_) => return Ok(()),
            None => {
                return Err(PolicyViolation::new(
                    DenyReason::MalformedTarget,
                    format!("URL has no host: {}", url),
                )
                .into())
            }
        };
        let port = url.port_or_known_default().unwrap_or(80);

        let addrs: Vec<IpAddr> = tokio::net::lookup_host((host.as_str(), port))
            .await
            .map_err(|e| ToolError::Execution(format!("DNS resolution failed for {}: {}", host, e)))?
            .map(|addr| addr.ip())
            .collect();
        if addrs.is_empty() {
            return Err(ToolError::Execution(format!(
                "DNS resolution returned no addresses for {}",
                host
            )));
        }
        debug!(host = %host, addresses = addrs.len(), "Resolved outbound host");
        self.policy.evaluate_resolved(&addrs).into_result()?;
        Ok(())
    }

    /// Send a request, following up to [`MAX_REDIRECTS`] redirects with every
    /// hop vetted against the policy.
    pub async fn send(&self, method: Method, raw: &str) -> Result<(Url, Response), ToolError> {
        let mut url = self.vet(raw).await?;
        let mut hops = 0;

        loop {
            let response = self
                .client
                .request(method.clone(), url.clone())
                .send()
                .await
                .map_err(|e| ToolError::Execution(format!("Request to {} failed: {}", url, e)))?;

            if !response.status().is_redirection() {
                return Ok((url, response));
            }

            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| {
                    ToolError::Execution(format!("Redirect from {} without a Location header", url))
                })?;
            let next = url
                .join(location)
                .map_err(|e| ToolError::Execution(format!("Invalid redirect target: {}", e)))?;

            hops += 1;
            if hops > MAX_REDIRECTS {
                warn!(url = %url, "Redirect limit exceeded");
                return Err(ToolError::Execution(format!(
                    "Too many redirects (limit {})",
                    MAX_REDIRECTS
                )));
            }
            debug!(from = %url, to = %next, "Following redirect");
            url = self.vet(next.as_str()).await?;
        }
    }

    /// GET a body, refusing anything larger than the configured cap.
    pub async fn get(&self, raw: &str) -> Result<FetchedBody, ToolError> {
        let (final_url, response) = self.send(Method::GET, raw).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::Execution(format!(
                "HTTP {} from {}",
                status.as_u16(),
                final_url
            )));
        }

        let content_type = header_string(&response, reqwest::header::CONTENT_TYPE.as_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        let bytes = read_capped(response, self.max_bytes).await?;

        Ok(FetchedBody {
            final_url,
            status: status.as_u16(),
            content_type,
            bytes,
        })
    }
}

/// Read a whole body, failing once it exceeds `max_bytes`, whether the
/// server declared the length up front or not.
pub async fn read_capped(mut response: Response, max_bytes: usize) -> Result<Vec<u8>, ToolError> {
    if let Some(declared) = header_string(&response, CONTENT_LENGTH.as_str())
        .and_then(|v| v.parse::<usize>().ok())
    {
        if declared > max_bytes {
            return Err(ToolError::Execution(format!(
                "Content too large: {} bytes (limit {})",
                declared, max_bytes
            )));
        }
    }

    let mut bytes = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| ToolError::Execution(format!("Failed to read body: {}", e)))?
    {
        if bytes.len() + chunk.len() > max_bytes {
            return Err(ToolError::Execution(format!(
                "Content too large: more than {} bytes",
                max_bytes
            )));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

pub fn header_string(response: &Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

pub fn is_html(content_type: &str) -> bool {
    content_type.contains("text/html") || content_type.contains("application/xhtml")
}

pub fn is_feed(content_type: &str) -> bool {
    content_type.contains("xml")
        || content_type.contains("rss")
        || content_type.contains("atom")
        || content_type.starts_with("text/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_classes() {
        assert!(is_html("text/html; charset=utf-8"));
        assert!(is_html("application/xhtml+xml"));
        assert!(!is_html("application/pdf"));
        assert!(is_feed("application/rss+xml"));
        assert!(is_feed("application/atom+xml"));
        assert!(is_feed("text/xml"));
        assert!(!is_feed("image/png"));
    }

    #[tokio::test]
    async fn test_vet_rejects_metadata_literal() {
        let fetcher = Fetcher::new(
            UrlPolicy::new(),
            "test",
            Duration::from_secs(5),
            1024,
        )
        .unwrap();
        let err = fetcher.vet("http://169.254.169.254/latest/meta-data").await.unwrap_err();
        assert_eq!(err.deny_reason(), Some(DenyReason::SsrfSuspected));
    }
}
