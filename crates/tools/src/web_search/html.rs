use crate::error::ToolError;
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use url::Url;

#[derive(Debug, Clone, Serialize)]
pub struct PageLink {
    pub url: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PageContent {
    pub title: String,
    pub description: String,
    pub content: String,
    pub content_length: usize,
    pub links: Vec<PageLink>,
}

struct Patterns {
    noise: Regex,
    title: Regex,
    meta: Regex,
    attr: Regex,
    anchor: Regex,
    main: Regex,
    article: Regex,
    body: Regex,
    tag: Regex,
    space: Regex,
}

impl Patterns {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            noise: Regex::new(
                r"(?is)<script\b.*?</script\s*>|<style\b.*?</style\s*>|<noscript\b.*?</noscript\s*>|<!--.*?-->",
            )?,
            title: Regex::new(r"(?is)<title\b[^>]*>(.*?)</title\s*>")?,
            meta: Regex::new(r"(?is)<meta\b([^>]*)>")?,
            attr: Regex::new(r#"(?is)([a-z_:][-a-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#)?,
            anchor: Regex::new(r"(?is)<a\b([^>]*)>(.*?)</a\s*>")?,
            main: Regex::new(r"(?is)<main\b[^>]*>(.*?)</main\s*>")?,
            article: Regex::new(r"(?is)<article\b[^>]*>(.*?)</article\s*>")?,
            body: Regex::new(r"(?is)<body\b[^>]*>(.*?)</body\s*>")?,
            tag: Regex::new(r"(?s)<[^>]*>")?,
            space: Regex::new(r"\s+")?,
        })
    }
}

fn patterns() -> Result<&'static Patterns, ToolError> {
    static CELL: OnceLock<Result<Patterns, String>> = OnceLock::new();
    CELL.get_or_init(|| Patterns::compile().map_err(|e| e.to_string()))
        .as_ref()
        .map_err(|e| ToolError::Execution(format!("HTML pattern compile error: {}", e)))
}

/// Attribute lookup on a raw tag's attribute text. Names compare case-insensitively.
pub(crate) fn attribute(attrs: &str, name: &str) -> Option<String> {
    let p = patterns().ok()?;
    p.attr.captures_iter(attrs).find_map(|caps| {
        let key = caps.get(1)?.as_str();
        if !key.eq_ignore_ascii_case(name) {
            return None;
        }
        let value = caps.get(2).or_else(|| caps.get(3)).or_else(|| caps.get(4))?;
        Some(html_escape::decode_html_entities(value.as_str()).into_owned())
    })
}

/// Drop markup, decode entities and collapse whitespace.
pub(crate) fn plain_text(fragment: &str) -> String {
    let Ok(p) = patterns() else {
        return fragment.trim().to_string();
    };
    let stripped = p.tag.replace_all(fragment, " ");
    let decoded = html_escape::decode_html_entities(&stripped);
    p.space.replace_all(&decoded, " ").trim().to_string()
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Pull title, description, readable text and outbound links from a page.
pub fn extract(
    html: &str,
    base: &Url,
    max_chars: usize,
    max_links: usize,
) -> Result<PageContent, ToolError> {
    let p = patterns()?;
    let cleaned = p.noise.replace_all(html, " ");

    let title = p
        .title
        .captures(&cleaned)
        .and_then(|c| c.get(1))
        .map(|m| plain_text(m.as_str()))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "No title".to_string());

    let description = p
        .meta
        .captures_iter(&cleaned)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .find(|attrs| {
            attribute(attrs, "name").is_some_and(|n| n.eq_ignore_ascii_case("description"))
        })
        .and_then(|attrs| attribute(attrs, "content"))
        .map(|d| d.trim().to_string())
        .unwrap_or_default();

    let region = [&p.main, &p.article, &p.body]
        .iter()
        .find_map(|re| re.captures(&cleaned).and_then(|c| c.get(1)))
        .map(|m| m.as_str())
        .unwrap_or(&cleaned);
    let text = plain_text(region);
    let content = truncate_chars(&text, max_chars);

    let mut links = Vec::new();
    for caps in p.anchor.captures_iter(&cleaned) {
        if links.len() >= max_links {
            break;
        }
        let Some(href) = caps.get(1).and_then(|m| attribute(m.as_str(), "href")) else {
            continue;
        };
        let Ok(resolved) = base.join(href.trim()) else {
            continue;
        };
        if !matches!(resolved.scheme(), "http" | "https") {
            continue;
        }
        let text = caps.get(2).map(|m| plain_text(m.as_str())).unwrap_or_default();
        links.push(PageLink {
            url: resolved.to_string(),
            text,
        });
    }

    Ok(PageContent {
        title,
        description,
        content_length: content.chars().count(),
        content,
        links,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!DOCTYPE html>
<html><head>
<title>  Rust &amp; Safety </title>
<meta charset="utf-8">
<meta name="Description" content="Memory safety without GC">
<script>var secret = "should not appear";</script>
<style>body { color: red }</style>
</head>
<body>
<nav>Skip me</nav>
<main>
  <h1>Ownership</h1>
  <p>Each value has an <b>owner</b>.</p>
  <a href="/book">The Book</a>
  <a href='https://crates.io/'>Crates</a>
  <a href="javascript:alert(1)">bad</a>
  <a href="mailto:x@example.com">mail</a>
</main>
</body></html>"#;

    fn base() -> Url {
        Url::parse("https://example.com/docs/").unwrap()
    }

    #[test]
    fn test_extract_prefers_main() {
        let page = extract(PAGE, &base(), 5000, 20).unwrap();
        assert_eq!(page.title, "Rust & Safety");
        assert_eq!(page.description, "Memory safety without GC");
        assert!(page.content.starts_with("Ownership Each value has an owner ."));
        assert!(!page.content.contains("secret"));
        assert!(!page.content.contains("Skip me"));
        assert_eq!(page.content_length, page.content.chars().count());
    }

    #[test]
    fn test_links_resolved_and_filtered() {
        let page = extract(PAGE, &base(), 5000, 20).unwrap();
        let urls: Vec<&str> = page.links.iter().map(|l| l.url.as_str()).collect();
        assert_eq!(urls, vec!["https://example.com/book", "https://crates.io/"]);
        assert_eq!(page.links[0].text, "The Book");
    }

    #[test]
    fn test_limits_applied() {
        let page = extract(PAGE, &base(), 9, 1).unwrap();
        assert_eq!(page.content, "Ownership");
        assert_eq!(page.links.len(), 1);
    }

    #[test]
    fn test_missing_title_and_body() {
        let page = extract("plain words only", &base(), 100, 20).unwrap();
        assert_eq!(page.title, "No title");
        assert_eq!(page.description, "");
        assert_eq!(page.content, "plain words only");
    }
}
