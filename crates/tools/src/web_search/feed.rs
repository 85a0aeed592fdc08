//! RSS 2.0 and Atom parsing.
//!
//! Feeds are read with tolerant tag matching rather than a strict XML parser;
//! malformed feeds yield whatever fields can be recognised.

use super::html::{attribute, plain_text};
use crate::error::ToolError;
use regex::Regex;
use serde::Serialize;

#[derive(Debug, Clone, Default, Serialize)]
pub struct FeedInfo {
    pub title: String,
    pub description: String,
    pub link: String,
    pub language: String,
    pub last_updated: String,
    pub total_entries: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FeedEntry {
    pub title: String,
    pub link: String,
    pub description: String,
    pub published: String,
    pub author: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Feed {
    pub feed_info: FeedInfo,
    pub entries: Vec<FeedEntry>,
}

fn element_pattern(name: &str, self_closing: bool) -> Result<Regex, ToolError> {
    let name = regex::escape(name);
    let pattern = if self_closing {
        format!(r"(?is)<{name}\b([^>]*?)/?>")
    } else {
        format!(r"(?is)<{name}\b([^>]*)>(.*?)</{name}\s*>")
    };
    Regex::new(&pattern).map_err(|e| ToolError::Execution(format!("Feed pattern error: {}", e)))
}

fn unwrap_cdata(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix("<![CDATA[")
        .and_then(|s| s.strip_suffix("]]>"))
        .unwrap_or(trimmed)
}

/// Text of the first `<name>` element in `block`.
fn text_of(block: &str, name: &str) -> String {
    element_pattern(name, false)
        .ok()
        .and_then(|re| {
            re.captures(block)
                .and_then(|c| c.get(2))
                .map(|m| plain_text(unwrap_cdata(m.as_str())))
        })
        .unwrap_or_default()
}

fn first_text(block: &str, names: &[&str]) -> String {
    names
        .iter()
        .map(|n| text_of(block, n))
        .find(|t| !t.is_empty())
        .unwrap_or_default()
}

fn all_texts(block: &str, name: &str) -> Vec<String> {
    element_pattern(name, false)
        .map(|re| {
            re.captures_iter(block)
                .filter_map(|c| c.get(2).map(|m| plain_text(unwrap_cdata(m.as_str()))))
                .filter(|t| !t.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn attr_values(block: &str, name: &str, attr: &str) -> Vec<String> {
    element_pattern(name, true)
        .map(|re| {
            re.captures_iter(block)
                .filter_map(|c| c.get(1).and_then(|m| attribute(m.as_str(), attr)))
                .collect()
        })
        .unwrap_or_default()
}

/// Atom links carry the target in `href`; prefer `rel="alternate"` or no rel.
fn atom_link(block: &str) -> String {
    let Ok(re) = element_pattern("link", true) else {
        return String::new();
    };
    let mut fallback = None;
    for caps in re.captures_iter(block) {
        let Some(attrs) = caps.get(1).map(|m| m.as_str()) else {
            continue;
        };
        let Some(href) = attribute(attrs, "href") else {
            continue;
        };
        match attribute(attrs, "rel").as_deref() {
            None | Some("alternate") => return href,
            _ => {
                fallback.get_or_insert(href);
            }
        }
    }
    fallback.unwrap_or_default()
}

/// Part of the document before the first entry, where feed-level fields live.
fn header<'a>(doc: &'a str, entry_tag: &str) -> &'a str {
    let lower = doc.to_ascii_lowercase();
    let needle = format!("<{}", entry_tag);
    let mut search_from = 0;
    while let Some(pos) = lower[search_from..].find(&needle) {
        let at = search_from + pos;
        let next = lower.as_bytes().get(at + needle.len()).copied();
        if matches!(next, Some(b'>' | b' ' | b'\t' | b'\n' | b'\r' | b'/')) {
            return &doc[..at];
        }
        search_from = at + needle.len();
    }
    doc
}

fn blocks(doc: &str, tag: &str) -> Result<Vec<String>, ToolError> {
    let re = element_pattern(tag, false)?;
    Ok(re
        .captures_iter(doc)
        .filter_map(|c| c.get(2).map(|m| m.as_str().to_string()))
        .collect())
}

pub fn is_atom(doc: &str) -> bool {
    let lower = doc.to_ascii_lowercase();
    lower.contains("<feed") && !lower.contains("<rss")
}

pub fn parse(doc: &str, max_entries: usize) -> Result<Feed, ToolError> {
    let feed = if is_atom(doc) {
        parse_atom(doc, max_entries)?
    } else {
        parse_rss(doc, max_entries)?
    };
    if feed.entries.is_empty() && feed.feed_info.title.is_empty() {
        return Err(ToolError::Execution(
            "Document is not a recognisable RSS or Atom feed".to_string(),
        ));
    }
    Ok(feed)
}

fn parse_rss(doc: &str, max_entries: usize) -> Result<Feed, ToolError> {
    let head = header(doc, "item");
    let items = blocks(doc, "item")?;

    let entries: Vec<FeedEntry> = items
        .iter()
        .take(max_entries)
        .map(|item| FeedEntry {
            title: text_of(item, "title"),
            link: text_of(item, "link"),
            description: first_text(item, &["description", "content:encoded"]),
            published: first_text(item, &["pubDate", "dc:date"]),
            author: first_text(item, &["author", "dc:creator"]),
            tags: all_texts(item, "category"),
        })
        .collect();

    Ok(Feed {
        feed_info: FeedInfo {
            title: text_of(head, "title"),
            description: text_of(head, "description"),
            link: text_of(head, "link"),
            language: text_of(head, "language"),
            last_updated: first_text(head, &["lastBuildDate", "pubDate"]),
            total_entries: items.len(),
        },
        entries,
    })
}

fn parse_atom(doc: &str, max_entries: usize) -> Result<Feed, ToolError> {
    let head = header(doc, "entry");
    let items = blocks(doc, "entry")?;

    let language = element_pattern("feed", true)
        .ok()
        .and_then(|re| re.captures(doc).and_then(|c| c.get(1)))
        .and_then(|m| attribute(m.as_str(), "xml:lang"))
        .unwrap_or_default();

    let entries: Vec<FeedEntry> = items
        .iter()
        .take(max_entries)
        .map(|entry| {
            let author_block = element_pattern("author", false)
                .ok()
                .and_then(|re| re.captures(entry).and_then(|c| c.get(2)))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            FeedEntry {
                title: text_of(entry, "title"),
                link: atom_link(entry),
                description: first_text(entry, &["summary", "content"]),
                published: first_text(entry, &["published", "updated"]),
                author: text_of(&author_block, "name"),
                tags: attr_values(entry, "category", "term"),
            }
        })
        .collect();

    Ok(Feed {
        feed_info: FeedInfo {
            title: text_of(head, "title"),
            description: text_of(head, "subtitle"),
            link: atom_link(head),
            language,
            last_updated: text_of(head, "updated"),
            total_entries: items.len(),
        },
        entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0" xmlns:dc="http://purl.org/dc/elements/1.1/">
<channel>
  <title>Example News</title>
  <link>https://news.example.com/</link>
  <description>All the news</description>
  <language>en-us</language>
  <lastBuildDate>Mon, 05 Oct 2026 10:00:00 GMT</lastBuildDate>
  <item>
    <title>First &amp; foremost</title>
    <link>https://news.example.com/1</link>
    <description><![CDATA[<p>Hello <b>world</b></p>]]></description>
    <pubDate>Mon, 05 Oct 2026 09:00:00 GMT</pubDate>
    <dc:creator>Sam</dc:creator>
    <category>tech</category>
    <category>rust</category>
  </item>
  <item>
    <title>Second</title>
    <link>https://news.example.com/2</link>
  </item>
</channel>
</rss>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xml:lang="fr">
  <title>Atom Log</title>
  <subtitle>Notes</subtitle>
  <link rel="self" href="https://log.example.org/feed.xml"/>
  <link href="https://log.example.org/"/>
  <updated>2026-10-01T12:00:00Z</updated>
  <entry>
    <title>Entry one</title>
    <link rel="alternate" href="https://log.example.org/one"/>
    <updated>2026-10-01T12:00:00Z</updated>
    <summary>Short summary</summary>
    <author><name>Robin</name></author>
    <category term="notes"/>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_rss_channel_and_items() {
        let feed = parse(RSS, 20).unwrap();
        assert_eq!(feed.feed_info.title, "Example News");
        assert_eq!(feed.feed_info.link, "https://news.example.com/");
        assert_eq!(feed.feed_info.language, "en-us");
        assert_eq!(feed.feed_info.last_updated, "Mon, 05 Oct 2026 10:00:00 GMT");
        assert_eq!(feed.feed_info.total_entries, 2);

        let first = &feed.entries[0];
        assert_eq!(first.title, "First & foremost");
        assert_eq!(first.description, "Hello world");
        assert_eq!(first.author, "Sam");
        assert_eq!(first.tags, vec!["tech", "rust"]);
        assert_eq!(feed.entries[1].author, "");
    }

    #[test]
    fn test_parse_atom() {
        let feed = parse(ATOM, 20).unwrap();
        assert_eq!(feed.feed_info.title, "Atom Log");
        assert_eq!(feed.feed_info.description, "Notes");
        assert_eq!(feed.feed_info.link, "https://log.example.org/");
        assert_eq!(feed.feed_info.language, "fr");
        assert_eq!(feed.entries.len(), 1);

        let entry = &feed.entries[0];
        assert_eq!(entry.link, "https://log.example.org/one");
        assert_eq!(entry.description, "Short summary");
        assert_eq!(entry.published, "2026-10-01T12:00:00Z");
        assert_eq!(entry.author, "Robin");
        assert_eq!(entry.tags, vec!["notes"]);
    }

    #[test]
    fn test_entry_cap_keeps_total() {
        let feed = parse(RSS, 1).unwrap();
        assert_eq!(feed.entries.len(), 1);
        assert_eq!(feed.feed_info.total_entries, 2);
    }

    #[test]
    fn test_rejects_non_feed() {
        assert!(parse("<html><body>nothing</body></html>", 20).is_err());
    }
}
