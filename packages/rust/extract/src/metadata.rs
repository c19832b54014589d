//! Page metadata collection: OpenGraph, `article:` tags, JSON-LD, bylines.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;

/// Metadata collected from a page's head and structured-data blocks.
#[derive(Debug, Clone, Default)]
pub struct PageMetadata {
    /// Flattened metadata map. OpenGraph keys lose their `og:` prefix,
    /// `article:` keys their prefix; JSON-LD top-level keys merge in as-is.
    pub raw: BTreeMap<String, Value>,
    /// Best-available title (JSON-LD headline, then `og:title`).
    pub title: Option<String>,
    /// Author found in structured data or a visible byline.
    pub detected_author: Option<String>,
    /// Publication date from `datePublished` or `article:published_time`.
    pub published_date: Option<String>,
}

/// Byline containers checked when structured data has no author.
const BYLINE_SELECTORS: &[&str] = &[
    ".author",
    ".byline",
    ".post-author",
    ".entry-author",
    "[itemprop=\"author\"]",
];

pub(crate) fn collect(doc: &Html) -> PageMetadata {
    let mut raw = BTreeMap::new();

    collect_meta_tags(doc, &mut raw);
    let jsonld_author = collect_jsonld(doc, &mut raw);

    let detected_author = meta_author(doc)
        .or(jsonld_author)
        .or_else(|| byline_author(doc))
        .or_else(|| by_line_scan(doc));

    let published_date = ["datePublished", "published_time", "date"]
        .iter()
        .find_map(|k| raw.get(*k).and_then(value_as_string));

    let title = raw
        .get("headline")
        .and_then(value_as_string)
        .or_else(|| raw.get("title").and_then(value_as_string));

    PageMetadata {
        raw,
        title,
        detected_author,
        published_date,
    }
}

// ---------------------------------------------------------------------------
// Meta tags
// ---------------------------------------------------------------------------

fn collect_meta_tags(doc: &Html, raw: &mut BTreeMap<String, Value>) {
    let Ok(sel) = Selector::parse("meta") else {
        return;
    };

    for el in doc.select(&sel) {
        let Some(content) = el.value().attr("content") else {
            continue;
        };

        if let Some(property) = el.value().attr("property") {
            if let Some(key) = property.strip_prefix("og:") {
                raw.insert(key.to_string(), Value::String(content.to_string()));
            }
        }
        if let Some(name) = el.value().attr("name") {
            if let Some(key) = name.strip_prefix("article:") {
                raw.insert(key.to_string(), Value::String(content.to_string()));
            } else if name.eq_ignore_ascii_case("author") {
                raw.insert("author".to_string(), Value::String(content.to_string()));
            } else if name.eq_ignore_ascii_case("keywords") {
                raw.insert("keywords".to_string(), Value::String(content.to_string()));
            }
        }
    }
}

/// Author from explicit meta tags, in precedence order.
fn meta_author(doc: &Html) -> Option<String> {
    const META_AUTHOR_SELECTORS: &[&str] = &[
        "meta[name=\"author\"]",
        "meta[property=\"article:author\"]",
        "meta[property=\"og:author\"]",
        "meta[name=\"twitter:creator\"]",
    ];

    for sel_str in META_AUTHOR_SELECTORS {
        let Ok(sel) = Selector::parse(sel_str) else {
            continue;
        };
        if let Some(content) = doc
            .select(&sel)
            .next()
            .and_then(|el| el.value().attr("content"))
        {
            let trimmed = content.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

// ---------------------------------------------------------------------------
// JSON-LD
// ---------------------------------------------------------------------------

/// Merge JSON-LD blocks into the metadata map and return the first author
/// found. Handles plain objects, arrays, and WordPress-style `@graph` lists.
fn collect_jsonld(doc: &Html, raw: &mut BTreeMap<String, Value>) -> Option<String> {
    let Ok(sel) = Selector::parse("script[type=\"application/ld+json\"]") else {
        return None;
    };

    let mut author = None;

    for script in doc.select(&sel) {
        let text: String = script.text().collect();
        let Ok(data) = serde_json::from_str::<Value>(&text) else {
            continue;
        };

        match data {
            Value::Object(map) => {
                if author.is_none() {
                    author = object_author(&map);
                }
                for (k, v) in map {
                    raw.insert(k, v);
                }
            }
            Value::Array(items) => {
                for item in items {
                    if let Value::Object(map) = item {
                        if author.is_none() {
                            author = object_author(&map);
                        }
                        for (k, v) in map {
                            raw.insert(k, v);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    author
}

/// Pull an author name out of a single JSON-LD object.
fn object_author(map: &serde_json::Map<String, Value>) -> Option<String> {
    if let Some(Value::Array(graph)) = map.get("@graph") {
        for item in graph {
            let Value::Object(node) = item else {
                continue;
            };
            if node.get("@type").and_then(Value::as_str) == Some("Person") {
                if let Some(name) = node.get("name").and_then(Value::as_str) {
                    return Some(name.trim().to_string());
                }
            }
            if let Some(name) = author_field_name(node.get("author")) {
                return Some(name);
            }
        }
    }

    author_field_name(map.get("author"))
}

/// Resolve the `author` field shapes JSON-LD allows: object with `name`,
/// list of such objects, or a bare string.
fn author_field_name(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Object(obj) => obj
            .get("name")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string()),
        Value::Array(list) => {
            let names: Vec<&str> = list
                .iter()
                .filter_map(|a| a.get("name").and_then(Value::as_str))
                .collect();
            if names.is_empty() {
                None
            } else {
                Some(names.join(", "))
            }
        }
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Visible bylines
// ---------------------------------------------------------------------------

fn byline_author(doc: &Html) -> Option<String> {
    for sel_str in BYLINE_SELECTORS {
        let Ok(sel) = Selector::parse(sel_str) else {
            continue;
        };
        if let Some(el) = doc.select(&sel).next() {
            let text = el.text().collect::<String>().trim().to_string();
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}

/// Scan the first 30 visible text lines for a `By <Name>` byline.
fn by_line_scan(doc: &Html) -> Option<String> {
    static BY_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?i)^By ([A-Za-z ,.\-]+)$").expect("valid regex"));

    let body_sel = Selector::parse("body").ok()?;
    let body = doc.select(&body_sel).next()?;
    let text: String = body.text().collect::<Vec<_>>().join("\n");

    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .take(30)
        .find_map(|line| BY_RE.captures(line).map(|c| c[1].trim().to_string()))
}

fn value_as_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(html: &str) -> Html {
        Html::parse_document(html)
    }

    #[test]
    fn opengraph_keys_lose_prefix() {
        let doc = parse(
            r#"<html><head>
                <meta property="og:title" content="My Post">
                <meta property="og:type" content="article">
            </head><body></body></html>"#,
        );
        let meta = collect(&doc);
        assert_eq!(meta.raw["title"], Value::String("My Post".into()));
        assert_eq!(meta.raw["type"], Value::String("article".into()));
        assert_eq!(meta.title.as_deref(), Some("My Post"));
    }

    #[test]
    fn meta_author_tag_wins() {
        let doc = parse(
            r#"<html><head>
                <meta name="author" content="Jane Roe">
            </head><body><div class="byline">By Someone Else</div></body></html>"#,
        );
        let meta = collect(&doc);
        assert_eq!(meta.detected_author.as_deref(), Some("Jane Roe"));
    }

    #[test]
    fn jsonld_author_object() {
        let doc = parse(
            r#"<html><head>
                <script type="application/ld+json">
                {"@type": "Article", "headline": "Deep Dive", "author": {"@type": "Person", "name": "Sam Chen"}, "datePublished": "2024-03-01"}
                </script>
            </head><body></body></html>"#,
        );
        let meta = collect(&doc);
        assert_eq!(meta.detected_author.as_deref(), Some("Sam Chen"));
        assert_eq!(meta.title.as_deref(), Some("Deep Dive"));
        assert_eq!(meta.published_date.as_deref(), Some("2024-03-01"));
    }

    #[test]
    fn jsonld_graph_person() {
        let doc = parse(
            r#"<html><head>
                <script type="application/ld+json">
                {"@graph": [{"@type": "WebSite", "name": "Blog"}, {"@type": "Person", "name": "Ada Park"}]}
                </script>
            </head><body></body></html>"#,
        );
        let meta = collect(&doc);
        assert_eq!(meta.detected_author.as_deref(), Some("Ada Park"));
    }

    #[test]
    fn jsonld_author_list_joined() {
        let doc = parse(
            r#"<html><head>
                <script type="application/ld+json">
                {"author": [{"name": "First Author"}, {"name": "Second Author"}]}
                </script>
            </head><body></body></html>"#,
        );
        let meta = collect(&doc);
        assert_eq!(
            meta.detected_author.as_deref(),
            Some("First Author, Second Author")
        );
    }

    #[test]
    fn byline_selector_fallback() {
        let doc = parse(
            r#"<html><body>
                <div class="post-author">Lee Wong</div>
                <p>Content</p>
            </body></html>"#,
        );
        let meta = collect(&doc);
        assert_eq!(meta.detected_author.as_deref(), Some("Lee Wong"));
    }

    #[test]
    fn by_prefix_scan_fallback() {
        let doc = parse(
            r#"<html><body>
                <h1>A Post</h1>
                <p>By Maria Gonzalez</p>
                <p>Body text.</p>
            </body></html>"#,
        );
        let meta = collect(&doc);
        assert_eq!(meta.detected_author.as_deref(), Some("Maria Gonzalez"));
    }

    #[test]
    fn no_author_anywhere() {
        let doc = parse("<html><body><p>Just text.</p></body></html>");
        let meta = collect(&doc);
        assert!(meta.detected_author.is_none());
    }

    #[test]
    fn malformed_jsonld_skipped() {
        let doc = parse(
            r#"<html><head>
                <script type="application/ld+json">{not valid json</script>
                <script type="application/ld+json">{"author": "Good One"}</script>
            </head><body></body></html>"#,
        );
        let meta = collect(&doc);
        assert_eq!(meta.detected_author.as_deref(), Some("Good One"));
    }

    #[test]
    fn keywords_collected() {
        let doc = parse(
            r#"<html><head>
                <meta name="keywords" content="rust, parsing, web">
            </head><body></body></html>"#,
        );
        let meta = collect(&doc);
        assert_eq!(
            meta.raw["keywords"],
            Value::String("rust, parsing, web".into())
        );
    }
}
